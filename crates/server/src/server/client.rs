//! Client session state.

use std::net::SocketAddr;

/// A connected client session.
///
/// The session outlives the player record: an eliminated well keeps
/// its connection and may rejoin, which creates a fresh record under
/// the same connection ID.
#[derive(Debug)]
pub struct Client {
    /// Unique connection ID, shared with the player record once joined.
    pub id: u32,
    /// Remote address.
    pub addr: SocketAddr,
    /// Display name, set on join. Kept on the session so chat still
    /// carries a name after the well is eliminated.
    pub name: String,
}

impl Client {
    /// Create a new client session.
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            name: String::new(),
        }
    }
}
