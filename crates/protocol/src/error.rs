//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while framing or parsing messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame was not valid JSON or did not match any known message shape.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}
