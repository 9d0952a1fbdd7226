//! WebSocket message definitions.
//!
//! One JSON object per text frame, tagged by `type`. Clients send
//! `ClientMessage`, the server sends `ServerMessage`. Disconnects are
//! transport-level (close frame or dropped socket), not a message.

use crate::{Color, ProtocolError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Enter the arena under a display name.
    Join { name: String },

    /// Requested displacement for this tick. Values come from an
    /// untrusted peer; the server sanitizes and speed-clamps them.
    Move { dx: f32, dy: f32 },

    /// Chat text, relayed verbatim to every connection.
    Chat { message: String },
}

impl ClientMessage {
    /// Parse a client frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Arena dimensions, sent once to a new connection.
    MapSize { width: f32, height: f32 },

    /// Full player snapshot, sent after any state-changing tick.
    Players { players: BTreeMap<u32, PlayerState> },

    /// Full particle snapshot, sent after any state-changing tick.
    Particles { particles: Vec<ParticleState> },

    /// Ranking by size, sent after any state-changing tick.
    Leaderboard { entries: Vec<LeaderboardEntry> },

    /// Sent only to the eliminated connection.
    Eliminated { id: u32, name: String },

    /// Absorption flash for the absorbing connection. Presentation
    /// only; carries the particle's last position and the well center.
    Absorbed {
        particle_x: f32,
        particle_y: f32,
        player_x: f32,
        player_y: f32,
    },

    /// Chat relay to every connection.
    Chat { name: String, message: String },
}

impl ServerMessage {
    /// Encode for the wire.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// One player well as seen by clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub hp: f32,
    pub max_hp: f32,
    pub vx: f32,
    pub vy: f32,
    pub name: String,
    pub color: Color,
    /// Well sprite variant.
    pub avatar: u32,
}

/// One drifting particle as seen by clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticleState {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    /// Visual scale (1-3); does not affect simulation.
    pub size_multiplier: u32,
    /// Size awarded on absorption.
    pub points: u32,
    /// Planet sprite variant.
    pub variant: u32,
}

/// One leaderboard row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub name: String,
    pub size: f32,
}
