use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod protocol;
pub mod schedule;
pub mod transport;

pub use protocol::{decode, encode, Command, DecodeError, EncodeError, Message};
pub use schedule::Periodic;
pub use transport::{ClientTransport, ConnectionId, NetEvent, ServerTransport, TransportError};

/// Interval between server snapshots and client position reports.
pub const SYNC_INTERVAL: Duration = Duration::from_millis(200);
/// Interval at which both sides drain transport events.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// A player's identity and last known position as carried on the wire.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerState {
    pub id: String,
    #[serde(rename = "cubPos", default)]
    pub position: Vector3,
}

impl PlayerState {
    pub fn new(id: impl Into<String>, position: Vector3) -> Self {
        Self {
            id: id.into(),
            position,
        }
    }

    /// Player entry carrying only an identity, used by handshakes and drop notices.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self::new(id, Vector3::ZERO)
    }
}
