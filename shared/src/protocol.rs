//! Wire protocol shared by client and server
//!
//! Every message is a UTF-8 JSON object carrying an integer `cmd` header
//! followed by the fields of its kind:
//!
//! | cmd | kind          | payload                 |
//! |-----|---------------|-------------------------|
//! | 1   | Handshake     | `player`                |
//! | 2   | PlayerUpdate  | `player`                |
//! | 3   | ServerUpdate  | `players` (full snapshot) |
//! | 4   | DroppedClient | `player` (id only)      |
//!
//! Decoding reads the header first and only then parses the body for the
//! announced kind, so an unknown kind is reported as such instead of as a
//! generic schema failure.

use crate::PlayerState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Command kind carried in the header of every message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Handshake,
    PlayerUpdate,
    ServerUpdate,
    DroppedClient,
}

impl Command {
    pub fn code(self) -> u8 {
        match self {
            Command::Handshake => 1,
            Command::PlayerUpdate => 2,
            Command::ServerUpdate => 3,
            Command::DroppedClient => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Command::Handshake),
            2 => Some(Command::PlayerUpdate),
            3 => Some(Command::ServerUpdate),
            4 => Some(Command::DroppedClient),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Announces the identity assigned to a connection
    Handshake { player: PlayerState },
    /// Client's current position
    PlayerUpdate { player: PlayerState },
    /// Authoritative snapshot of every connected player
    ServerUpdate { players: Vec<PlayerState> },
    /// A player left; only the id is significant
    DroppedClient { player: PlayerState },
}

impl Message {
    pub fn command(&self) -> Command {
        match self {
            Message::Handshake { .. } => Command::Handshake,
            Message::PlayerUpdate { .. } => Command::PlayerUpdate,
            Message::ServerUpdate { .. } => Command::ServerUpdate,
            Message::DroppedClient { .. } => Command::DroppedClient,
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unrecognized command kind {0}")]
    UnknownCommand(i64),
}

#[derive(Debug, Error)]
#[error("failed to encode {command:?} message: {source}")]
pub struct EncodeError {
    pub command: Command,
    #[source]
    pub source: serde_json::Error,
}

#[derive(Deserialize)]
struct Header {
    cmd: i64,
}

#[derive(Serialize)]
struct PlayerFrame<'a> {
    cmd: u8,
    player: &'a PlayerState,
}

#[derive(Serialize)]
struct SnapshotFrame<'a> {
    cmd: u8,
    players: &'a [PlayerState],
}

#[derive(Deserialize)]
struct PlayerBody {
    player: PlayerState,
}

#[derive(Deserialize)]
struct SnapshotBody {
    players: Vec<PlayerState>,
}

pub fn encode(message: &Message) -> Result<Vec<u8>, EncodeError> {
    let command = message.command();
    let cmd = command.code();

    let result = match message {
        Message::Handshake { player }
        | Message::PlayerUpdate { player }
        | Message::DroppedClient { player } => serde_json::to_vec(&PlayerFrame { cmd, player }),
        Message::ServerUpdate { players } => serde_json::to_vec(&SnapshotFrame { cmd, players }),
    };

    result.map_err(|source| EncodeError { command, source })
}

pub fn decode(bytes: &[u8]) -> Result<Message, DecodeError> {
    let header: Header = serde_json::from_slice(bytes)?;
    let command = Command::from_code(header.cmd)
        .ok_or(DecodeError::UnknownCommand(header.cmd))?;

    let message = match command {
        Command::Handshake => Message::Handshake {
            player: serde_json::from_slice::<PlayerBody>(bytes)?.player,
        },
        Command::PlayerUpdate => Message::PlayerUpdate {
            player: serde_json::from_slice::<PlayerBody>(bytes)?.player,
        },
        Command::ServerUpdate => Message::ServerUpdate {
            players: serde_json::from_slice::<SnapshotBody>(bytes)?.players,
        },
        Command::DroppedClient => Message::DroppedClient {
            player: serde_json::from_slice::<PlayerBody>(bytes)?.player,
        },
    };

    Ok(message)
}
