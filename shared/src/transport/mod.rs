//! Message-oriented transport boundary
//!
//! The protocol layer only needs discrete byte messages plus connect and
//! disconnect notifications per connection. Transports are polled, never
//! awaited: `update` pumps the driver once per frame, after which `accept`
//! and `pop_event` hand out whatever arrived in delivery order.

pub mod loopback;
pub mod udp;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;

pub use loopback::{LoopbackClientTransport, LoopbackNetwork, LoopbackServerTransport};
pub use udp::{UdpClientTransport, UdpConfig, UdpServerTransport};

/// Transport-internal connection identifier
///
/// Assigned by the transport, monotonically increasing and never reused
/// within one transport instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event popped from a connection's queue; `None` from `pop_event` means empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetEvent {
    Connect,
    Data(Vec<u8>),
    Disconnect,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("could not resolve address {0}")]
    Resolve(String),
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),
    #[error("connection is not established")]
    NotConnected,
    #[error("payload of {0} bytes exceeds the datagram limit")]
    PayloadTooLarge(usize),
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    #[error("frame encoding failed: {0}")]
    Frame(#[from] bincode::Error),
}

/// Listening side of a transport
pub trait ServerTransport {
    /// Pumps the driver: receives pending traffic, sends keepalives, detects timeouts
    fn update(&mut self);

    /// Returns the next newly connected peer, if any
    fn accept(&mut self) -> Option<ConnectionId>;

    fn pop_event(&mut self, connection: ConnectionId) -> Option<NetEvent>;

    fn send(&mut self, connection: ConnectionId, payload: &[u8]) -> Result<(), TransportError>;

    /// Closes the connection; the local side receives no `Disconnect` event for it
    fn disconnect(&mut self, connection: ConnectionId);
}

/// Connecting side of a transport
pub trait ClientTransport {
    fn update(&mut self);

    /// Starts connecting; completion is reported as a `Connect` event
    fn connect(&mut self, address: &str) -> Result<ConnectionId, TransportError>;

    fn pop_event(&mut self, connection: ConnectionId) -> Option<NetEvent>;

    fn send(&mut self, connection: ConnectionId, payload: &[u8]) -> Result<(), TransportError>;

    fn disconnect(&mut self, connection: ConnectionId);
}
