//! Connection registry for the server
//!
//! Tracks every transport connection the server has accepted, the identity
//! bound to it and where it is in its lifecycle:
//! - `Pending` from acceptance until the handshake has been sent
//! - `Active` once the identity is bound
//! - `Closed` after removal, until the next `cleanup`
//!
//! Identities are the transport's connection id rendered as a string. An
//! identity that was removed is remembered and never bound again.

use log::info;
use shared::ConnectionId;
use std::collections::HashSet;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Pending,
    Active,
    Closed,
}

/// A connection accepted by the server
#[derive(Debug)]
pub struct Connection {
    /// Transport handle used for sending
    pub handle: ConnectionId,
    /// Player identity bound to this connection
    pub identity: String,
    pub state: ConnectionState,
    /// When the transport handed us this connection
    pub accepted_at: Instant,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("identity {0} is already bound to a live connection")]
    IdentityInUse(String),
    #[error("identity {0} belonged to a connection that was closed")]
    IdentityRetired(String),
}

/// Live connections in acceptance order
///
/// Broadcasts iterate this order, so delivery order across connections is
/// deterministic for a given sequence of accepts.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Vec<Connection>,
    /// Identities of closed connections. Transport ids never repeat, so this
    /// only serves to stop late updates from recreating a departed player.
    retired: HashSet<String>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly accepted connection and returns its identity
    pub fn add(&mut self, handle: ConnectionId) -> Result<String, RegistryError> {
        let identity = handle.to_string();

        if self.retired.contains(&identity) {
            return Err(RegistryError::IdentityRetired(identity));
        }
        if self
            .connections
            .iter()
            .any(|c| c.identity == identity && c.state != ConnectionState::Closed)
        {
            return Err(RegistryError::IdentityInUse(identity));
        }

        info!("Accepted a connection: player {}", identity);
        self.connections.push(Connection {
            handle,
            identity: identity.clone(),
            state: ConnectionState::Pending,
            accepted_at: Instant::now(),
        });

        Ok(identity)
    }

    /// Marks a pending connection as active; returns false if it was not pending
    pub fn activate(&mut self, handle: ConnectionId) -> bool {
        match self.find_mut(handle) {
            Some(connection) if connection.state == ConnectionState::Pending => {
                connection.state = ConnectionState::Active;
                true
            }
            _ => false,
        }
    }

    /// Closes a connection and returns the identity it was bound to
    ///
    /// The entry stays visible as `Closed` until `cleanup` runs.
    pub fn remove(&mut self, handle: ConnectionId) -> Option<String> {
        let connection = self
            .find_mut(handle)
            .filter(|c| c.state != ConnectionState::Closed)?;
        connection.state = ConnectionState::Closed;
        let identity = connection.identity.clone();

        info!(
            "Player {} disconnected after {:.1}s",
            identity,
            connection.accepted_at.elapsed().as_secs_f32()
        );
        self.retired.insert(identity.clone());
        Some(identity)
    }

    /// Forgets closed connections; returns how many were dropped
    pub fn cleanup(&mut self) -> usize {
        let before = self.connections.len();
        self.connections
            .retain(|c| c.state != ConnectionState::Closed);
        before - self.connections.len()
    }

    /// Handles of every live connection in acceptance order
    pub fn list(&self) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|c| c.state != ConnectionState::Closed)
            .map(|c| c.handle)
            .collect()
    }

    pub fn is_live(&self, handle: ConnectionId) -> bool {
        self.find(handle)
            .is_some_and(|c| c.state != ConnectionState::Closed)
    }

    pub fn identity(&self, handle: ConnectionId) -> Option<&str> {
        self.find(handle).map(|c| c.identity.as_str())
    }

    pub fn state(&self, handle: ConnectionId) -> Option<ConnectionState> {
        self.find(handle).map(|c| c.state)
    }

    /// True if the identity was bound to a connection that has since closed
    pub fn is_retired(&self, identity: &str) -> bool {
        self.retired.contains(identity)
    }

    /// Number of live connections
    pub fn len(&self) -> usize {
        self.connections
            .iter()
            .filter(|c| c.state != ConnectionState::Closed)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find(&self, handle: ConnectionId) -> Option<&Connection> {
        self.connections.iter().find(|c| c.handle == handle)
    }

    fn find_mut(&mut self, handle: ConnectionId) -> Option<&mut Connection> {
        self.connections.iter_mut().find(|c| c.handle == handle)
    }
}
