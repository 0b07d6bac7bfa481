//! In-memory transport connecting one server endpoint to any number of clients
//!
//! Used to drive client and server in the same process without sockets.
//! Delivery is immediate and lossless; `sever` simulates an abrupt loss of a
//! connection as seen from both ends.

use super::{ClientTransport, ConnectionId, NetEvent, ServerTransport, TransportError};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Link {
    accepted: bool,
    open: bool,
    to_server: VecDeque<NetEvent>,
    to_client: VecDeque<NetEvent>,
}

#[derive(Debug, Default)]
struct Hub {
    next_connection: u32,
    pending_accepts: VecDeque<ConnectionId>,
    links: HashMap<ConnectionId, Link>,
}

/// Shared medium that hands out connected server and client endpoints
#[derive(Debug, Clone, Default)]
pub struct LoopbackNetwork {
    hub: Arc<Mutex<Hub>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server(&self) -> LoopbackServerTransport {
        LoopbackServerTransport {
            network: self.clone(),
        }
    }

    pub fn client(&self) -> LoopbackClientTransport {
        LoopbackClientTransport {
            network: self.clone(),
        }
    }

    /// Drops a connection without either side asking for it
    pub fn sever(&self, connection: ConnectionId) {
        let mut hub = self.lock();
        if let Some(link) = hub.links.get_mut(&connection) {
            if link.open {
                link.open = false;
                if link.accepted {
                    link.to_server.push_back(NetEvent::Disconnect);
                }
                link.to_client.push_back(NetEvent::Disconnect);
            }
        }
        hub.pending_accepts.retain(|pending| *pending != connection);
    }

    /// Number of connections neither side has closed yet
    pub fn open_connections(&self) -> usize {
        self.lock().links.values().filter(|link| link.open).count()
    }

    fn lock(&self) -> MutexGuard<'_, Hub> {
        self.hub
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct LoopbackServerTransport {
    network: LoopbackNetwork,
}

impl ServerTransport for LoopbackServerTransport {
    fn update(&mut self) {}

    fn accept(&mut self) -> Option<ConnectionId> {
        let mut hub = self.network.lock();
        let connection = hub.pending_accepts.pop_front()?;
        if let Some(link) = hub.links.get_mut(&connection) {
            link.accepted = true;
            link.to_client.push_back(NetEvent::Connect);
        }
        Some(connection)
    }

    fn pop_event(&mut self, connection: ConnectionId) -> Option<NetEvent> {
        let mut hub = self.network.lock();
        hub.links.get_mut(&connection)?.to_server.pop_front()
    }

    fn send(&mut self, connection: ConnectionId, payload: &[u8]) -> Result<(), TransportError> {
        let mut hub = self.network.lock();
        let link = hub
            .links
            .get_mut(&connection)
            .filter(|link| link.open && link.accepted)
            .ok_or(TransportError::UnknownConnection(connection))?;
        link.to_client.push_back(NetEvent::Data(payload.to_vec()));
        Ok(())
    }

    fn disconnect(&mut self, connection: ConnectionId) {
        let mut hub = self.network.lock();
        if let Some(link) = hub.links.get_mut(&connection) {
            if link.open {
                link.open = false;
                link.to_server.clear();
                link.to_client.push_back(NetEvent::Disconnect);
            }
        }
    }
}

pub struct LoopbackClientTransport {
    network: LoopbackNetwork,
}

impl ClientTransport for LoopbackClientTransport {
    fn update(&mut self) {}

    fn connect(&mut self, _address: &str) -> Result<ConnectionId, TransportError> {
        let mut hub = self.network.lock();
        hub.next_connection += 1;
        let connection = ConnectionId(hub.next_connection);
        hub.links.insert(
            connection,
            Link {
                open: true,
                ..Link::default()
            },
        );
        hub.pending_accepts.push_back(connection);
        Ok(connection)
    }

    fn pop_event(&mut self, connection: ConnectionId) -> Option<NetEvent> {
        let mut hub = self.network.lock();
        hub.links.get_mut(&connection)?.to_client.pop_front()
    }

    fn send(&mut self, connection: ConnectionId, payload: &[u8]) -> Result<(), TransportError> {
        let mut hub = self.network.lock();
        let link = hub
            .links
            .get_mut(&connection)
            .ok_or(TransportError::UnknownConnection(connection))?;
        if !link.open || !link.accepted {
            return Err(TransportError::NotConnected);
        }
        link.to_server.push_back(NetEvent::Data(payload.to_vec()));
        Ok(())
    }

    fn disconnect(&mut self, connection: ConnectionId) {
        let mut hub = self.network.lock();
        hub.pending_accepts.retain(|pending| *pending != connection);
        if let Some(link) = hub.links.get_mut(&connection) {
            if link.open {
                link.open = false;
                link.to_client.clear();
                if link.accepted {
                    link.to_server.push_back(NetEvent::Disconnect);
                }
            }
        }
    }
}
