use shared::ConnectionId;

/// The client's single server connection, if any
#[derive(Debug, Default)]
pub struct ConnectionSlot {
    current: Option<ConnectionId>,
}

impl ConnectionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the connection, returning the one it replaced
    pub fn set_connection(&mut self, connection: ConnectionId) -> Option<ConnectionId> {
        self.current.replace(connection)
    }

    pub fn current(&self) -> Option<ConnectionId> {
        self.current
    }

    pub fn clear(&mut self) -> Option<ConnectionId> {
        self.current.take()
    }

    pub fn is_connected(&self) -> bool {
        self.current.is_some()
    }
}
