use shared::{FRAME_INTERVAL, SYNC_INTERVAL};
use std::time::Duration;

/// How far the server trusts the id carried in a client's position update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityPolicy {
    /// Accept whatever id the update names. A client can move any player.
    #[default]
    Trusted,
    /// Only accept updates naming the identity bound to the sending connection
    Bound,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interval between snapshot broadcasts
    pub sync_interval: Duration,
    /// Interval between transport event drains
    pub frame_interval: Duration,
    pub identity_policy: IdentityPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            sync_interval: SYNC_INTERVAL,
            frame_interval: FRAME_INTERVAL,
            identity_policy: IdentityPolicy::Trusted,
        }
    }
}
