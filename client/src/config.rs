use shared::{FRAME_INTERVAL, SYNC_INTERVAL};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Interval between position reports to the server
    pub report_interval: Duration,
    /// Interval between transport event drains
    pub frame_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            report_interval: SYNC_INTERVAL,
            frame_interval: FRAME_INTERVAL,
        }
    }
}
