//! Boundary to whatever draws and simulates player entities
//!
//! The protocol layer decides when a remote player appears, moves or leaves;
//! an implementation of `PlayerPresenter` turns that into visuals. The
//! headless client ships with `LogPresenter`, which only logs.

use log::{debug, info};
use shared::Vector3;

pub trait PlayerPresenter {
    fn on_player_created(&mut self, id: &str, position: Vector3);
    fn on_player_moved(&mut self, id: &str, position: Vector3);
    fn on_player_removed(&mut self, id: &str);
}

/// Presenter for headless clients
#[derive(Debug, Default)]
pub struct LogPresenter;

impl PlayerPresenter for LogPresenter {
    fn on_player_created(&mut self, id: &str, position: Vector3) {
        info!(
            "Player {} appeared at ({:.2}, {:.2}, {:.2})",
            id, position.x, position.y, position.z
        );
    }

    fn on_player_moved(&mut self, id: &str, position: Vector3) {
        debug!(
            "Player {} at ({:.2}, {:.2}, {:.2})",
            id, position.x, position.y, position.z
        );
    }

    fn on_player_removed(&mut self, id: &str) {
        info!("Player {} left", id);
    }
}
