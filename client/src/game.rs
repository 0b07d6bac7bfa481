use crate::presenter::PlayerPresenter;
use log::{debug, warn};
use shared::{PlayerState, Vector3};
use std::collections::HashMap;

/// The client's local view of every player
///
/// Remote players follow server snapshots. The client's own player ("self")
/// is authored locally and never taken from the network.
#[derive(Debug, Default)]
pub struct ShadowWorld {
    self_id: Option<String>,
    players: HashMap<String, Vector3>,
}

impl ShadowWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the locally controlled player once the server assigned an identity
    pub fn spawn_self(
        &mut self,
        id: &str,
        position: Vector3,
        presenter: &mut impl PlayerPresenter,
    ) {
        self.self_id = Some(id.to_string());
        if self.players.insert(id.to_string(), position).is_none() {
            presenter.on_player_created(id, position);
        }
    }

    pub fn self_id(&self) -> Option<&str> {
        self.self_id.as_deref()
    }

    /// Position of the local player, or `None` before it exists
    pub fn self_position(&self) -> Option<Vector3> {
        self.self_id
            .as_ref()
            .and_then(|id| self.players.get(id))
            .copied()
    }

    /// Records a locally authored position for the own player
    pub fn set_self_position(&mut self, position: Vector3) -> bool {
        match self.self_id.as_ref().and_then(|id| self.players.get_mut(id)) {
            Some(current) => {
                *current = position;
                true
            }
            None => false,
        }
    }

    /// Reconciles remote players with a server snapshot
    ///
    /// Unknown players are created, known ones moved. Players missing from the
    /// snapshot are kept; only an explicit drop removes them. The entry named
    /// `self_id` is skipped entirely.
    pub fn apply_snapshot(
        &mut self,
        snapshot: &[PlayerState],
        self_id: &str,
        presenter: &mut impl PlayerPresenter,
    ) {
        for player in snapshot.iter().filter(|p| p.id != self_id) {
            match self.players.get_mut(&player.id) {
                Some(position) => {
                    if *position != player.position {
                        *position = player.position;
                        presenter.on_player_moved(&player.id, player.position);
                    }
                }
                None => {
                    debug!("Creating remote player {}", player.id);
                    self.players.insert(player.id.clone(), player.position);
                    presenter.on_player_created(&player.id, player.position);
                }
            }
        }
    }

    /// Removes a remote player; returns false if it was unknown
    pub fn remove(&mut self, id: &str, presenter: &mut impl PlayerPresenter) -> bool {
        if self.self_id.as_deref() == Some(id) {
            warn!("Refusing to remove own player {}", id);
            return false;
        }

        if self.players.remove(id).is_some() {
            presenter.on_player_removed(id);
            true
        } else {
            false
        }
    }

    pub fn get(&self, id: &str) -> Option<Vector3> {
        self.players.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.players.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
