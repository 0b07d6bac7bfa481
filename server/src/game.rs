use log::{debug, info};
use shared::{PlayerState, Vector3};
use std::collections::HashMap;

/// Authoritative player positions, keyed by identity
///
/// Snapshots list players in the order their id was first seen. Writes are
/// unconditional: the most recent position wins.
#[derive(Debug, Clone, Default)]
pub struct PlayerStore {
    positions: HashMap<String, Vector3>,
    order: Vec<String>,
}

impl PlayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a player's position, creating the entry if needed; returns true on creation
    pub fn upsert(&mut self, id: &str, position: Vector3) -> bool {
        match self.positions.get_mut(id) {
            Some(current) => {
                *current = position;
                false
            }
            None => {
                self.positions.insert(id.to_string(), position);
                self.order.push(id.to_string());
                info!(
                    "Added player {} at ({}, {}, {})",
                    id, position.x, position.y, position.z
                );
                true
            }
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Vector3> {
        let position = self.positions.remove(id)?;
        self.order.retain(|existing| existing != id);
        debug!("Removed player {}", id);
        Some(position)
    }

    pub fn get(&self, id: &str) -> Option<Vector3> {
        self.positions.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn snapshot(&self) -> Vec<PlayerState> {
        self.order
            .iter()
            .filter_map(|id| {
                self.positions
                    .get(id)
                    .map(|position| PlayerState::new(id.clone(), *position))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
