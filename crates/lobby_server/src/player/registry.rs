//! Concurrent player registry.
//!
//! Every operation touches a single key and is atomic on its own. There is
//! no cross-record atomicity; callers that need "check then insert" must
//! use [`PlayerRegistry::add`], which performs it under one entry guard.

use super::{Player, PlayerId, PlayerState};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct PlayerRegistry {
    players: Arc<DashMap<PlayerId, Player>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new player in the `Connected` state and returns a copy of
    /// the record.
    ///
    /// If the id is somehow already registered, the existing record is kept
    /// and returned unchanged.
    pub fn add(&self, id: PlayerId, remote_addr: SocketAddr) -> Player {
        match self.players.entry(id) {
            Entry::Occupied(existing) => {
                warn!("Player {} already registered, keeping existing record", id);
                existing.get().clone()
            }
            Entry::Vacant(slot) => {
                let player = Player::new(id, remote_addr);
                slot.insert(player.clone());
                debug!("👤 Registered player {} from {}", id, remote_addr);
                player
            }
        }
    }

    /// Removes a player. Returns whether a record existed.
    pub fn remove(&self, id: PlayerId) -> bool {
        self.players.remove(&id).is_some()
    }

    pub fn get(&self, id: PlayerId) -> Option<Player> {
        self.players.get(&id).map(|entry| entry.value().clone())
    }

    /// Snapshot of every registered player, ordered by id.
    pub fn list(&self) -> Vec<Player> {
        let mut players: Vec<Player> = self
            .players
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        players.sort_by_key(|player| player.id);
        players
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|entry| *entry.key()).collect()
    }

    pub fn count(&self) -> usize {
        self.players.len()
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    pub fn update_state(&self, id: PlayerId, state: PlayerState) -> bool {
        self.modify(id, |player| player.state = state)
    }

    pub fn set_ready(&self, id: PlayerId, ready: bool) -> bool {
        self.modify(id, |player| player.ready = ready)
    }

    pub fn set_team(&self, id: PlayerId, team_id: u32, color_id: u32) -> bool {
        self.modify(id, |player| {
            player.team_id = team_id;
            player.color_id = color_id;
        })
    }

    pub fn set_display_name(&self, id: PlayerId, name: impl Into<String>) -> bool {
        let name = name.into();
        self.modify(id, move |player| player.display_name = name)
    }

    /// Display name for `id`, if the player is still registered.
    pub fn display_name(&self, id: PlayerId) -> Option<String> {
        self.players
            .get(&id)
            .map(|entry| entry.value().display_name.clone())
    }

    fn modify(&self, id: PlayerId, update: impl FnOnce(&mut Player)) -> bool {
        match self.players.get_mut(&id) {
            Some(mut player) => {
                update(player.value_mut());
                true
            }
            None => {
                warn!("Ignoring update for unknown player {}", id);
                false
            }
        }
    }
}
