//! Authoritative map of active sessions to their players.
//!
//! The registry enforces the username uniqueness invariant itself: both
//! [`PlayerRegistry::bind`] and [`PlayerRegistry::update`] check and write in
//! one call, so no caller can observe a window where two sessions hold the
//! same name.

use log::info;
use shared::{Player, RosterEntry, SessionId};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("session {0} already has a player")]
    AlreadyBound(SessionId),
    #[error("session {0} has no player")]
    NotBound(SessionId),
    #[error("username {0:?} is held by another player")]
    UsernameTaken(String),
}

#[derive(Debug, Default)]
pub struct PlayerRegistry {
    /// Ordered by session id, which is join order.
    players: BTreeMap<SessionId, Player>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `player` to `session_id`.
    pub fn bind(&mut self, session_id: SessionId, player: Player) -> Result<(), RegistryError> {
        if self.is_bound(session_id) {
            return Err(RegistryError::AlreadyBound(session_id));
        }
        if self.holder_of(&player.username).is_some() {
            return Err(RegistryError::UsernameTaken(player.username));
        }

        info!(
            "Session {} registered as {:?} at ({}, {})",
            session_id, player.username, player.x, player.y
        );
        self.players.insert(session_id, player);
        Ok(())
    }

    /// Overwrites position and username of an already bound player. Renaming
    /// to a name held by another session is refused.
    pub fn update(&mut self, session_id: SessionId, player: Player) -> Result<(), RegistryError> {
        if let Some(holder) = self.holder_of(&player.username) {
            if holder != session_id {
                return Err(RegistryError::UsernameTaken(player.username));
            }
        }

        match self.players.get_mut(&session_id) {
            Some(current) => {
                *current = player;
                Ok(())
            }
            None => Err(RegistryError::NotBound(session_id)),
        }
    }

    pub fn remove(&mut self, session_id: SessionId) -> Option<Player> {
        let removed = self.players.remove(&session_id);
        if let Some(player) = &removed {
            info!("Session {} released {:?}", session_id, player.username);
        }
        removed
    }

    pub fn get(&self, session_id: SessionId) -> Option<&Player> {
        self.players.get(&session_id)
    }

    pub fn is_bound(&self, session_id: SessionId) -> bool {
        self.players.contains_key(&session_id)
    }

    /// Session currently holding `username`. Comparison is case-sensitive.
    pub fn holder_of(&self, username: &str) -> Option<SessionId> {
        self.players
            .iter()
            .find(|(_, player)| player.username == username)
            .map(|(id, _)| *id)
    }

    /// `{id, username}` pairs in join order.
    pub fn roster(&self) -> Vec<RosterEntry> {
        self.players
            .iter()
            .map(|(id, player)| RosterEntry {
                id: *id,
                username: player.username.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
