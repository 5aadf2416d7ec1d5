//! "Who is online", mirrored from the player registry.

use shared::{PresenceEntry, PresenceStatus, SessionId};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct PresenceTracker {
    entries: BTreeMap<SessionId, PresenceEntry>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_online(&mut self, session_id: SessionId, username: &str) {
        self.entries.insert(
            session_id,
            PresenceEntry {
                username: username.to_string(),
                status: PresenceStatus::Online,
            },
        );
    }

    /// Follows a username change of an already present session.
    pub fn rename(&mut self, session_id: SessionId, username: &str) {
        if let Some(entry) = self.entries.get_mut(&session_id) {
            entry.username = username.to_string();
        }
    }

    pub fn remove(&mut self, session_id: SessionId) -> Option<PresenceEntry> {
        self.entries.remove(&session_id)
    }

    pub fn get(&self, session_id: SessionId) -> Option<&PresenceEntry> {
        self.entries.get(&session_id)
    }

    /// Full presence map, as broadcast on every join and leave.
    pub fn snapshot(&self) -> BTreeMap<SessionId, PresenceEntry> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
