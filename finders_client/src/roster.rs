//! Player roster.
//!
//! The client's copy of every known player, keyed by server id. At most one
//! entry is flagged local. Mutators report what they did through return
//! values; the connection layer turns those into bus events.

use std::collections::HashMap;

use finders_shared::{
    math::Vec3,
    net::{PlayerId, PlayerSnapshot},
};
use tracing::debug;

/// A known player.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub display_name: String,
    pub position: Vec3,
}

impl PlayerRecord {
    pub fn new(id: PlayerId, display_name: impl Into<String>, position: Vec3) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            position,
        }
    }
}

impl From<&PlayerSnapshot> for PlayerRecord {
    fn from(p: &PlayerSnapshot) -> Self {
        PlayerRecord::new(p.id.clone(), p.name.clone(), p.position())
    }
}

/// Mapping of player id to record.
#[derive(Debug, Default)]
pub struct Roster {
    players: HashMap<PlayerId, PlayerRecord>,
    local: Option<PlayerId>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a record. Returns the previous record, if any.
    pub fn upsert(&mut self, record: PlayerRecord) -> Option<PlayerRecord> {
        self.players.insert(record.id.clone(), record)
    }

    /// Moves a known player. Unknown ids are ignored and reported as `false`.
    pub fn update_position(&mut self, id: &PlayerId, position: Vec3) -> bool {
        match self.players.get_mut(id) {
            Some(record) => {
                record.position = position;
                true
            }
            None => {
                debug!(player_id = %id, "Position update for unknown player");
                false
            }
        }
    }

    /// Removes a record, dropping the local flag if it pointed at it.
    pub fn remove(&mut self, id: &PlayerId) -> Option<PlayerRecord> {
        if self.local.as_ref() == Some(id) {
            self.local = None;
        }
        self.players.remove(id)
    }

    /// Drops every record and the local flag.
    pub fn clear(&mut self) {
        self.players.clear();
        self.local = None;
    }

    /// Flags `id` as the local player. Only an existing record can be flagged,
    /// and flagging replaces any previous flag.
    pub fn set_local(&mut self, id: &PlayerId) -> bool {
        if self.players.contains_key(id) {
            self.local = Some(id.clone());
            true
        } else {
            false
        }
    }

    pub fn is_local(&self, id: &PlayerId) -> bool {
        self.local.as_ref() == Some(id)
    }

    pub fn local(&self) -> Option<&PlayerRecord> {
        self.local.as_ref().and_then(|id| self.players.get(id))
    }

    pub fn get(&self, id: &PlayerId) -> Option<&PlayerRecord> {
        self.players.get(id)
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.players.contains_key(id)
    }

    /// First record with exactly this display name, in no particular order.
    pub fn find_by_name(&self, name: &str) -> Option<&PlayerRecord> {
        self.players.values().find(|r| r.display_name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerRecord> {
        self.players.values()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
