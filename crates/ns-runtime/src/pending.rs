use std::collections::HashMap;

use ns_core::{InstanceId, ObjectId, PlayerId};

/// Routes a (player, object) pair to the instance waiting on that player.
#[derive(Debug, Default)]
pub struct PendingInteractions {
    entries: HashMap<(PlayerId, ObjectId), InstanceId>,
}

impl PendingInteractions {
    /// Both ids must be positive; a newer registration replaces the old one.
    pub fn register(&mut self, player_id: PlayerId, object_id: ObjectId, instance: InstanceId) -> bool {
        if player_id <= 0 || object_id <= 0 {
            return false;
        }
        self.entries.insert((player_id, object_id), instance);
        true
    }

    pub fn lookup(&self, player_id: PlayerId, object_id: ObjectId) -> Option<InstanceId> {
        self.entries.get(&(player_id, object_id)).copied()
    }

    pub fn remove(&mut self, player_id: PlayerId, object_id: ObjectId) -> Option<InstanceId> {
        self.entries.remove(&(player_id, object_id))
    }

    /// Removes the entry only while it still routes to `instance`.
    pub fn remove_if(&mut self, player_id: PlayerId, object_id: ObjectId, instance: InstanceId) -> bool {
        if self.lookup(player_id, object_id) != Some(instance) {
            return false;
        }
        self.entries.remove(&(player_id, object_id));
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
