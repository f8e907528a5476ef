//! The replicated factory state.

use crate::state::EntityStore;
use toyfactory_core::EntityId;

/// Everything a replica must agree on.
///
/// The id counter lives here rather than in a process-local atomic so that
/// replaying the log, with or without a snapshot, hands out the same ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryState {
    /// All entities.
    pub(crate) store: EntityStore,
    /// Id the next `Create` will receive.
    pub(crate) next_id: u64,
    /// Log position of the last applied entry (0 before any).
    pub(crate) last_applied: u64,
}

impl Default for FactoryState {
    fn default() -> Self {
        Self {
            store: EntityStore::new(),
            next_id: 1,
            last_applied: 0,
        }
    }
}

impl FactoryState {
    /// The entity store.
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Id the next `Create` will receive.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Log position of the last applied entry.
    pub fn last_applied(&self) -> u64 {
        self.last_applied
    }

    /// Take the next entity id.
    pub(crate) fn allocate_id(&mut self) -> EntityId {
        let id = EntityId::new(self.next_id);
        self.next_id += 1;
        id
    }
}
