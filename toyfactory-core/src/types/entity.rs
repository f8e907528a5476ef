//! The factory entity record.

use super::{EntityId, OwnerId, Status};
use serde::{Deserialize, Serialize};

/// A factory entity.
///
/// Timestamps are Unix milliseconds taken from the commit timestamp of the
/// log entry that created or last changed the entity, never from a replica's
/// local clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Assigned at creation, immutable.
    pub id: EntityId,
    /// Customer that ordered the entity.
    pub owner_id: OwnerId,
    /// Current workflow status.
    pub status: Status,
    /// Commit time of the creating command.
    pub created_at_ms: u64,
    /// Commit time of the latest status change.
    pub updated_at_ms: u64,
}

impl Entity {
    /// Create a new `Pending` entity.
    pub fn new(id: EntityId, owner_id: OwnerId, created_at_ms: u64) -> Self {
        Self {
            id,
            owner_id,
            status: Status::Pending,
            created_at_ms,
            updated_at_ms: created_at_ms,
        }
    }

    /// Move to `status` at commit time `at_ms`.
    pub fn set_status(&mut self, status: Status, at_ms: u64) {
        self.status = status;
        self.updated_at_ms = at_ms;
    }
}
