//! Commands accepted by the state machine and the events it emits.
//!
//! Commands are the only mutating input to the entity store; events are the
//! only output. Both travel inside a frame that carries the correlation id of
//! the gateway request that caused them.

use crate::types::{CorrelationId, Entity, EntityId, OwnerId, Status};
use serde::{Deserialize, Serialize};

/// Commands replicated through the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Create a new entity for a customer.
    Create {
        /// Customer placing the order.
        owner_id: OwnerId,
    },

    /// Move an entity to a new status.
    UpdateStatus {
        /// Entity to update.
        entity_id: EntityId,
        /// Requested status. Never `Unknown`.
        status: Status,
    },

    /// Read an entity through the committed order.
    Get {
        /// Entity to read.
        entity_id: EntityId,
    },
}

impl Command {
    /// Get a human-readable name for this command type.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Create { .. } => "Create",
            Command::UpdateStatus { .. } => "UpdateStatus",
            Command::Get { .. } => "Get",
        }
    }

    /// Whether applying this command can change the store.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Command::Get { .. })
    }
}

/// Events emitted by applying a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A new entity was stored.
    Created {
        /// Newly assigned id.
        entity_id: EntityId,
        /// Owning customer.
        owner_id: OwnerId,
        /// Always `Pending`.
        status: Status,
        /// Commit time of the create.
        created_at_ms: u64,
    },

    /// An entity's status changed.
    Updated {
        /// Updated entity.
        entity_id: EntityId,
        /// New status.
        status: Status,
        /// Commit time of the update.
        updated_at_ms: u64,
    },

    /// Current state of an entity, answering a `Get`.
    Info {
        /// The stored record.
        entity: Entity,
    },

    /// The referenced entity does not exist.
    NotFound {
        /// Id that was looked up.
        entity_id: EntityId,
    },

    /// A status update was refused because it does not move the workflow
    /// forward. Only emitted when progress enforcement is enabled.
    StatusRegressed {
        /// Entity that was left untouched.
        entity_id: EntityId,
        /// Status the entity still has.
        current: Status,
        /// Status that was requested.
        requested: Status,
    },
}

impl Event {
    /// Get a human-readable name for this event type.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Created { .. } => "Created",
            Event::Updated { .. } => "Updated",
            Event::Info { .. } => "Info",
            Event::NotFound { .. } => "NotFound",
            Event::StatusRegressed { .. } => "StatusRegressed",
        }
    }

    /// The entity this event is about.
    pub fn entity_id(&self) -> EntityId {
        match self {
            Event::Created { entity_id, .. }
            | Event::Updated { entity_id, .. }
            | Event::NotFound { entity_id }
            | Event::StatusRegressed { entity_id, .. } => *entity_id,
            Event::Info { entity } => entity.id,
        }
    }
}

/// A command tagged with the correlation id of the request that sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    /// Request the command belongs to.
    pub correlation_id: CorrelationId,
    /// The command itself.
    pub command: Command,
}

impl CommandFrame {
    /// Wrap a command.
    pub fn new(correlation_id: CorrelationId, command: Command) -> Self {
        Self {
            correlation_id,
            command,
        }
    }
}

/// An event tagged with the correlation id copied from its command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFrame {
    /// Request the event answers.
    pub correlation_id: CorrelationId,
    /// The event itself.
    pub event: Event,
}

impl EventFrame {
    /// Wrap an event.
    pub fn new(correlation_id: CorrelationId, event: Event) -> Self {
        Self {
            correlation_id,
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_get_is_read_only() {
        let entity_id = EntityId::new(1);
        assert!(
            Command::Create {
                owner_id: OwnerId::new(7)
            }
            .is_mutation()
        );
        assert!(
            Command::UpdateStatus {
                entity_id,
                status: Status::Sourced
            }
            .is_mutation()
        );
        assert!(!Command::Get { entity_id }.is_mutation());
    }

    #[test]
    fn info_reports_the_entity_it_carries() {
        let entity = Entity {
            id: EntityId::new(3),
            owner_id: OwnerId::new(9),
            status: Status::Pending,
            created_at_ms: 10,
            updated_at_ms: 10,
        };
        let event = Event::Info { entity };
        assert_eq!(event.entity_id(), EntityId::new(3));
        assert_eq!(event.name(), "Info");
    }
}
