//! Replicated entity state machine.
//!
//! The state machine is the core of the cluster's replicated state. It:
//! - Receives committed log entries in log order
//! - Decodes and applies them deterministically against the entity store
//! - Exports and installs snapshots for recovery and log compaction
//!
//! ## Module Structure
//!
//! - `types`: Apply outcome, apply context and machine settings
//! - `state`: The replicated FactoryState
//! - `apply`: Command application logic

mod apply;
mod state;
mod types;

pub use state::FactoryState;
pub use types::{ApplyContext, ApplyOutcome, MachineConfig};

use crate::error::ClusterResult;
use crate::state::{EntityStore, Snapshot};
use toyfactory_core::{CommittedEntry, Entity, EntityId, EventFrame, Role, decode_command};

/// The entity state machine of one replica.
///
/// Applies are strictly sequential; the owner serializes access.
#[derive(Debug, Default)]
pub struct EntityStateMachine {
    state: FactoryState,
    config: MachineConfig,
    role: Option<Role>,
}

impl EntityStateMachine {
    /// Create an empty state machine.
    pub fn new(config: MachineConfig) -> Self {
        Self {
            state: FactoryState::default(),
            config,
            role: None,
        }
    }

    /// Create a state machine from a snapshot.
    pub fn from_snapshot(config: MachineConfig, snapshot: Snapshot) -> ClusterResult<Self> {
        let mut machine = Self::new(config);
        machine.install_snapshot(snapshot)?;
        Ok(machine)
    }

    /// Apply one committed entry.
    ///
    /// Entries at or below the last applied position are ignored, so
    /// redelivery and replay over a snapshot are harmless. An entry that
    /// does not decode consumes its position and leaves the store alone.
    pub fn apply(&mut self, entry: &CommittedEntry) -> ApplyOutcome {
        if entry.position <= self.state.last_applied {
            tracing::debug!(
                position = entry.position,
                last_applied = self.state.last_applied,
                "Skipping already applied entry"
            );
            return ApplyOutcome::Duplicate;
        }

        self.state.last_applied = entry.position;

        let frame = match decode_command(&entry.data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(
                    position = entry.position,
                    field = e.field().unwrap_or("-"),
                    error = %e,
                    "Rejected malformed committed entry"
                );
                return ApplyOutcome::Rejected(e);
            }
        };

        let event = apply::apply_command(
            &mut self.state,
            frame.command,
            ApplyContext::from(entry),
            self.config,
        );

        tracing::debug!(
            position = entry.position,
            correlation_id = %frame.correlation_id,
            command = frame.command.name(),
            mutation = frame.command.is_mutation(),
            event = event.name(),
            entity_id = %event.entity_id(),
            "Applied command"
        );

        ApplyOutcome::Applied(EventFrame::new(frame.correlation_id, event))
    }

    /// Capture the current state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.state)
    }

    /// Capture and encode the current state.
    pub fn export_snapshot(&self) -> ClusterResult<Vec<u8>> {
        self.snapshot().encode()
    }

    /// Replace the current state with a snapshot.
    ///
    /// On error the current state is kept.
    pub fn install_snapshot(&mut self, snapshot: Snapshot) -> ClusterResult<()> {
        let position = snapshot.last_applied;
        let entities = snapshot.entities.len();
        self.state = snapshot.into_state()?;

        tracing::info!(position, entities, "Installed snapshot");
        Ok(())
    }

    /// Decode and install an encoded snapshot.
    pub fn import_snapshot(&mut self, bytes: &[u8]) -> ClusterResult<()> {
        let snapshot = Snapshot::decode(bytes)?;
        self.install_snapshot(snapshot)
    }

    /// Record a role change reported by the transport.
    pub fn on_role_change(&mut self, role: Role) {
        let previous = self.role.replace(role);
        tracing::info!(
            role = %role,
            previous = ?previous,
            last_applied = self.state.last_applied,
            "Role changed"
        );
    }

    /// Record that the transport has terminated this replica.
    pub fn on_terminate(&self) {
        tracing::info!(
            last_applied = self.state.last_applied,
            entities = self.state.store.len(),
            "Replica terminated"
        );
    }

    /// The replicated state.
    pub fn state(&self) -> &FactoryState {
        &self.state
    }

    /// The entity store.
    pub fn store(&self) -> &EntityStore {
        self.state.store()
    }

    /// Look up an entity in the local replica.
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.state.store.get(id)
    }

    /// Log position of the last applied entry.
    pub fn last_applied(&self) -> u64 {
        self.state.last_applied
    }

    /// Id the next `Create` will receive.
    pub fn next_id(&self) -> u64 {
        self.state.next_id
    }

    /// Last role reported by the transport.
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// Apply settings.
    pub fn config(&self) -> MachineConfig {
        self.config
    }
}
