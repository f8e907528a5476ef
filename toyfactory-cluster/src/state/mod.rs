//! Replicated entity state.
//!
//! The state machine receives committed log entries (encoded command frames)
//! and applies them to the entity store. All replicas apply the same entries
//! in the same order and therefore hold the same store.

mod machine;
mod snapshot;
mod store;

pub use machine::{ApplyContext, ApplyOutcome, EntityStateMachine, FactoryState, MachineConfig};
pub use snapshot::{Snapshot, SnapshotStore};
pub use store::EntityStore;
