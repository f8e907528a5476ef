//! Types for command application.

use serde::{Deserialize, Serialize};
use toyfactory_core::{CommittedEntry, DecodeError, EventFrame};

/// Settings that change apply semantics.
///
/// These are part of the replicated behaviour: every replica of a cluster
/// must use the same values or their stores diverge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Refuse status updates that are not strictly forward.
    pub enforce_status_progress: bool,
}

/// Log metadata of the entry being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyContext {
    /// Log position.
    pub position: u64,
    /// Commit timestamp in Unix milliseconds.
    pub timestamp_ms: u64,
}

impl From<&CommittedEntry> for ApplyContext {
    fn from(entry: &CommittedEntry) -> Self {
        Self {
            position: entry.position,
            timestamp_ms: entry.timestamp_ms,
        }
    }
}

/// Result of handing one committed entry to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The command was applied and produced this event.
    Applied(EventFrame),
    /// The entry's position was already applied; nothing happened.
    Duplicate,
    /// The entry could not be decoded. The position is consumed and the
    /// store is untouched.
    Rejected(DecodeError),
}

impl ApplyOutcome {
    /// The emitted event frame, if any.
    pub fn event(&self) -> Option<&EventFrame> {
        match self {
            ApplyOutcome::Applied(frame) => Some(frame),
            _ => None,
        }
    }

    /// Consume and return the emitted event frame, if any.
    pub fn into_event(self) -> Option<EventFrame> {
        match self {
            ApplyOutcome::Applied(frame) => Some(frame),
            _ => None,
        }
    }
}
