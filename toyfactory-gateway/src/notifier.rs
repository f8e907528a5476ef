//! Downstream workflow notifications.

use thiserror::Error;
use toyfactory_core::Event;

/// A workflow notification could not be delivered.
#[derive(Debug, Clone, Error)]
#[error("Workflow notification failed: {0}")]
pub struct NotifyError(pub String);

/// Receives every event the dispatch loop decodes, after it has been routed
/// to its caller.
///
/// Events whose caller already timed out are still delivered, since the
/// command they answer was committed. Delivery is at least once: a
/// redelivered frame is notified again, so implementations that start
/// external work should key it on the entity id.
///
/// Best effort: a failure is logged and has no effect on request
/// resolution. Implementations must not block.
pub trait WorkflowNotifier: Send + Sync {
    /// Handle one event.
    fn notify(&self, event: &Event) -> Result<(), NotifyError>;
}

/// Logs the start of the manufacturing and status-change workflows.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

impl WorkflowNotifier for LoggingNotifier {
    fn notify(&self, event: &Event) -> Result<(), NotifyError> {
        match event {
            Event::Created {
                entity_id,
                owner_id,
                ..
            } => {
                tracing::info!(
                    entity_id = %entity_id,
                    owner_id = %owner_id,
                    "Starting manufacturing workflow"
                );
            }
            Event::Updated {
                entity_id, status, ..
            } => {
                tracing::info!(
                    entity_id = %entity_id,
                    status = %status,
                    "Processing status change workflow"
                );
            }
            _ => {}
        }
        Ok(())
    }
}
