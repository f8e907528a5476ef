//! Event dispatch loop.
//!
//! One task per connection drains the egress stream in delivery order,
//! routes each event to its waiting caller through the registry and then
//! hands it to the workflow notifier. Unmatched events are notified too.

use crate::notifier::WorkflowNotifier;
use crate::registry::CorrelationRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use toyfactory_core::{EgressReceiver, decode_event};

/// Counters reported when the dispatch loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events delivered to a waiting caller.
    pub resolved: u64,
    /// Events with no outstanding request.
    pub unmatched: u64,
    /// Frames that failed to decode.
    pub malformed: u64,
    /// Callers woken with `ConnectionClosed` at exit.
    pub abandoned: u64,
}

/// Handle to a running dispatch loop.
pub(crate) struct DispatchHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<DispatchStats>>,
}

impl DispatchHandle {
    /// Spawn the dispatch loop on the current runtime.
    pub(crate) fn spawn(
        registry: Arc<CorrelationRegistry>,
        egress: EgressReceiver,
        notifier: Arc<dyn WorkflowNotifier>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join = tokio::spawn(run(registry, egress, notifier, shutdown_rx));

        Self {
            shutdown_tx: Some(shutdown_tx),
            join: Some(join),
        }
    }

    /// Signal the loop to stop and wait up to `grace` for it.
    ///
    /// Returns `None` if the loop had to be aborted or already stopped.
    pub(crate) async fn shutdown(&mut self, grace: Duration) -> Option<DispatchStats> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        let mut join = self.join.take()?;
        match tokio::time::timeout(grace, &mut join).await {
            Ok(Ok(stats)) => Some(stats),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Event dispatcher failed");
                None
            }
            Err(_) => {
                tracing::warn!(
                    grace_ms = grace.as_millis() as u64,
                    "Event dispatcher did not stop in time, aborting"
                );
                join.abort();
                None
            }
        }
    }
}

impl Drop for DispatchHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn run(
    registry: Arc<CorrelationRegistry>,
    mut egress: EgressReceiver,
    notifier: Arc<dyn WorkflowNotifier>,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> DispatchStats {
    tracing::info!("Event dispatcher started");
    let mut stats = DispatchStats::default();

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown_rx => {
                // Frames already buffered still reach their callers.
                while let Ok(bytes) = egress.try_recv() {
                    dispatch(&bytes, &registry, notifier.as_ref(), &mut stats);
                }
                tracing::debug!("Event dispatcher received shutdown signal");
                break;
            }

            frame = egress.recv() => {
                match frame {
                    Some(bytes) => dispatch(&bytes, &registry, notifier.as_ref(), &mut stats),
                    None => {
                        tracing::info!("Event stream closed");
                        break;
                    }
                }
            }
        }
    }

    stats.abandoned = registry.close_all() as u64;

    tracing::info!(
        resolved = stats.resolved,
        unmatched = stats.unmatched,
        malformed = stats.malformed,
        abandoned = stats.abandoned,
        "Event dispatcher stopped"
    );
    stats
}

fn dispatch(
    bytes: &[u8],
    registry: &CorrelationRegistry,
    notifier: &dyn WorkflowNotifier,
    stats: &mut DispatchStats,
) {
    let frame = match decode_event(bytes) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(
                field = e.field().unwrap_or("-"),
                error = %e,
                "Dropping malformed event frame"
            );
            stats.malformed += 1;
            return;
        }
    };

    tracing::debug!(
        correlation_id = %frame.correlation_id,
        event = frame.event.name(),
        entity_id = %frame.event.entity_id(),
        "Dispatching event"
    );

    if registry.resolve(frame.correlation_id, frame.event.clone()) {
        stats.resolved += 1;
    } else {
        stats.unmatched += 1;
    }

    if let Err(e) = notifier.notify(&frame.event) {
        tracing::warn!(
            correlation_id = %frame.correlation_id,
            error = %e,
            "Workflow notifier failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::NotifyError;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;
    use toyfactory_core::{CorrelationId, EntityId, Event, EventFrame, encode_event};

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Event>>,
        fail: bool,
    }

    impl WorkflowNotifier for Recorder {
        fn notify(&self, event: &Event) -> Result<(), NotifyError> {
            self.seen.lock().push(event.clone());
            if self.fail {
                return Err(NotifyError("downstream unavailable".to_string()));
            }
            Ok(())
        }
    }

    fn frame(id: u64, entity: u64) -> Vec<u8> {
        encode_event(&EventFrame::new(
            CorrelationId::new(id),
            Event::NotFound {
                entity_id: EntityId::new(entity),
            },
        ))
    }

    #[tokio::test]
    async fn loop_survives_bad_frames_and_failing_notifier() {
        let registry = Arc::new(CorrelationRegistry::new());
        let notifier = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let (tx, rx) = mpsc::channel(8);
        let mut handle = DispatchHandle::spawn(Arc::clone(&registry), rx, notifier.clone());

        let reg = registry.register().unwrap();
        tx.send(vec![1, 2, 3]).await.unwrap();
        tx.send(frame(999, 1)).await.unwrap();
        tx.send(frame(reg.id().as_u64(), 2)).await.unwrap();

        let event = registry
            .await_result(reg, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(event.entity_id(), EntityId::new(2));

        let stats = handle.shutdown(Duration::from_secs(5)).await.unwrap();
        assert_eq!(stats.resolved, 1);
        assert_eq!(stats.unmatched, 1);
        assert_eq!(stats.malformed, 1);
        assert_eq!(notifier.seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn late_event_for_released_request_is_still_notified() {
        let registry = Arc::new(CorrelationRegistry::new());
        let notifier = Arc::new(Recorder::default());
        let (tx, rx) = mpsc::channel(8);
        let mut handle = DispatchHandle::spawn(Arc::clone(&registry), rx, notifier.clone());

        let reg = registry.register().unwrap();
        assert!(registry.release(reg.id()));
        tx.send(frame(reg.id().as_u64(), 5)).await.unwrap();
        tx.send(frame(reg.id().as_u64(), 5)).await.unwrap();
        drop(tx);

        let stats = handle.shutdown(Duration::from_secs(5)).await.unwrap();
        assert_eq!(stats.resolved, 0);
        assert_eq!(stats.unmatched, 2);

        // At least once: the redelivered frame is notified as well.
        let seen = notifier.seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|e| e.entity_id() == EntityId::new(5)));
    }

    #[tokio::test]
    async fn closed_stream_wakes_waiters() {
        let registry = Arc::new(CorrelationRegistry::new());
        let (tx, rx) = mpsc::channel(8);
        let mut handle =
            DispatchHandle::spawn(Arc::clone(&registry), rx, Arc::new(Recorder::default()));

        let reg = registry.register().unwrap();
        drop(tx);

        let result = registry.await_result(reg, Duration::from_secs(5)).await;
        assert_eq!(result, Err(crate::GatewayError::ConnectionClosed));

        let stats = handle.shutdown(Duration::from_secs(5)).await.unwrap();
        assert_eq!(stats.abandoned, 1);
    }

    #[tokio::test]
    async fn shutdown_drains_buffered_frames() {
        let registry = Arc::new(CorrelationRegistry::new());
        let (tx, rx) = mpsc::channel(8);
        let reg = registry.register().unwrap();
        let id = reg.id();
        tx.send(frame(id.as_u64(), 1)).await.unwrap();

        // Shutdown is signalled before the loop ever polls the stream.
        let mut handle =
            DispatchHandle::spawn(Arc::clone(&registry), rx, Arc::new(Recorder::default()));
        let stats = handle.shutdown(Duration::from_secs(5)).await.unwrap();

        assert_eq!(stats.resolved, 1);
        let event = registry
            .await_result(reg, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(event.entity_id(), EntityId::new(1));
        drop(tx);
    }
}
