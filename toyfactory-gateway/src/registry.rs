//! Correlation registry: outstanding requests keyed by correlation id.
//!
//! The registry is the one structure shared between callers and the event
//! dispatch loop. Every id is resolved at most once: `resolve`, timeout
//! release and shutdown all remove the entry under the same lock, and
//! whichever gets there first wins.

use crate::error::{GatewayError, GatewayResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use toyfactory_core::{CorrelationId, Event};

/// A request waiting for its event.
struct Pending {
    created_at: Instant,
    tx: oneshot::Sender<Event>,
}

struct Inner {
    pending: HashMap<CorrelationId, Pending>,
    /// Set by `close_all`; no registrations are accepted afterwards.
    closed: bool,
}

/// Ticket for one outstanding request, returned by
/// [`CorrelationRegistry::register`] and consumed by
/// [`CorrelationRegistry::await_result`].
#[derive(Debug)]
pub struct Registration {
    id: CorrelationId,
    rx: oneshot::Receiver<Event>,
}

impl Registration {
    /// The correlation id to tag the command with.
    pub fn id(&self) -> CorrelationId {
        self.id
    }
}

/// Maps correlation ids to waiting callers.
pub struct CorrelationRegistry {
    /// Next id to hand out. Never reused for the life of the process.
    next_id: AtomicU64,
    inner: Mutex<Inner>,
}

impl Default for CorrelationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationRegistry {
    /// Create an empty registry. Ids start at 1.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            inner: Mutex::new(Inner {
                pending: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Register a new outstanding request.
    ///
    /// Fails with `ConnectionClosed` once the registry has been closed.
    pub fn register(&self) -> GatewayResult<Registration> {
        let (tx, rx) = oneshot::channel();

        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(GatewayError::ConnectionClosed);
        }

        let id = CorrelationId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        inner.pending.insert(
            id,
            Pending {
                created_at: Instant::now(),
                tx,
            },
        );
        drop(inner);

        tracing::trace!(correlation_id = %id, "Registered request");
        Ok(Registration { id, rx })
    }

    /// Wait for the event of a registered request.
    ///
    /// Suspends until the id is resolved or `timeout` elapses. On timeout
    /// the entry is removed and `RequestTimeout` is returned, so a late event
    /// for the id is dropped by `resolve`. If the caller's future is dropped
    /// early the entry is removed as well.
    pub async fn await_result(
        &self,
        registration: Registration,
        timeout: Duration,
    ) -> GatewayResult<Event> {
        let Registration { id, mut rx } = registration;
        let mut guard = ReleaseOnDrop {
            registry: self,
            id,
            armed: true,
        };

        let result = match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(event)) => Ok(event),
            // Sender dropped without an event: the registry was closed.
            Ok(Err(_)) => Err(GatewayError::ConnectionClosed),
            Err(_) => {
                if self.release(id) {
                    Err(GatewayError::RequestTimeout {
                        timeout_ms: timeout.as_millis() as u64,
                    })
                } else {
                    // Resolved or closed between the deadline and the release.
                    rx.try_recv().map_err(|_| GatewayError::ConnectionClosed)
                }
            }
        };

        guard.armed = false;
        result
    }

    /// Deliver an event to the request registered under `id`.
    ///
    /// Returns `false`, and does nothing else, when no request with that id
    /// is outstanding (already resolved, timed out, or never registered).
    pub fn resolve(&self, id: CorrelationId, event: Event) -> bool {
        let mut inner = self.inner.lock();
        let Some(pending) = inner.pending.remove(&id) else {
            drop(inner);
            tracing::warn!(
                correlation_id = %id,
                event = event.name(),
                "No outstanding request for event, dropping"
            );
            return false;
        };

        let waited = pending.created_at.elapsed();
        let name = event.name();
        // Sent under the lock so a racing timeout sees the event in its
        // receiver once it finds the entry gone.
        let delivered = pending.tx.send(event).is_ok();
        drop(inner);

        if delivered {
            tracing::debug!(
                correlation_id = %id,
                event = name,
                waited_us = waited.as_micros() as u64,
                "Resolved request"
            );
        } else {
            tracing::warn!(
                correlation_id = %id,
                event = name,
                "Caller went away before its event arrived"
            );
        }
        delivered
    }

    /// Remove an outstanding request without resolving it.
    ///
    /// Returns `false` if it was no longer outstanding.
    pub fn release(&self, id: CorrelationId) -> bool {
        let removed = self.inner.lock().pending.remove(&id).is_some();
        if removed {
            tracing::debug!(correlation_id = %id, "Released request");
        }
        removed
    }

    /// Close the registry and wake every waiter with `ConnectionClosed`.
    ///
    /// Returns how many requests were outstanding.
    pub fn close_all(&self) -> usize {
        let drained: Vec<Pending> = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.pending.drain().map(|(_, p)| p).collect()
        };

        let count = drained.len();
        // Dropping the senders wakes the receivers.
        drop(drained);

        if count > 0 {
            tracing::info!(outstanding = count, "Closed registry, woke waiting callers");
        }
        count
    }

    /// Number of outstanding requests.
    pub fn outstanding(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Whether `id` is outstanding.
    pub fn contains(&self, id: CorrelationId) -> bool {
        self.inner.lock().pending.contains_key(&id)
    }

    /// Whether `close_all` has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

/// Removes the registry entry if `await_result` is cancelled.
struct ReleaseOnDrop<'a> {
    registry: &'a CorrelationRegistry,
    id: CorrelationId,
    armed: bool,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.registry.release(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use toyfactory_core::EntityId;

    fn not_found(id: u64) -> Event {
        Event::NotFound {
            entity_id: EntityId::new(id),
        }
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let registry = CorrelationRegistry::new();
        let a = registry.register().unwrap();
        let b = registry.register().unwrap();
        assert_eq!(a.id(), CorrelationId::new(1));
        assert_eq!(b.id(), CorrelationId::new(2));
        assert_eq!(registry.outstanding(), 2);
    }

    #[tokio::test]
    async fn resolve_delivers_to_matching_waiter() {
        let registry = CorrelationRegistry::new();
        let a = registry.register().unwrap();
        let b = registry.register().unwrap();
        let (a_id, b_id) = (a.id(), b.id());

        // Resolve in reverse order
        assert!(registry.resolve(b_id, not_found(2)));
        assert!(registry.resolve(a_id, not_found(1)));

        let timeout = Duration::from_secs(1);
        assert_eq!(registry.await_result(a, timeout).await, Ok(not_found(1)));
        assert_eq!(registry.await_result(b, timeout).await, Ok(not_found(2)));
        assert_eq!(registry.outstanding(), 0);
    }

    #[test]
    fn second_resolve_is_ignored() {
        let registry = CorrelationRegistry::new();
        let reg = registry.register().unwrap();
        assert!(registry.resolve(reg.id(), not_found(1)));
        assert!(!registry.resolve(reg.id(), not_found(1)));
        assert!(!registry.resolve(CorrelationId::new(999), not_found(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_removes_entry_and_drops_late_event() {
        let registry = CorrelationRegistry::new();
        let reg = registry.register().unwrap();
        let id = reg.id();

        let result = registry.await_result(reg, Duration::from_millis(50)).await;
        assert_eq!(result, Err(GatewayError::RequestTimeout { timeout_ms: 50 }));
        assert!(!registry.contains(id));

        let newer = registry.register().unwrap();
        assert_ne!(newer.id(), id);
        assert!(!registry.resolve(id, not_found(1)));
        assert!(registry.contains(newer.id()));
    }

    #[tokio::test]
    async fn close_all_wakes_waiters() {
        let registry = Arc::new(CorrelationRegistry::new());
        let reg = registry.register().unwrap();

        let waiter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry
                    .await_result(reg, Duration::from_secs(30))
                    .await
            })
        };

        tokio::task::yield_now().await;
        assert_eq!(registry.close_all(), 1);
        assert_eq!(waiter.await.unwrap(), Err(GatewayError::ConnectionClosed));
        assert!(matches!(
            registry.register(),
            Err(GatewayError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn cancelled_wait_releases_entry() {
        let registry = CorrelationRegistry::new();
        let reg = registry.register().unwrap();
        let id = reg.id();

        {
            let wait = registry.await_result(reg, Duration::from_secs(30));
            tokio::pin!(wait);
            // Poll once so the guard is armed, then drop the future.
            assert!(poll_once(wait.as_mut()).await.is_none());
        }

        assert!(!registry.contains(id));
    }

    async fn poll_once<F: std::future::Future + Unpin>(fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            out = fut => Some(out),
            _ = std::future::ready(()) => None,
        }
    }
}
