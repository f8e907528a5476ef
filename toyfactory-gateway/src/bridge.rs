//! Gateway bridge: synchronous-looking calls over the replicated log.

use crate::config::GatewayConfig;
use crate::dispatch::{DispatchHandle, DispatchStats};
use crate::error::{GatewayError, GatewayResult};
use crate::notifier::{LoggingNotifier, WorkflowNotifier};
use crate::registry::CorrelationRegistry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use toyfactory_core::{
    Command, CommandFrame, CommandSink, EgressReceiver, Entity, EntityId, Event, OwnerId, Status,
    encode_command,
};

/// Connection health, as reported to the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayHealth {
    /// Whether the transport is connected and the bridge is running.
    pub connected: bool,
    /// Requests waiting for their event.
    pub outstanding: usize,
}

/// Result of a status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// Updated entity.
    pub entity_id: EntityId,
    /// Its new status.
    pub status: Status,
    /// Commit time of the update.
    pub updated_at_ms: u64,
}

/// Turns each call into a correlated command and waits for its event.
///
/// Safe to share between any number of concurrent callers. Must be created
/// inside a Tokio runtime, which runs the dispatch loop.
///
/// # Usage
///
/// ```ignore
/// let bridge = GatewayBridge::connect(GatewayConfig::default(), Arc::new(ingress), egress)?;
/// let entity = bridge.create_entity(OwnerId::new(42)).await?;
/// let same = bridge.get_entity(entity.id).await?;
/// bridge.shutdown().await;
/// ```
pub struct GatewayBridge {
    config: GatewayConfig,
    sink: Arc<dyn CommandSink>,
    registry: Arc<CorrelationRegistry>,
    dispatcher: Mutex<Option<DispatchHandle>>,
}

impl GatewayBridge {
    /// Connect to a transport, logging workflow notifications.
    pub fn connect(
        config: GatewayConfig,
        sink: Arc<dyn CommandSink>,
        egress: EgressReceiver,
    ) -> GatewayResult<Self> {
        Self::connect_with_notifier(config, sink, egress, Arc::new(LoggingNotifier))
    }

    /// Connect to a transport with a custom workflow notifier.
    pub fn connect_with_notifier(
        config: GatewayConfig,
        sink: Arc<dyn CommandSink>,
        egress: EgressReceiver,
        notifier: Arc<dyn WorkflowNotifier>,
    ) -> GatewayResult<Self> {
        config.validate().map_err(GatewayError::Config)?;

        let registry = Arc::new(CorrelationRegistry::new());
        let dispatcher = DispatchHandle::spawn(Arc::clone(&registry), egress, notifier);

        tracing::info!(
            request_timeout_ms = config.request_timeout_ms,
            connected = sink.is_connected(),
            "Gateway bridge connected"
        );

        Ok(Self {
            config,
            sink,
            registry,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// Submit a command and wait for the event it produces.
    ///
    /// Fails fast with `NotConnected` or `SubmitRejected` without leaving a
    /// registration behind. `RequestTimeout` means the outcome is unknown.
    pub async fn submit(&self, command: Command) -> GatewayResult<Event> {
        if !self.sink.is_connected() {
            return Err(GatewayError::NotConnected);
        }

        let registration = self.registry.register()?;
        let id = registration.id();
        let frame = encode_command(&CommandFrame::new(id, command));

        if let Err(e) = self.sink.offer(frame) {
            self.registry.release(id);
            tracing::warn!(
                correlation_id = %id,
                command = command.name(),
                error = %e,
                "Command rejected by transport"
            );
            return Err(GatewayError::SubmitRejected(e));
        }

        tracing::debug!(correlation_id = %id, command = command.name(), "Submitted command");

        let result = self
            .registry
            .await_result(registration, self.config.request_timeout())
            .await;

        if let Err(e) = &result {
            tracing::warn!(
                correlation_id = %id,
                command = command.name(),
                error = %e,
                "Request failed"
            );
        }
        result
    }

    /// Create an entity for a customer.
    pub async fn create_entity(&self, owner_id: OwnerId) -> GatewayResult<Entity> {
        match self.submit(Command::Create { owner_id }).await? {
            Event::Created {
                entity_id,
                owner_id,
                status,
                created_at_ms,
            } => Ok(Entity {
                id: entity_id,
                owner_id,
                status,
                created_at_ms,
                updated_at_ms: created_at_ms,
            }),
            other => Err(unexpected("Create", other)),
        }
    }

    /// Read an entity through the committed order.
    pub async fn get_entity(&self, entity_id: EntityId) -> GatewayResult<Entity> {
        match self.submit(Command::Get { entity_id }).await? {
            Event::Info { entity } => Ok(entity),
            Event::NotFound { entity_id } => Err(GatewayError::NotFound(entity_id)),
            other => Err(unexpected("Get", other)),
        }
    }

    /// Move an entity to a new status.
    pub async fn update_status(
        &self,
        entity_id: EntityId,
        status: Status,
    ) -> GatewayResult<StatusChange> {
        if !status.is_valid() {
            return Err(GatewayError::InvalidStatus(status));
        }

        match self.submit(Command::UpdateStatus { entity_id, status }).await? {
            Event::Updated {
                entity_id,
                status,
                updated_at_ms,
            } => Ok(StatusChange {
                entity_id,
                status,
                updated_at_ms,
            }),
            Event::NotFound { entity_id } => Err(GatewayError::NotFound(entity_id)),
            Event::StatusRegressed {
                entity_id,
                current,
                requested,
            } => Err(GatewayError::StatusRegressed {
                entity_id,
                current,
                requested,
            }),
            other => Err(unexpected("UpdateStatus", other)),
        }
    }

    /// Current connection health.
    pub fn health(&self) -> GatewayHealth {
        GatewayHealth {
            connected: self.sink.is_connected() && !self.registry.is_closed(),
            outstanding: self.registry.outstanding(),
        }
    }

    /// The correlation registry.
    pub fn registry(&self) -> &CorrelationRegistry {
        &self.registry
    }

    /// Stop the dispatch loop and wake every waiting caller.
    ///
    /// Buffered events are still delivered. Returns the loop's counters, or
    /// `None` if it had already stopped or had to be aborted.
    pub async fn shutdown(&self) -> Option<DispatchStats> {
        let handle = self.dispatcher.lock().take();
        let stats = match handle {
            Some(mut handle) => handle.shutdown(self.config.shutdown_grace()).await,
            None => None,
        };

        // Covers an aborted loop; a no-op otherwise.
        self.registry.close_all();

        tracing::info!("Gateway bridge shut down");
        stats
    }
}

fn unexpected(expected: &'static str, event: Event) -> GatewayError {
    tracing::warn!(expected, event = event.name(), "Unexpected event for command");
    GatewayError::UnexpectedEvent {
        expected,
        event: Box::new(event),
    }
}
