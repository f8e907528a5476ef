//! Error types for gateway operations.

use thiserror::Error;
use toyfactory_core::{EntityId, Event, OfferError, Status};

/// Result type for gateway operations.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Errors returned to a gateway caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The transport is not connected; nothing was submitted.
    #[error("Not connected to the cluster")]
    NotConnected,

    /// The transport refused the command; nothing was submitted.
    #[error("Submit rejected: {0}")]
    SubmitRejected(#[from] OfferError),

    /// No event arrived in time. The command may or may not have been
    /// applied.
    #[error("Request timed out after {timeout_ms}ms (outcome unknown)")]
    RequestTimeout {
        /// Deadline that elapsed.
        timeout_ms: u64,
    },

    /// The bridge is shutting down or its event stream closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// `Unknown` is not a status an entity can be moved to.
    #[error("Invalid status: {0}")]
    InvalidStatus(Status),

    /// The referenced entity does not exist.
    #[error("Entity not found: {0}")]
    NotFound(EntityId),

    /// The status update would move the entity backwards.
    #[error("Status of {entity_id} cannot move from {current} to {requested}")]
    StatusRegressed {
        /// Entity that was left untouched.
        entity_id: EntityId,
        /// Status it still has.
        current: Status,
        /// Status that was requested.
        requested: Status,
    },

    /// An event of the wrong kind answered the request.
    #[error("Unexpected {} event in reply to {expected}", .event.name())]
    UnexpectedEvent {
        /// Command the caller sent.
        expected: &'static str,
        /// Event that arrived.
        event: Box<Event>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Whether the command may have been applied despite the error.
    pub fn is_outcome_unknown(&self) -> bool {
        matches!(self, GatewayError::RequestTimeout { .. } | GatewayError::ConnectionClosed)
    }
}
