//! Gateway side of the toy factory: request/response over a replicated log.
//!
//! A caller's request becomes a command frame tagged with a fresh
//! correlation id. The frame is offered to the cluster, and the caller waits
//! until the event carrying the same id comes back on the egress stream.
//!
//! ```text
//!  caller ──► GatewayBridge ──register──► CorrelationRegistry ◄──resolve──┐
//!                  │                                                       │
//!                  └──offer(frame)──► cluster ──egress──► dispatch loop ───┘
//!                                                              │
//!                                                              └──► WorkflowNotifier
//! ```
//!
//! Events are matched by id, never by arrival order, so concurrent requests
//! cannot receive each other's results. Every id resolves at most once; a
//! late event for a timed-out request is dropped with a warning.

pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod notifier;
pub mod registry;

pub use bridge::{GatewayBridge, GatewayHealth, StatusChange};
pub use config::{GatewayConfig, GatewayConfigBuilder};
pub use dispatch::DispatchStats;
pub use error::{GatewayError, GatewayResult};
pub use notifier::{LoggingNotifier, NotifyError, WorkflowNotifier};
pub use registry::{CorrelationRegistry, Registration};
