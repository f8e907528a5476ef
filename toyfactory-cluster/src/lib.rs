//! Replicated entity state machine for the toy factory cluster.
//!
//! Every cluster member runs an [`EntityStateMachine`]. Committed commands
//! arrive in log order, are applied one at a time against the entity store,
//! and each produces one event. Because apply reads nothing but the store and
//! the committed entry (including its commit timestamp), every member that
//! applies the same log ends with the same store and emits the same events.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        LocalCluster                          │
//! │                                                              │
//! │  ingress ──► ┌────────────┐   ┌──────────────────┐           │
//! │  (offer)     │ Replicated │──►│ EntityStateMachine│──► egress │
//! │              │    Log     │   │  ┌────────────┐  │  (events) │
//! │              └─────┬──────┘   │  │EntityStore │  │           │
//! │                    │ compact  │  └────────────┘  │           │
//! │                    ▼          └────────┬─────────┘           │
//! │              ┌────────────┐   snapshot │                     │
//! │              │ Snapshots  │◄───────────┘                     │
//! │              └────────────┘                                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The consensus transport is not part of this crate. [`LocalCluster`] is a
//! single-process stand-in that honours the same contracts: it sequences
//! offered commands into a log with commit timestamps, applies them in order,
//! streams event frames out, snapshots and compacts, and reports role
//! changes and termination.
//!
//! # Usage
//!
//! ```ignore
//! use toyfactory_cluster::{ClusterConfig, LocalCluster};
//!
//! let config = ClusterConfig::builder().node_id(1).snapshot_threshold(1_000).build()?;
//! let (mut cluster, egress) = LocalCluster::start(config).await?;
//! let ingress = cluster.ingress();
//! // hand `ingress` and `egress` to a gateway ...
//! cluster.terminate().await?;
//! ```

pub mod config;
pub mod error;
pub mod log;
pub mod node;
pub mod state;

pub use config::{ClusterConfig, SnapshotConfig};
pub use error::{ClusterError, ClusterResult};
pub use log::ReplicatedLog;
pub use node::{LocalCluster, LocalIngress};
pub use state::{
    ApplyContext, ApplyOutcome, EntityStateMachine, EntityStore, FactoryState, MachineConfig,
    Snapshot, SnapshotStore,
};
