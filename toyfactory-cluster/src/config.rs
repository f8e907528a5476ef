//! Cluster configuration.

use crate::state::MachineConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a cluster node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// This node's unique ID in the cluster (1-based).
    pub node_id: u64,

    /// Reject status updates that do not move an entity forward.
    ///
    /// Part of the replicated semantics: every member of a cluster must run
    /// with the same value.
    pub enforce_status_progress: bool,

    /// Maximum number of offered commands waiting to be sequenced.
    /// Offers beyond this are rejected as back pressure.
    pub ingress_capacity: usize,

    /// Maximum number of event frames buffered for the egress consumer.
    pub egress_capacity: usize,

    /// Snapshot configuration.
    pub snapshot: SnapshotConfig,
}

/// Snapshot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Take a snapshot after this many applied entries (0 disables).
    pub snapshot_threshold: u64,

    /// Directory for snapshot files. Snapshots stay in memory only when unset.
    pub snapshot_dir: Option<PathBuf>,

    /// Number of snapshot files to keep.
    pub retention_count: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            enforce_status_progress: false,
            ingress_capacity: 1_024,
            egress_capacity: 1_024,
            snapshot: SnapshotConfig::default(),
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            // Snapshot every 10000 entries
            snapshot_threshold: 10_000,
            snapshot_dir: None,
            retention_count: 3,
        }
    }
}

impl ClusterConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ClusterConfigBuilder {
        ClusterConfigBuilder::default()
    }

    /// State machine settings derived from this configuration.
    pub fn machine(&self) -> MachineConfig {
        MachineConfig {
            enforce_status_progress: self.enforce_status_progress,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.node_id == 0 {
            return Err("node_id must be > 0".to_string());
        }

        if self.ingress_capacity == 0 {
            return Err("ingress_capacity must be > 0".to_string());
        }

        if self.egress_capacity == 0 {
            return Err("egress_capacity must be > 0".to_string());
        }

        if self.snapshot.snapshot_dir.is_some() && self.snapshot.retention_count == 0 {
            return Err("retention_count must be > 0 when snapshot_dir is set".to_string());
        }

        Ok(())
    }
}

/// Builder for ClusterConfig.
#[derive(Debug, Default)]
pub struct ClusterConfigBuilder {
    config: ClusterConfig,
}

impl ClusterConfigBuilder {
    /// Set the node ID.
    pub fn node_id(mut self, id: u64) -> Self {
        self.config.node_id = id;
        self
    }

    /// Enable or disable monotonic status progress.
    pub fn enforce_status_progress(mut self, enforce: bool) -> Self {
        self.config.enforce_status_progress = enforce;
        self
    }

    /// Set the ingress queue capacity.
    pub fn ingress_capacity(mut self, capacity: usize) -> Self {
        self.config.ingress_capacity = capacity;
        self
    }

    /// Set the egress buffer capacity.
    pub fn egress_capacity(mut self, capacity: usize) -> Self {
        self.config.egress_capacity = capacity;
        self
    }

    /// Set snapshot threshold.
    pub fn snapshot_threshold(mut self, entries: u64) -> Self {
        self.config.snapshot.snapshot_threshold = entries;
        self
    }

    /// Set the snapshot directory.
    pub fn snapshot_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.snapshot.snapshot_dir = Some(path.into());
        self
    }

    /// Set how many snapshot files to keep.
    pub fn retention_count(mut self, count: usize) -> Self {
        self.config.snapshot.retention_count = count;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<ClusterConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}
