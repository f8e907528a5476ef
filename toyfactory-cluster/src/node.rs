//! LocalCluster - a single-process replicated log driving the state machine.

use crate::config::ClusterConfig;
use crate::error::{ClusterError, ClusterResult};
use crate::log::ReplicatedLog;
use crate::state::{EntityStateMachine, MachineConfig, Snapshot, SnapshotStore};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock as AsyncRwLock, RwLockReadGuard, mpsc, oneshot};
use tokio::task::JoinHandle;
use toyfactory_core::{
    CommandSink, CommittedEntry, EgressReceiver, EgressSender, OfferError, Role, encode_event,
};

/// How long `terminate` waits for the sequencer before aborting it.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// State shared between the node handle, its ingress handles and the
/// sequencer task.
struct Shared {
    /// The state machine. Only the sequencer writes to it.
    machine: AsyncRwLock<EntityStateMachine>,
    /// Committed entries not yet covered by a snapshot.
    log: Mutex<ReplicatedLog>,
    /// Newest snapshot, in memory.
    latest_snapshot: Mutex<Option<Snapshot>>,
    /// Snapshot files, when a directory is configured.
    snapshot_store: Option<SnapshotStore>,
    /// Position of the newest snapshot.
    snapshot_position: AtomicU64,
    /// Applied entries between automatic snapshots (0 disables).
    snapshot_threshold: u64,
    /// Current role of this member.
    role: RwLock<Role>,
    /// Cleared on terminate.
    connected: AtomicBool,
    machine_config: MachineConfig,
}

impl Shared {
    /// Commit, apply and publish one offered frame.
    async fn sequence(&self, data: Vec<u8>, egress: &EgressSender) {
        let entry = self.log.lock().append(data);

        let outcome = self.machine.write().await.apply(&entry);

        if let Some(frame) = outcome.into_event() {
            let bytes = encode_event(&frame);
            if egress.send(bytes).await.is_err() {
                tracing::warn!(
                    position = entry.position,
                    correlation_id = %frame.correlation_id,
                    "Egress consumer gone, dropping event"
                );
            }
        }

        let since_snapshot = entry
            .position
            .saturating_sub(self.snapshot_position.load(Ordering::Acquire));
        if self.snapshot_threshold > 0 && since_snapshot >= self.snapshot_threshold {
            if let Err(e) = self.take_snapshot().await {
                tracing::warn!(position = entry.position, error = %e, "Automatic snapshot failed");
            }
        }
    }

    /// Snapshot the state machine, persist it and compact the log.
    async fn take_snapshot(&self) -> ClusterResult<Snapshot> {
        let snapshot = self.machine.read().await.snapshot();

        if let Some(store) = &self.snapshot_store {
            let store = store.clone();
            let to_save = snapshot.clone();
            tokio::task::spawn_blocking(move || store.save(&to_save))
                .await
                .map_err(|e| ClusterError::Snapshot(format!("snapshot writer failed: {}", e)))??;
        }

        let position = snapshot.last_applied;
        {
            let mut log = self.log.lock();
            let mut latest = self.latest_snapshot.lock();
            let is_newer = latest
                .as_ref()
                .is_none_or(|current| current.last_applied <= position);
            if is_newer {
                *latest = Some(snapshot.clone());
                log.compact_through(position);
                self.snapshot_position.fetch_max(position, Ordering::AcqRel);
            }
        }

        tracing::info!(
            position,
            entities = snapshot.entities.len(),
            "Took snapshot"
        );
        Ok(snapshot)
    }
}

/// Ingress handle of a [`LocalCluster`].
///
/// Offers never wait: a full queue is reported as back pressure.
#[derive(Clone)]
pub struct LocalIngress {
    tx: mpsc::Sender<Vec<u8>>,
    shared: Arc<Shared>,
}

impl CommandSink for LocalIngress {
    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    fn offer(&self, frame: Vec<u8>) -> Result<(), OfferError> {
        if !self.shared.connected.load(Ordering::Acquire) {
            return Err(OfferError::Closed);
        }

        let role = *self.shared.role.read();
        if role != Role::Leader {
            return Err(OfferError::NotLeader(role));
        }

        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => OfferError::BackPressured,
            TrySendError::Closed(_) => OfferError::Closed,
        })
    }
}

impl std::fmt::Debug for LocalIngress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalIngress")
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// A single-process cluster member.
///
/// Sequences offered command frames into the committed log, applies them to
/// the state machine in order on one task, and streams encoded event frames
/// to the egress receiver returned by [`LocalCluster::start`].
pub struct LocalCluster {
    /// This node's ID.
    node_id: u64,
    /// Configuration the node was started with.
    config: ClusterConfig,
    /// State shared with the sequencer.
    shared: Arc<Shared>,
    /// Ingress handle template.
    ingress: LocalIngress,
    /// Shutdown signal sender.
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// The sequencer task.
    sequencer: Option<JoinHandle<()>>,
}

impl LocalCluster {
    /// Start a node and return it with its egress stream.
    ///
    /// With a snapshot directory configured, the newest readable snapshot in
    /// it is installed before the node accepts ingress.
    pub async fn start(config: ClusterConfig) -> ClusterResult<(Self, EgressReceiver)> {
        config.validate().map_err(ClusterError::Config)?;

        let node_id = config.node_id;
        let machine_config = config.machine();

        let snapshot_store = match &config.snapshot.snapshot_dir {
            Some(dir) => Some(SnapshotStore::open(
                dir.clone(),
                config.snapshot.retention_count,
            )?),
            None => None,
        };

        let recovered = match &snapshot_store {
            Some(store) => store.load_latest()?,
            None => None,
        };

        let (mut machine, log) = match recovered.clone() {
            Some(snapshot) => {
                let position = snapshot.last_applied;
                let newest_ms = snapshot
                    .entities
                    .iter()
                    .map(|e| e.updated_at_ms)
                    .max()
                    .unwrap_or(0);
                (
                    EntityStateMachine::from_snapshot(machine_config, snapshot)?,
                    ReplicatedLog::resume(position, newest_ms),
                )
            }
            None => (EntityStateMachine::new(machine_config), ReplicatedLog::new()),
        };

        // A single member always leads.
        machine.on_role_change(Role::Leader);

        let position = machine.last_applied();
        let entities = machine.store().len();

        let (ingress_tx, ingress_rx) = mpsc::channel(config.ingress_capacity);
        let (egress_tx, egress_rx) = mpsc::channel(config.egress_capacity);

        let shared = Arc::new(Shared {
            machine: AsyncRwLock::new(machine),
            log: Mutex::new(log),
            latest_snapshot: Mutex::new(recovered),
            snapshot_store,
            snapshot_position: AtomicU64::new(position),
            snapshot_threshold: config.snapshot.snapshot_threshold,
            role: RwLock::new(Role::Leader),
            connected: AtomicBool::new(true),
            machine_config,
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let sequencer = tokio::spawn(run_sequencer(
            Arc::clone(&shared),
            ingress_rx,
            egress_tx,
            shutdown_rx,
        ));

        tracing::info!(node_id, position, entities, "Cluster node started");

        Ok((
            Self {
                node_id,
                config,
                ingress: LocalIngress {
                    tx: ingress_tx,
                    shared: Arc::clone(&shared),
                },
                shared,
                shutdown_tx: Some(shutdown_tx),
                sequencer: Some(sequencer),
            },
            egress_rx,
        ))
    }

    /// Get this node's ID.
    pub fn node_id(&self) -> u64 {
        self.node_id
    }

    /// Configuration the node was started with.
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// A handle for offering command frames.
    pub fn ingress(&self) -> LocalIngress {
        self.ingress.clone()
    }

    /// Current role.
    pub fn role(&self) -> Role {
        *self.shared.role.read()
    }

    /// Change this member's role and tell the state machine.
    ///
    /// Only a leader accepts ingress.
    pub async fn set_role(&self, role: Role) {
        *self.shared.role.write() = role;
        self.shared.machine.write().await.on_role_change(role);
    }

    /// Get a read-only view of the state machine.
    pub async fn state_machine(&self) -> RwLockReadGuard<'_, EntityStateMachine> {
        self.shared.machine.read().await
    }

    /// Take a snapshot now.
    pub async fn trigger_snapshot(&self) -> ClusterResult<Snapshot> {
        self.ensure_running()?;
        self.shared.take_snapshot().await
    }

    /// The newest snapshot, if any was taken or recovered.
    pub fn latest_snapshot(&self) -> Option<Snapshot> {
        self.shared.latest_snapshot.lock().clone()
    }

    /// Retained committed entries after `position`.
    pub fn entries_after(&self, position: u64) -> Vec<CommittedEntry> {
        self.shared.log.lock().entries_after(position)
    }

    /// Number of retained log entries.
    pub fn log_len(&self) -> usize {
        self.shared.log.lock().len()
    }

    /// Build a new replica from the newest snapshot and the retained log.
    ///
    /// The replica reaches the state of every entry committed so far.
    pub fn spawn_replica(&self) -> ClusterResult<EntityStateMachine> {
        let (snapshot, entries) = {
            let log = self.shared.log.lock();
            let snapshot = self.shared.latest_snapshot.lock().clone();
            let from = snapshot.as_ref().map_or(0, |s| s.last_applied);
            (snapshot, log.entries_after(from))
        };

        let mut replica = match snapshot {
            Some(snapshot) => EntityStateMachine::from_snapshot(self.shared.machine_config, snapshot)?,
            None => EntityStateMachine::new(self.shared.machine_config),
        };
        replica.on_role_change(Role::Follower);

        let replayed = entries.len();
        for entry in &entries {
            replica.apply(entry);
        }

        tracing::info!(
            node_id = self.node_id,
            position = replica.last_applied(),
            replayed,
            "Spawned replica"
        );
        Ok(replica)
    }

    /// Whether `terminate` has been called.
    pub fn is_terminated(&self) -> bool {
        self.shutdown_tx.is_none()
    }

    /// Stop sequencing and close the egress stream.
    ///
    /// Entries already offered but not yet sequenced are dropped. Calling
    /// this twice is a no-op.
    pub async fn terminate(&mut self) -> ClusterResult<()> {
        self.shared.connected.store(false, Ordering::Release);

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        } else {
            return Ok(());
        }

        if let Some(mut handle) = self.sequencer.take() {
            match tokio::time::timeout(TERMINATE_GRACE, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    return Err(ClusterError::Terminated(format!(
                        "sequencer failed: {}",
                        e
                    )));
                }
                Err(_) => {
                    tracing::warn!(node_id = self.node_id, "Sequencer did not stop in time, aborting");
                    handle.abort();
                }
            }
        }

        let persisted = self.persist_final_snapshot().await;

        self.shared.machine.read().await.on_terminate();
        tracing::info!(node_id = self.node_id, "Cluster node terminated");
        persisted
    }

    /// Persist entries applied since the newest snapshot file.
    ///
    /// Without this a restart would recover an older `next_id` and hand out
    /// ids that callers were already given.
    async fn persist_final_snapshot(&self) -> ClusterResult<()> {
        if self.shared.snapshot_store.is_none() {
            return Ok(());
        }

        let applied = self.shared.machine.read().await.last_applied();
        if applied <= self.shared.snapshot_position.load(Ordering::Acquire) {
            return Ok(());
        }

        self.shared.take_snapshot().await.map(|_| ()).inspect_err(|e| {
            tracing::warn!(node_id = self.node_id, position = applied, error = %e, "Final snapshot failed");
        })
    }

    fn ensure_running(&self) -> ClusterResult<()> {
        if self.is_terminated() {
            return Err(ClusterError::Terminated(format!(
                "node {} is terminated",
                self.node_id
            )));
        }
        Ok(())
    }
}

impl Drop for LocalCluster {
    fn drop(&mut self) {
        self.shared.connected.store(false, Ordering::Release);
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Sequencer loop: one offered frame at a time, until shutdown.
async fn run_sequencer(
    shared: Arc<Shared>,
    mut ingress: mpsc::Receiver<Vec<u8>>,
    egress: EgressSender,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    tracing::debug!("Sequencer started");

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown_rx => {
                tracing::debug!("Sequencer received shutdown signal");
                break;
            }

            frame = ingress.recv() => {
                match frame {
                    Some(data) => shared.sequence(data, &egress).await,
                    None => break,
                }
            }
        }
    }

    // Dropping `egress` closes the stream for the consumer.
    tracing::debug!("Sequencer stopped");
}
