//! Snapshot export, import and on-disk storage.
//!
//! A snapshot is the whole entity store in id order plus the last-applied
//! log position and the id counter. Encoded snapshots are self-describing:
//!
//! ```text
//! magic "TFSN" | version: u32 LE | body_len: u64 LE | JSON body
//! ```
//!
//! The same bytes are handed to the transport for state transfer and written
//! to snapshot files.

use super::machine::FactoryState;
use super::store::EntityStore;
use crate::error::{ClusterError, ClusterResult};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use toyfactory_core::Entity;

/// Snapshot format version.
const SNAPSHOT_VERSION: u32 = 1;
/// Magic bytes for encoded snapshots.
const SNAPSHOT_MAGIC: &[u8; 4] = b"TFSN";
/// Magic + version + body length.
const HEADER_LEN: usize = 16;

/// Point-in-time copy of the factory state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Log position of the last entry reflected in this snapshot.
    pub last_applied: u64,
    /// Id the next `Create` will receive.
    pub next_id: u64,
    /// All entities, ordered by id.
    pub entities: Vec<Entity>,
}

impl Snapshot {
    /// Capture the given state.
    pub fn capture(state: &FactoryState) -> Self {
        Self {
            last_applied: state.last_applied(),
            next_id: state.next_id(),
            entities: state.store().iter().cloned().collect(),
        }
    }

    /// Check the snapshot describes a state the machine could have reached.
    pub fn validate(&self) -> ClusterResult<()> {
        if self.next_id == 0 {
            return Err(ClusterError::Snapshot("next_id must be > 0".to_string()));
        }

        let mut previous = 0u64;
        for entity in &self.entities {
            let id = entity.id.as_u64();
            if id <= previous {
                return Err(ClusterError::Snapshot(format!(
                    "entities not in strictly increasing id order at {}",
                    entity.id
                )));
            }
            if id >= self.next_id {
                return Err(ClusterError::Snapshot(format!(
                    "{} is not below next_id {}",
                    entity.id, self.next_id
                )));
            }
            if !entity.status.is_valid() {
                return Err(ClusterError::Snapshot(format!(
                    "{} has status {}",
                    entity.id, entity.status
                )));
            }
            previous = id;
        }

        Ok(())
    }

    /// Rebuild the state this snapshot was captured from.
    pub fn into_state(self) -> ClusterResult<FactoryState> {
        self.validate()?;
        Ok(FactoryState {
            store: self.entities.into_iter().collect::<EntityStore>(),
            next_id: self.next_id,
            last_applied: self.last_applied,
        })
    }

    /// Encode with header.
    pub fn encode(&self) -> ClusterResult<Vec<u8>> {
        let body = serde_json::to_vec(self)?;
        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        out.extend_from_slice(SNAPSHOT_MAGIC);
        out.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        out.extend_from_slice(&(body.len() as u64).to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decode and validate an encoded snapshot.
    pub fn decode(bytes: &[u8]) -> ClusterResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(ClusterError::Snapshot(format!(
                "snapshot too short: {} bytes",
                bytes.len()
            )));
        }

        if &bytes[0..4] != SNAPSHOT_MAGIC {
            return Err(ClusterError::Snapshot("Invalid snapshot magic".to_string()));
        }

        let mut version_bytes = [0u8; 4];
        version_bytes.copy_from_slice(&bytes[4..8]);
        let version = u32::from_le_bytes(version_bytes);
        if version != SNAPSHOT_VERSION {
            return Err(ClusterError::Snapshot(format!(
                "Unsupported snapshot version: {}",
                version
            )));
        }

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&bytes[8..16]);
        let len = u64::from_le_bytes(len_bytes);
        let body = &bytes[HEADER_LEN..];
        if body.len() as u64 != len {
            return Err(ClusterError::Snapshot(format!(
                "snapshot body is {} bytes, header says {}",
                body.len(),
                len
            )));
        }

        let snapshot: Snapshot = serde_json::from_slice(body)?;
        snapshot.validate()?;
        Ok(snapshot)
    }
}

/// Directory of snapshot files.
///
/// Files are named `snapshot_{last_applied:016x}.snap`, written to a
/// temporary file and renamed into place. Only the newest `retention` files
/// are kept.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    directory: PathBuf,
    retention: usize,
}

impl SnapshotStore {
    /// Open (creating if needed) a snapshot directory.
    pub fn open(directory: impl Into<PathBuf>, retention: usize) -> ClusterResult<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|e| {
            ClusterError::Snapshot(format!(
                "Failed to create snapshot directory {}: {}",
                directory.display(),
                e
            ))
        })?;

        Ok(Self {
            directory,
            retention: retention.max(1),
        })
    }

    /// The snapshot directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Write a snapshot and prune old files.
    pub fn save(&self, snapshot: &Snapshot) -> ClusterResult<PathBuf> {
        let path = self.snapshot_path(snapshot.last_applied);
        let temp_path = path.with_extension("snap.tmp");
        let bytes = snapshot.encode()?;

        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&bytes)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);

        fs::rename(&temp_path, &path)?;

        tracing::info!(
            position = snapshot.last_applied,
            entities = snapshot.entities.len(),
            path = %path.display(),
            "Wrote snapshot"
        );

        self.cleanup_old_snapshots();
        Ok(path)
    }

    /// Load the newest readable snapshot, falling back to older files.
    pub fn load_latest(&self) -> ClusterResult<Option<Snapshot>> {
        let mut positions = self.positions()?;
        positions.sort_by(|a, b| b.cmp(a));

        for position in positions {
            let path = self.snapshot_path(position);
            match Self::load(&path) {
                Ok(snapshot) => return Ok(Some(snapshot)),
                Err(e) => {
                    tracing::warn!(
                        position,
                        error = %e,
                        "Failed to load snapshot, trying older one"
                    );
                }
            }
        }

        Ok(None)
    }

    /// Load a single snapshot file.
    pub fn load(path: &Path) -> ClusterResult<Snapshot> {
        let bytes = fs::read(path)?;
        Snapshot::decode(&bytes)
            .map_err(|e| ClusterError::Snapshot(format!("{}: {}", path.display(), e)))
    }

    /// Positions of the snapshot files present, ascending.
    pub fn positions(&self) -> ClusterResult<Vec<u64>> {
        let mut positions = Vec::new();

        for entry in fs::read_dir(&self.directory)?.flatten() {
            let name = entry.file_name();
            let name_str = name.to_string_lossy();

            if let Some(id_str) = name_str
                .strip_prefix("snapshot_")
                .and_then(|s| s.strip_suffix(".snap"))
            {
                if let Ok(position) = u64::from_str_radix(id_str, 16) {
                    positions.push(position);
                }
            }
        }

        positions.sort_unstable();
        Ok(positions)
    }

    fn cleanup_old_snapshots(&self) {
        let positions = match self.positions() {
            Ok(positions) => positions,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list snapshots for cleanup");
                return;
            }
        };

        if positions.len() <= self.retention {
            return;
        }

        let to_remove = positions.len() - self.retention;
        for position in positions.iter().take(to_remove) {
            let path = self.snapshot_path(*position);
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!(position, error = %e, "Failed to remove old snapshot");
            } else {
                tracing::debug!(position, "Removed old snapshot");
            }
        }
    }

    fn snapshot_path(&self, position: u64) -> PathBuf {
        self.directory.join(format!("snapshot_{:016x}.snap", position))
    }
}
