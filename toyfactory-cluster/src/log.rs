//! In-process committed log.
//!
//! Sequences accepted command frames into [`CommittedEntry`] values with
//! consecutive positions and strictly increasing commit timestamps, and
//! keeps the entries not yet covered by a snapshot.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use toyfactory_core::CommittedEntry;

/// The committed log of a [`LocalCluster`](crate::LocalCluster).
#[derive(Debug, Default)]
pub struct ReplicatedLog {
    /// Retained entries by position.
    logs: BTreeMap<u64, CommittedEntry>,
    /// Position of the newest entry (0 when nothing was ever appended).
    last_position: u64,
    /// Commit timestamp of the newest entry.
    last_timestamp_ms: u64,
    /// Entries up to and including this position have been compacted away.
    purged_through: u64,
}

impl ReplicatedLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue a log whose prefix up to `position` lives in a snapshot.
    ///
    /// `timestamp_ms` is the newest commit time known to the snapshot so
    /// new entries keep moving forward even if the clock went backwards.
    pub fn resume(position: u64, timestamp_ms: u64) -> Self {
        Self {
            logs: BTreeMap::new(),
            last_position: position,
            last_timestamp_ms: timestamp_ms,
            purged_through: position,
        }
    }

    /// Commit a command frame at the current wall-clock time.
    pub fn append(&mut self, data: Vec<u8>) -> CommittedEntry {
        self.append_at(data, now_ms())
    }

    /// Commit a command frame, using `now_ms` as the candidate timestamp.
    ///
    /// The assigned timestamp is bumped past the previous entry's when the
    /// clock has not advanced.
    pub fn append_at(&mut self, data: Vec<u8>, now_ms: u64) -> CommittedEntry {
        self.last_position += 1;
        self.last_timestamp_ms = now_ms.max(self.last_timestamp_ms + 1);

        let entry = CommittedEntry {
            position: self.last_position,
            timestamp_ms: self.last_timestamp_ms,
            data,
        };
        self.logs.insert(entry.position, entry.clone());
        entry
    }

    /// Retained entries after `position`, in order.
    pub fn entries_after(&self, position: u64) -> Vec<CommittedEntry> {
        self.logs
            .range(position.saturating_add(1)..)
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    /// Drop entries up to and including `position`.
    pub fn compact_through(&mut self, position: u64) {
        let position = position.min(self.last_position);
        if position <= self.purged_through {
            return;
        }

        self.logs = self.logs.split_off(&(position + 1));
        self.purged_through = position;

        tracing::debug!(
            purged_through = position,
            retained = self.logs.len(),
            "Compacted log"
        );
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.logs.len()
    }

    /// Whether no entries are retained.
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// Position of the newest entry.
    pub fn last_position(&self) -> u64 {
        self.last_position
    }

    /// Commit timestamp of the newest entry.
    pub fn last_timestamp_ms(&self) -> u64 {
        self.last_timestamp_ms
    }

    /// Highest compacted position.
    pub fn purged_through(&self) -> u64 {
        self.purged_through
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_consecutive() {
        let mut log = ReplicatedLog::new();
        let a = log.append(vec![1]);
        let b = log.append(vec![2]);
        assert_eq!(a.position, 1);
        assert_eq!(b.position, 2);
        assert_eq!(log.last_position(), 2);
    }

    #[test]
    fn timestamps_strictly_increase_when_clock_stalls() {
        let mut log = ReplicatedLog::new();
        let a = log.append_at(vec![], 5_000);
        let b = log.append_at(vec![], 5_000);
        let c = log.append_at(vec![], 4_000);
        let d = log.append_at(vec![], 9_000);

        assert_eq!(a.timestamp_ms, 5_000);
        assert_eq!(b.timestamp_ms, 5_001);
        assert_eq!(c.timestamp_ms, 5_002);
        assert_eq!(d.timestamp_ms, 9_000);
    }

    #[test]
    fn compaction_keeps_suffix() {
        let mut log = ReplicatedLog::new();
        for i in 0..5u8 {
            log.append_at(vec![i], 100);
        }

        log.compact_through(3);
        assert_eq!(log.len(), 2);
        assert_eq!(log.purged_through(), 3);
        let suffix: Vec<u64> = log.entries_after(0).iter().map(|e| e.position).collect();
        assert_eq!(suffix, vec![4, 5]);

        // Compacting backwards is a no-op
        log.compact_through(1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn resume_continues_after_snapshot() {
        let mut log = ReplicatedLog::resume(10, 50_000);
        let entry = log.append_at(vec![], 1);
        assert_eq!(entry.position, 11);
        assert_eq!(entry.timestamp_ms, 50_001);
        assert!(log.entries_after(10).len() == 1);
    }
}
