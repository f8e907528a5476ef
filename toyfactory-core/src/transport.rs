//! Contracts consumed from the replication layer.
//!
//! The consensus transport itself lives outside this workspace. What the
//! state machine and the gateway need from it is small:
//!
//! - the gateway offers encoded command frames ([`CommandSink`]);
//! - every replica receives committed entries in log order
//!   ([`CommittedEntry`]);
//! - the gateway drains encoded event frames from an egress stream
//!   ([`EgressReceiver`]);
//! - replicas are told about role changes ([`Role`]).

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

/// Receiving end of the stream of encoded event frames.
pub type EgressReceiver = mpsc::Receiver<Vec<u8>>;

/// Sending end of the stream of encoded event frames.
pub type EgressSender = mpsc::Sender<Vec<u8>>;

/// A command that the log has committed, as delivered to each replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedEntry {
    /// Log position, strictly increasing from 1.
    pub position: u64,
    /// Commit time in Unix milliseconds, assigned once by the log and
    /// identical on every replica.
    pub timestamp_ms: u64,
    /// Encoded command frame.
    pub data: Vec<u8>,
}

/// Why the transport refused an offered command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OfferError {
    /// The ingress queue is full.
    #[error("back pressured: ingress queue is full")]
    BackPressured,

    /// The transport has been closed.
    #[error("transport closed")]
    Closed,

    /// This member cannot accept ingress in its current role.
    #[error("not the leader (current role: {0})")]
    NotLeader(Role),
}

/// Accepts encoded command frames for replication.
///
/// `offer` must not block: a full or closed transport is reported at once so
/// the caller can fail fast instead of queueing.
pub trait CommandSink: Send + Sync {
    /// Whether the transport is currently connected.
    fn is_connected(&self) -> bool;

    /// Offer an encoded command frame to the log.
    fn offer(&self, frame: Vec<u8>) -> Result<(), OfferError>;
}

/// Role of a cluster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Accepts ingress and sequences the log.
    Leader,
    /// Replicates the leader's log.
    Follower,
    /// Standing for election.
    Candidate,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Leader => "leader",
            Role::Follower => "follower",
            Role::Candidate => "candidate",
        };
        f.write_str(s)
    }
}
