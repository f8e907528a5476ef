//! Shared building blocks for the toy factory cluster.
//!
//! This crate holds everything both sides of the replicated log agree on:
//!
//! - **Data model**: [`Entity`], [`Status`] and the strongly-typed identifiers.
//! - **Messages**: the [`Command`] set accepted by the state machine and the
//!   [`Event`] set it emits, each wrapped in a frame that carries the
//!   caller's [`CorrelationId`].
//! - **Codec**: a compact, checksummed, length-framed binary encoding of
//!   command and event frames ([`codec`]).
//! - **Transport contracts**: the small surface consumed from the
//!   replication layer ([`transport`]).
//!
//! # Flow
//!
//! ```text
//!  gateway                    replicated log                 state machine
//!  ───────                    ──────────────                 ─────────────
//!  CommandFrame ─encode─► offer(bytes) ─commit─► CommittedEntry ─decode─► apply
//!                                                                       │
//!  resolve(id) ◄─decode─ egress(bytes) ◄────────────encode─ EventFrame ◄┘
//! ```

pub mod codec;
pub mod error;
pub mod message;
pub mod transport;
pub mod types;

pub use codec::{decode_command, decode_event, encode_command, encode_event};
pub use error::{DecodeError, DecodeResult};
pub use message::{Command, CommandFrame, Event, EventFrame};
pub use transport::{CommandSink, CommittedEntry, EgressReceiver, EgressSender, OfferError, Role};
pub use types::{CorrelationId, Entity, EntityId, OwnerId, Status};
