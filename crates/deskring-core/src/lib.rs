//! # deskring-core
//!
//! Shared library for deskring containing the peer wire protocol and the
//! replicated-order domain logic.
//!
//! This crate is used by every node process. It has zero dependencies on OS
//! APIs, UI frameworks, or network sockets.
//!
//! # Architecture overview
//!
//! deskring links several desktop machines on a LAN into one logical desktop
//! row: a single keyboard/mouse focus (the "grab"), a single clipboard owner,
//! and a single primary-selection owner wander between the machines, while
//! every node maintains the same left-to-right ordering of all known nodes.
//! There is no coordinator — every node speaks to every other node and
//! conflicts are resolved with per-resource generation counters and
//! deterministic tie-breaks.
//!
//! This crate defines:
//!
//! - **`protocol`** – how bytes travel over the peer channel. Messages are
//!   encoded into a compact binary format (16-byte header + payload) and
//!   decoded back into a typed [`RingMessage`] on the other end.
//!
//! - **`domain`** – pure replication logic with no I/O. The most important
//!   piece is the [`OrderReplica`]: the replicated node ordering with its
//!   conflict-free merge and the derived left/right neighbor partitions.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `deskring_core::RingMessage` instead of the full path.
pub use domain::order::{merge, OrderReplica, OrderUpdate};
pub use protocol::codec::{decode_message, encode_message, ProtocolError};
pub use protocol::messages::{RingMessage, SelectionErrorCode};
pub use protocol::sequence::SequenceCounter;

/// Largest number of peers a node will register at once.
///
/// Inbound channels beyond the bound are silently refused; outbound connect
/// attempts fail locally.
pub const PEERS_MAX: usize = 16;
