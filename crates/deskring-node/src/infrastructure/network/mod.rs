//! Peer transport: TCP listener with port-range scan, outbound dialer, and
//! per-connection reader/writer tasks.
//!
//! The transport owns no protocol state. Each socket gets a writer task
//! (encoding [`deskring_core::RingMessage`]s from an outbound channel) and a
//! reader task (decoding frames into the server inbox), so the server loop
//! never touches a socket and per-peer FIFO delivery falls out of the
//! channel pair for free.

pub mod connection;
pub mod dialer;
pub mod listener;

use thiserror::Error;

pub use connection::spawn_connection;
pub use dialer::spawn_dialer;
pub use listener::{bind_listener, spawn_accept_loop};

/// Error type for transport setup operations.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// A specific bind attempt failed for a reason other than the port
    /// being taken.
    #[error("bind failed on {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Every port in the configured range is taken.
    #[error("all ports busy in {port_min}..={port_max}")]
    AllPortsBusy { port_min: u16, port_max: u16 },
}
