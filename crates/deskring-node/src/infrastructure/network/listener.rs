//! Inbound TCP listener with port-range scanning.
//!
//! Like every node, we bind the first free port in the configured range so
//! several nodes can coexist on one machine during development; the actual
//! bound port goes into the address other nodes dial.

use std::io::ErrorKind;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{spawn_connection, NetworkError};
use crate::application::server::ServerMsg;

/// Binds the first free port in `port_min..=port_max` on `bind_address`.
///
/// Returns the listener and the actually bound port (which differs from the
/// requested one when the range starts at 0, the OS-assigned wildcard).
///
/// # Errors
///
/// [`NetworkError::AllPortsBusy`] when the whole range is taken, or
/// [`NetworkError::BindFailed`] on any other bind failure.
pub async fn bind_listener(
    bind_address: &str,
    port_min: u16,
    port_max: u16,
) -> Result<(TcpListener, u16), NetworkError> {
    for port in port_min..=port_max {
        match TcpListener::bind((bind_address, port)).await {
            Ok(listener) => {
                let bound = listener
                    .local_addr()
                    .map(|a| a.port())
                    .unwrap_or(port);
                info!(port = bound, "listening for peers");
                return Ok((listener, bound));
            }
            Err(error) if error.kind() == ErrorKind::AddrInUse => continue,
            Err(source) => {
                return Err(NetworkError::BindFailed {
                    address: format!("{bind_address}:{port}"),
                    source,
                })
            }
        }
    }
    Err(NetworkError::AllPortsBusy { port_min, port_max })
}

/// Accepts inbound peers forever, spawning a connection task pair for each.
///
/// Capacity is not checked here: the server refuses over-limit channels by
/// dropping their outbound side, which closes the socket silently.
pub fn spawn_accept_loop(listener: TcpListener, server: mpsc::UnboundedSender<ServerMsg>) {
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    debug!(%peer_addr, "inbound connection");
                    spawn_connection(stream, peer_addr.to_string(), false, server.clone());
                }
                Err(error) => {
                    warn!(%error, "accept failed");
                }
            }
        }
    });
}
