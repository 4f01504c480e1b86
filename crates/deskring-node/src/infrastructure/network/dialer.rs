//! Outbound connector task.
//!
//! Dials are requested over a channel (by the discovery collaborator or by
//! `NodeAdded` gossip) and performed off the server loop; each dial runs in
//! its own task so one unreachable host never delays another.

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;

use super::spawn_connection;
use crate::application::server::{DialRequest, ServerMsg};

/// Spawns the dialer task draining `requests` until the channel closes.
pub fn spawn_dialer(
    mut requests: mpsc::UnboundedReceiver<DialRequest>,
    server: mpsc::UnboundedSender<ServerMsg>,
) {
    tokio::spawn(async move {
        while let Some(request) = requests.recv().await {
            let server = server.clone();
            tokio::spawn(async move {
                match TcpStream::connect(&request.address).await {
                    Ok(stream) => {
                        debug!(address = %request.address, "outbound connection established");
                        spawn_connection(stream, request.address, true, server);
                    }
                    Err(error) => {
                        debug!(address = %request.address, %error, "dial failed");
                        let _ = server.send(ServerMsg::DialFailed {
                            address: request.address,
                            announced: request.announced,
                        });
                    }
                }
            });
        }
    });
}
