//! Reader/writer task pair for one peer socket.

use std::sync::atomic::{AtomicU64, Ordering};

use deskring_core::protocol::codec::{decode_header, decode_message};
use deskring_core::protocol::messages::HEADER_SIZE;
use deskring_core::{encode_message, RingMessage, SequenceCounter};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::application::server::{ConnId, ServerMsg};

/// Connection ids are allocated process-wide and never reused, so a late
/// message from a dead connection can never be mistaken for a live one.
static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

fn next_conn_id() -> ConnId {
    NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed)
}

/// Registers `stream` with the server and spawns its reader/writer tasks.
///
/// The server answers the registration with our `Hello` on the outbound
/// channel — or refuses by dropping it (membership at capacity), which ends
/// the writer and half-closes the socket without a word.
pub fn spawn_connection(
    stream: TcpStream,
    address: String,
    initiated_locally: bool,
    server: mpsc::UnboundedSender<ServerMsg>,
) -> ConnId {
    if let Err(error) = stream.set_nodelay(true) {
        warn!(%error, "failed to enable TCP_NODELAY");
    }

    let conn = next_conn_id();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<RingMessage>();
    let _ = server.send(ServerMsg::Accepted {
        conn,
        tx: out_tx,
        address,
        initiated_locally,
    });

    let (mut read_half, mut write_half) = stream.into_split();

    // Writer: drain the outbound channel, stamping each frame with the
    // per-connection sequence counter.
    tokio::spawn(async move {
        let sequence = SequenceCounter::new();
        while let Some(message) = out_rx.recv().await {
            match encode_message(&message, sequence.next()) {
                Ok(bytes) => {
                    if write_half.write_all(&bytes).await.is_err() {
                        break;
                    }
                }
                Err(error) => {
                    warn!(conn, %error, "failed to encode outbound message");
                }
            }
        }
        let _ = write_half.shutdown().await;
    });

    // Reader: pull one header, then exactly the declared payload. Any I/O
    // or decode failure ends the connection — a malformed frame means a
    // misbehaving peer, not a recoverable hiccup.
    tokio::spawn(async move {
        let mut header = [0u8; HEADER_SIZE];
        loop {
            if read_half.read_exact(&mut header).await.is_err() {
                break;
            }
            let payload_len = match decode_header(&header) {
                Ok(len) => len,
                Err(error) => {
                    debug!(conn, %error, "bad frame header");
                    break;
                }
            };
            let mut frame = vec![0u8; HEADER_SIZE + payload_len];
            frame[..HEADER_SIZE].copy_from_slice(&header);
            if read_half.read_exact(&mut frame[HEADER_SIZE..]).await.is_err() {
                break;
            }
            match decode_message(&frame) {
                Ok((message, _)) => {
                    if server.send(ServerMsg::Inbound { conn, message }).is_err() {
                        break;
                    }
                }
                Err(error) => {
                    debug!(conn, %error, "malformed message");
                    break;
                }
            }
        }
        let _ = server.send(ServerMsg::Closed { conn });
    });

    conn
}
