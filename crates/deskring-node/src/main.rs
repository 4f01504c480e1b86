//! deskring node entry point.
//!
//! Wires the transport, the server loop, and the collaborator channels
//! together and runs until Ctrl-C. Desktop collaborators (input capture,
//! overlay, tray, clipboard integration, mDNS discovery) attach through the
//! `infrastructure::ui_bridge` contracts; the headless build logs their
//! events instead.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use deskring_node::application::server::RingServer;
use deskring_node::infrastructure::network;
use deskring_node::infrastructure::storage::config;
use deskring_node::infrastructure::ui_bridge::{NodeEvent, NodeHandle, NullSelectionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let node_config = config::load_config()?;

    // Structured logging. Level comes from the config, `RUST_LOG` wins.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(node_config.node.log_level.clone())),
        )
        .init();

    info!("deskring node starting");

    let (listener, port) = network::bind_listener(
        &node_config.network.bind_address,
        node_config.network.port_min,
        node_config.network.port_max,
    )
    .await?;

    let node_id = node_config.node_id();
    let address = format!("{}:{port}", node_config.network.bind_address);
    let fetch_timeout =
        std::time::Duration::from_millis(node_config.selection.fetch_timeout_ms);

    let (msg_tx, msg_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let (dial_tx, dial_rx) = mpsc::unbounded_channel();

    let server = RingServer::new(
        node_id.clone(),
        address,
        fetch_timeout,
        event_tx,
        Arc::new(NullSelectionStore),
        dial_tx,
        msg_tx.clone(),
    );

    network::spawn_accept_loop(listener, msg_tx.clone());
    network::spawn_dialer(dial_rx, msg_tx.clone());
    tokio::spawn(server.run(msg_rx));

    // Event drain for the headless build: collaborators would consume these.
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match &event {
                NodeEvent::NeighborJoined { node_id, to_left } => {
                    let side = if *to_left { "left" } else { "right" };
                    info!(%node_id, side, "now sharing input");
                }
                NodeEvent::NeighborLeft { node_id, .. } => {
                    info!(%node_id, "no longer sharing input");
                }
                other => debug!(?other, "node event"),
            }
        }
    });

    let handle = NodeHandle::new(msg_tx);
    // A discovery collaborator would drive `DiscoveryGate::offer` here; a
    // statically configured peer can be dialed straight away.
    if let Ok(peer) = std::env::var("DESKRING_PEER") {
        handle.connect(peer);
    }

    info!(id = %node_id, "deskring node ready, press Ctrl-C to exit");
    tokio::signal::ctrl_c().await?;
    info!("deskring node stopped");
    Ok(())
}
