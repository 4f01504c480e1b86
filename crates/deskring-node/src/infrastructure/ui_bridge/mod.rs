//! Collaborator bridge: the narrow contracts between the protocol core and
//! the desktop-facing collaborators (input capture, on-screen notification,
//! clipboard integration, discovery).
//!
//! The core never talks to a toolkit or an X/Wayland display. It emits
//! [`NodeEvent`]s on a channel the collaborator drains, and accepts commands
//! through a cloneable [`NodeHandle`]. The one callback in the opposite
//! direction is [`SelectionStore`]: when a remote peer fetches our selection
//! the core has to read the local clipboard data, and it does so through
//! this trait.

use async_trait::async_trait;
use deskring_core::protocol::messages::SelectionErrorCode;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::application::grab::GrabOwner;
use crate::application::server::{Command, ServerMsg};

/// Notifications from the core to the UI/input collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// The grab moved. `pointer_y` is the global 0..=0xFFFF height where the
    /// pointer crossed, when known — the capture collaborator uses it to
    /// place the pointer when input returns to this screen.
    OwnershipChanged {
        owner: GrabOwner,
        pointer_y: Option<i32>,
    },
    /// The ring layout changed. Both lists hold connected peer ids,
    /// nearest-to-self first; the capture collaborator arms its left/right
    /// edge triggers from their emptiness.
    LayoutChanged {
        left: Vec<String>,
        right: Vec<String>,
    },
    /// A peer took a selection; advertise its targets without fetching data.
    SelectionOffered { primary: bool, targets: Vec<String> },
    /// A selection was emptied; clear anything advertised for it.
    SelectionCleared { primary: bool },
    /// A peer completed the handshake and sits on the given side now.
    NeighborJoined { node_id: String, to_left: bool },
    /// A peer left the ring.
    NeighborLeft { node_id: String, to_left: bool },
    /// Forwarded input from the node that captures for us: replay locally.
    InjectMotion { dx: i32, dy: i32 },
    InjectButton { button: u32, is_press: bool },
    InjectKey { key: u32, is_press: bool },
}

/// One fetched selection payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardPayload {
    /// Owner-side format tag, passed through opaquely.
    pub format: u32,
    pub data: Vec<u8>,
}

/// Failure modes of a selection fetch. None of these mutate arbiter state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("selection is not owned by a remote peer")]
    NotRemote,
    #[error("selection ownership changed before the reply arrived")]
    OwnerChanged,
    #[error("fetch timed out")]
    TimedOut,
    #[error("peer channel failed")]
    Transport,
    #[error("payload exceeds the message size ceiling")]
    TooLarge,
    #[error("owner refused ({code:?}): {message}")]
    Remote {
        code: SelectionErrorCode,
        message: String,
    },
}

/// Failure modes of a startup rename.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenameError {
    #[error("peers already registered; the node id is fixed")]
    PeersRegistered,
    #[error("node is shutting down")]
    Closed,
}

/// Read access to the local desktop's selection data.
///
/// Implemented by the clipboard collaborator; called when a remote peer
/// fetches a target from us. Returns an opaque format tag plus the raw
/// bytes, or a human-readable failure for the logs.
#[async_trait]
pub trait SelectionStore: Send + Sync {
    async fn get(&self, primary: bool, target: &str) -> Result<(u32, Vec<u8>), String>;
}

/// Cloneable command-side API of a running node.
///
/// Wraps the server loop's message channel; every method is non-blocking
/// except the ones that wait for an answer ([`fetch_selection`],
/// [`rename`], the predicates).
///
/// [`fetch_selection`]: NodeHandle::fetch_selection
/// [`rename`]: NodeHandle::rename
#[derive(Debug, Clone)]
pub struct NodeHandle {
    tx: mpsc::UnboundedSender<ServerMsg>,
}

impl NodeHandle {
    pub fn new(tx: mpsc::UnboundedSender<ServerMsg>) -> Self {
        Self { tx }
    }

    fn command(&self, command: Command) {
        // A failed send means the server loop is gone; commands are
        // fire-and-forget so there is nobody to tell.
        let _ = self.tx.send(ServerMsg::Command(command));
    }

    /// Asks the node to dial a candidate address (discovery feed).
    pub fn connect(&self, address: impl Into<String>) {
        self.command(Command::Connect {
            address: address.into(),
        });
    }

    /// The pointer crossed the left or right screen edge.
    pub fn edge_crossed(&self, to_left: bool, y: i32) {
        self.command(Command::EdgeCrossed { to_left, y });
    }

    /// The release gesture (both shift keys) was detected.
    pub fn release_gesture(&self) {
        self.command(Command::ReleaseGesture);
    }

    /// Replaces the ring layout wholesale (preferences editor).
    pub fn set_order(&self, order: Vec<String>) {
        self.command(Command::SetOrder { order });
    }

    /// The local desktop took a selection.
    pub fn selection_acquired(&self, primary: bool, targets: Vec<String>) {
        self.command(Command::SelectionAcquired { primary, targets });
    }

    /// The local desktop dropped a selection it owned.
    pub fn selection_released(&self, primary: bool) {
        self.command(Command::SelectionReleased { primary });
    }

    /// Captured local input to forward to the current grab owner.
    pub fn motion(&self, dx: i32, dy: i32) {
        self.command(Command::Motion { dx, dy });
    }

    pub fn button(&self, button: u32, is_press: bool) {
        self.command(Command::Button { button, is_press });
    }

    pub fn key(&self, key: u32, is_press: bool) {
        self.command(Command::Key { key, is_press });
    }

    /// Fetches one target from the remote selection owner.
    ///
    /// Resolves when the owner replies, the server-side watchdog fires, or
    /// ownership changes mid-flight. Never mutates arbiter state.
    pub async fn fetch_selection(
        &self,
        primary: bool,
        target: impl Into<String>,
    ) -> Result<ClipboardPayload, FetchError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(Command::FetchSelection {
            primary,
            target: target.into(),
            reply: reply_tx,
        });
        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Transport),
        }
    }

    /// Renames the node after a discovery service-name collision.
    ///
    /// Allowed only while no peer channel exists yet.
    pub async fn rename(&self, new_id: impl Into<String>) -> Result<(), RenameError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(Command::Rename {
            new_id: new_id.into(),
            reply: reply_tx,
        });
        reply_rx.await.unwrap_or(Err(RenameError::Closed))
    }

    /// Whether an id is in the replicated order (discovery predicate).
    pub async fn is_known(&self, id: impl Into<String>) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(Command::IsKnown {
            id: id.into(),
            reply: reply_tx,
        });
        reply_rx.await.unwrap_or(false)
    }

    /// Whether an id has a live, handshaken connection (or is self).
    pub async fn is_connected(&self, id: impl Into<String>) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(Command::IsConnected {
            id: id.into(),
            reply: reply_tx,
        });
        reply_rx.await.unwrap_or(false)
    }
}

/// A selection store that always fails.
///
/// Stands in when no clipboard collaborator is wired up (headless runs and
/// tests): remote fetches are answered with a read failure instead of
/// hanging.
#[derive(Debug, Default)]
pub struct NullSelectionStore;

#[async_trait]
impl SelectionStore for NullSelectionStore {
    async fn get(&self, _primary: bool, _target: &str) -> Result<(u32, Vec<u8>), String> {
        Err("no selection store attached".to_string())
    }
}
