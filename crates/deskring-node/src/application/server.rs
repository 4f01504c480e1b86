//! RingServer: the orchestrating event loop of a deskring node.
//!
//! One task owns every piece of replicated state — the peer table, the order
//! replica, the grab arbiter, and both selection arbiters. Everything else
//! (socket readers and writers, the dialer, collaborators) communicates with
//! it through a single [`ServerMsg`] channel, so no handler ever races
//! another and no locking exists anywhere in the protocol core.
//!
//! Handlers run to completion without blocking. The one round-trip in the
//! protocol, the selection fetch, is parked in a pending table keyed by
//! request id and resolved when the reply, a watchdog timeout, an ownership
//! change, or the owner's disconnect arrives — whichever comes first.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use deskring_core::domain::order::{OrderReplica, OrderUpdate};
use deskring_core::protocol::messages::{
    AcquireClipboardMessage, ButtonEventMessage, ClipboardDataMessage, ClipboardErrorMessage,
    GetClipboardMessage, HelloMessage, KeyEventMessage, MotionEventMessage, NodeAddedMessage,
    NodeRemovedMessage, ReturnClipboardMessage, RingMessage, SelectionErrorCode,
    UpdateGrabMessage, UpdateOrderMessage, Y_INVALID,
};
use deskring_core::protocol::MAX_MESSAGE_SIZE;
use deskring_core::PEERS_MAX;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::grab::{GrabArbiter, GrabClaim, GrabOwner};
use crate::application::selection::SelectionArbiter;
use crate::infrastructure::ui_bridge::{
    ClipboardPayload, FetchError, NodeEvent, RenameError, SelectionStore,
};

/// Byte ceiling for a fetched selection payload: 9/10 of the transport's
/// maximum message size, leaving headroom for the reply framing.
pub const FETCH_MAX_BYTES: usize = MAX_MESSAGE_SIZE / 10 * 9;

/// Arena index for one peer channel. Allocated by the transport layer,
/// never reused within a process run.
pub type ConnId = u64;

/// Everything the server loop can be fed.
#[derive(Debug)]
pub enum ServerMsg {
    /// A new channel exists (inbound accept or completed outbound dial).
    Accepted {
        conn: ConnId,
        tx: mpsc::UnboundedSender<RingMessage>,
        address: String,
        initiated_locally: bool,
    },
    /// One decoded message from a peer channel.
    Inbound { conn: ConnId, message: RingMessage },
    /// The channel died (EOF, I/O error, or decode failure).
    Closed { conn: ConnId },
    /// An outbound dial failed. `announced` carries the node id when the
    /// dial was triggered by `NodeAdded` gossip.
    DialFailed {
        address: String,
        announced: Option<String>,
    },
    /// The watchdog for a parked selection fetch fired.
    FetchExpired { request_id: Uuid },
    /// A local collaborator operation.
    Command(Command),
}

/// Local operations entering the core (see the collaborator contract in
/// `infrastructure::ui_bridge`).
#[derive(Debug)]
pub enum Command {
    Connect {
        address: String,
    },
    EdgeCrossed {
        to_left: bool,
        y: i32,
    },
    ReleaseGesture,
    /// Wholesale layout replacement from the preferences collaborator.
    SetOrder {
        order: Vec<String>,
    },
    SelectionAcquired {
        primary: bool,
        targets: Vec<String>,
    },
    SelectionReleased {
        primary: bool,
    },
    FetchSelection {
        primary: bool,
        target: String,
        reply: oneshot::Sender<Result<ClipboardPayload, FetchError>>,
    },
    Motion {
        dx: i32,
        dy: i32,
    },
    Button {
        button: u32,
        is_press: bool,
    },
    Key {
        key: u32,
        is_press: bool,
    },
    Rename {
        new_id: String,
        reply: oneshot::Sender<Result<(), RenameError>>,
    },
    IsKnown {
        id: String,
        reply: oneshot::Sender<bool>,
    },
    IsConnected {
        id: String,
        reply: oneshot::Sender<bool>,
    },
}

/// A dial request for the outbound connector task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialRequest {
    pub address: String,
    /// Node id from `NodeAdded` gossip, when that is what triggered the dial.
    pub announced: Option<String>,
}

/// Protocol violations that cost the sender its connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Violation {
    #[error("duplicate Hello on one channel")]
    DuplicateHello,
    #[error("looped-back connection to ourselves")]
    SelfLoop,
    #[error("node id already registered: {0}")]
    DuplicateId(String),
    #[error("message before handshake completed")]
    NoHandshake,
    #[error("grab claim for unknown node: {0}")]
    UnknownGrabOwner(String),
    #[error("order proposal with duplicate ids")]
    DuplicateOrderIds,
}

/// One registered peer channel.
#[derive(Debug)]
struct Peer {
    tx: mpsc::UnboundedSender<RingMessage>,
    address: String,
    /// None until the peer's Hello arrives.
    id: Option<String>,
    initiated_locally: bool,
    /// Inbound peers are announced to the UI only after their first
    /// `UpdateOrder` round-trip, so a neighbor is never shown before its
    /// placement settled.
    pending_welcome: bool,
}

/// One parked selection fetch.
#[derive(Debug)]
struct PendingFetch {
    primary: bool,
    owner: String,
    reply: oneshot::Sender<Result<ClipboardPayload, FetchError>>,
}

/// The node server. See the module docs for the threading model.
pub struct RingServer {
    id: String,
    address: String,
    max_peers: usize,
    fetch_timeout: Duration,

    peers: HashMap<ConnId, Peer>,
    by_id: HashMap<String, ConnId>,

    replica: OrderReplica,
    grab: GrabArbiter,
    clipboard: SelectionArbiter,
    primary: SelectionArbiter,

    pending: HashMap<Uuid, PendingFetch>,

    events: mpsc::UnboundedSender<NodeEvent>,
    store: Arc<dyn SelectionStore>,
    dialer: mpsc::UnboundedSender<DialRequest>,
    /// Clone of our own inbox, for watchdog timers.
    msg_tx: mpsc::UnboundedSender<ServerMsg>,
}

impl RingServer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        address: impl Into<String>,
        fetch_timeout: Duration,
        events: mpsc::UnboundedSender<NodeEvent>,
        store: Arc<dyn SelectionStore>,
        dialer: mpsc::UnboundedSender<DialRequest>,
        msg_tx: mpsc::UnboundedSender<ServerMsg>,
    ) -> Self {
        let id = id.into();
        Self {
            replica: OrderReplica::new(id.clone()),
            grab: GrabArbiter::new(id.clone()),
            clipboard: SelectionArbiter::new(false),
            primary: SelectionArbiter::new(true),
            id,
            address: address.into(),
            max_peers: PEERS_MAX,
            fetch_timeout,
            peers: HashMap::new(),
            by_id: HashMap::new(),
            pending: HashMap::new(),
            events,
            store,
            dialer,
            msg_tx,
        }
    }

    /// Drains the inbox until every sender is gone.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ServerMsg>) {
        info!(id = %self.id, address = %self.address, "node server running");
        while let Some(msg) = rx.recv().await {
            self.handle(msg).await;
        }
        info!("node server stopped");
    }

    /// Processes one inbox entry. Public so tests can drive the loop
    /// synchronously.
    pub async fn handle(&mut self, msg: ServerMsg) {
        match msg {
            ServerMsg::Accepted {
                conn,
                tx,
                address,
                initiated_locally,
            } => self.register_link(conn, tx, address, initiated_locally),
            ServerMsg::Inbound { conn, message } => {
                if let Err(violation) = self.handle_message(conn, message).await {
                    warn!(conn, %violation, "dropping misbehaving connection");
                    self.unlink(conn, true, true, true);
                }
            }
            ServerMsg::Closed { conn } => self.unlink(conn, true, true, true),
            ServerMsg::DialFailed { address, announced } => {
                debug!(%address, "outbound connection failed");
                if let Some(node_id) = announced {
                    // We could not reach a gossiped node: retract it.
                    self.broadcast(
                        RingMessage::NodeRemoved(NodeRemovedMessage {
                            node_id,
                            address,
                            remove_from_order: false,
                        }),
                        None,
                    );
                }
            }
            ServerMsg::FetchExpired { request_id } => {
                if let Some(pending) = self.pending.remove(&request_id) {
                    let _ = pending.reply.send(Err(FetchError::TimedOut));
                }
            }
            ServerMsg::Command(command) => self.handle_command(command).await,
        }
    }

    // ── Accessors used by tests and the binary ────────────────────────────────

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn order(&self) -> &[String] {
        self.replica.order()
    }

    pub fn grab_owner(&self) -> &GrabOwner {
        self.grab.owner()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn clipboard_state(&self) -> &crate::application::selection::SelectionState {
        self.clipboard.state()
    }

    pub fn primary_state(&self) -> &crate::application::selection::SelectionState {
        self.primary.state()
    }

    // ── Channel registration and teardown ─────────────────────────────────────

    fn register_link(
        &mut self,
        conn: ConnId,
        tx: mpsc::UnboundedSender<RingMessage>,
        address: String,
        initiated_locally: bool,
    ) {
        if self.peers.len() >= self.max_peers {
            debug!(%address, "refusing connection, at capacity");
            return; // dropping `tx` closes the channel
        }

        let hello = RingMessage::Hello(HelloMessage {
            node_id: self.id.clone(),
            address: self.address.clone(),
            active_generation: self.grab.generation(),
            order_generation: self.replica.generation(),
            selection_generation: self.clipboard.generation(),
        });
        let _ = tx.send(hello);

        self.peers.insert(
            conn,
            Peer {
                tx,
                address,
                id: None,
                initiated_locally,
                pending_welcome: false,
            },
        );
    }

    /// Removes a peer channel and repairs every piece of state that pointed
    /// at it. `announce_removal` controls the `NodeRemoved` gossip (off when
    /// the removal itself arrived as gossip); `announce_failover` controls
    /// the token fail-over broadcasts (off only during the kicked-node
    /// teardown, when there is nobody left to tell).
    fn unlink(
        &mut self,
        conn: ConnId,
        remove_from_order: bool,
        announce_removal: bool,
        announce_failover: bool,
    ) {
        let Some(peer) = self.peers.remove(&conn) else {
            return;
        };
        let Some(id) = peer.id else {
            return; // handshake never completed; nothing pointed at it
        };

        debug!(%id, address = %peer.address, "unlinking node");
        self.by_id.remove(&id);

        if announce_removal {
            self.broadcast(
                RingMessage::NodeRemoved(NodeRemovedMessage {
                    node_id: id.clone(),
                    address: peer.address.clone(),
                    remove_from_order,
                }),
                None,
            );
        }

        let to_left = self.replica.left().iter().any(|l| *l == id);
        self.emit(NodeEvent::NeighborLeft {
            node_id: id.clone(),
            to_left,
        });

        // Token fail-over: the grab and the selections must never point at a
        // node that is no longer a member.
        if let Some(generation) = self.grab.peer_lost(&id) {
            if announce_failover {
                let owner_id = self.grab.owner_id().to_string();
                self.broadcast(
                    RingMessage::UpdateGrab(UpdateGrabMessage {
                        generation,
                        owner_id,
                        y: Y_INVALID,
                    }),
                    None,
                );
            }
            self.emit(NodeEvent::OwnershipChanged {
                owner: self.grab.owner().clone(),
                pointer_y: None,
            });
        }
        for primary in [false, true] {
            let arbiter = if primary {
                &mut self.primary
            } else {
                &mut self.clipboard
            };
            if let Some(generation) = arbiter.peer_lost(&id) {
                if announce_failover {
                    self.broadcast(
                        RingMessage::ReturnClipboard(ReturnClipboardMessage {
                            generation,
                            primary,
                        }),
                        None,
                    );
                }
                self.emit(NodeEvent::SelectionCleared { primary });
            }
        }

        self.fail_pending_for_owner(&id);

        let connected = self.connected_ids();
        if remove_from_order {
            self.replica.remove(&id, &connected);
        } else {
            self.replica.refresh(&connected);
        }
        self.emit_layout();
    }

    /// Tears down every peer at once (we were kicked from the ring).
    fn disconnect_all(&mut self, clear_order: bool) {
        let conns: Vec<ConnId> = self.peers.keys().copied().collect();
        for conn in conns {
            self.unlink(conn, clear_order, false, false);
        }
        if clear_order {
            self.replica.set_order(vec![self.id.clone()], &[]);
            self.emit_layout();
        }
    }

    // ── Message routing ───────────────────────────────────────────────────────

    async fn handle_message(
        &mut self,
        conn: ConnId,
        message: RingMessage,
    ) -> Result<(), Violation> {
        let registered = self.peer_id(conn).is_some();
        match message {
            RingMessage::Hello(m) => self.handle_hello(conn, m),
            _ if !registered => Err(Violation::NoHandshake),
            RingMessage::NodeAdded(m) => self.handle_node_added(m),
            RingMessage::NodeRemoved(m) => self.handle_node_removed(conn, m),
            RingMessage::UpdateGrab(m) => self.handle_update_grab(conn, m),
            RingMessage::UpdateOrder(m) => self.handle_update_order(conn, m),
            RingMessage::AcquireClipboard(m) => self.handle_acquire_clipboard(conn, m),
            RingMessage::ReturnClipboard(m) => self.handle_return_clipboard(m),
            RingMessage::GetClipboard(m) => self.handle_get_clipboard(conn, m).await,
            RingMessage::ClipboardData(m) => self.handle_clipboard_data(conn, m),
            RingMessage::ClipboardError(m) => self.handle_clipboard_error(m),
            RingMessage::MotionEvent(MotionEventMessage { dx, dy }) => {
                self.emit(NodeEvent::InjectMotion { dx, dy });
                Ok(())
            }
            RingMessage::ButtonEvent(ButtonEventMessage { button, is_press }) => {
                self.emit(NodeEvent::InjectButton { button, is_press });
                Ok(())
            }
            RingMessage::KeyEvent(KeyEventMessage { key, is_press }) => {
                self.emit(NodeEvent::InjectKey { key, is_press });
                Ok(())
            }
        }
    }

    fn handle_hello(&mut self, conn: ConnId, m: HelloMessage) -> Result<(), Violation> {
        {
            let Some(peer) = self.peers.get(&conn) else {
                return Ok(()); // refused at capacity; the channel is gone
            };
            if peer.id.is_some() {
                debug!(conn, "received duplicate Hello");
                return Err(Violation::DuplicateHello);
            }
        }
        if m.node_id == self.id {
            debug!("dropping looped-back connection");
            return Err(Violation::SelfLoop);
        }
        if self.by_id.contains_key(&m.node_id) {
            debug!(id = %m.node_id, "dropping duplicate connection");
            return Err(Violation::DuplicateId(m.node_id));
        }

        self.grab.merge_generation(m.active_generation);
        self.replica.merge_generation(m.order_generation);
        self.clipboard.merge_generation(m.selection_generation);

        info!(id = %m.node_id, address = %m.address, "node joined");

        let initiated_locally = match self.peers.get_mut(&conn) {
            Some(peer) => {
                peer.id = Some(m.node_id.clone());
                peer.address = m.address.clone();
                peer.initiated_locally
            }
            None => return Ok(()),
        };
        self.by_id.insert(m.node_id.clone(), conn);
        let connected = self.connected_ids();
        self.replica.refresh(&connected);

        // Tell all old nodes about the new one.
        self.broadcast(
            RingMessage::NodeAdded(NodeAddedMessage {
                node_id: m.node_id.clone(),
                address: m.address.clone(),
            }),
            Some(conn),
        );

        // Backfill: tell the new node about every node we already know.
        let backfill: Vec<RingMessage> = self
            .peers
            .iter()
            .filter(|(other, _)| **other != conn)
            .filter_map(|(_, p)| {
                p.id.as_ref().map(|id| {
                    RingMessage::NodeAdded(NodeAddedMessage {
                        node_id: id.clone(),
                        address: p.address.clone(),
                    })
                })
            })
            .collect();
        for msg in backfill {
            self.send_to(conn, msg);
        }

        if initiated_locally {
            // We dialed them: push our view of the grab and the order, and
            // announce the neighbor right away.
            self.send_update_grab(Y_INVALID);
            self.send_update_order(None);
            let to_left = self.replica.left().iter().any(|l| *l == m.node_id);
            self.emit(NodeEvent::NeighborJoined {
                node_id: m.node_id,
                to_left,
            });
        } else if let Some(peer) = self.peers.get_mut(&conn) {
            // They dialed us: hold the announcement until their first
            // UpdateOrder settled the placement.
            peer.pending_welcome = true;
        }

        self.emit_layout();
        Ok(())
    }

    fn handle_node_added(&mut self, m: NodeAddedMessage) -> Result<(), Violation> {
        if m.node_id == self.id || self.by_id.contains_key(&m.node_id) {
            return Ok(()); // already applied; suppress re-gossip
        }
        if self.peers.len() >= self.max_peers {
            debug!(id = %m.node_id, "cannot honor NodeAdded, at capacity");
            self.broadcast(
                RingMessage::NodeRemoved(NodeRemovedMessage {
                    node_id: m.node_id,
                    address: m.address,
                    remove_from_order: false,
                }),
                None,
            );
            return Ok(());
        }
        let _ = self.dialer.send(DialRequest {
            address: m.address,
            announced: Some(m.node_id),
        });
        Ok(())
    }

    fn handle_node_removed(&mut self, conn: ConnId, m: NodeRemovedMessage) -> Result<(), Violation> {
        if m.node_id == self.id {
            info!("we have been removed from the ring");
            self.disconnect_all(true);
            return Ok(());
        }

        let mut applied = false;
        if m.remove_from_order {
            let connected = self.connected_ids();
            applied |= self.replica.remove(&m.node_id, &connected);
        }
        let target = self.by_id.get(&m.node_id).copied();
        if let Some(target_conn) = target {
            self.unlink(target_conn, m.remove_from_order, false, true);
            applied = true;
        }
        if applied {
            // Re-gossip, but never back to the message's origin; when the
            // removed node itself said goodbye, everyone else still needs
            // to hear it.
            let except = if target == Some(conn) { None } else { Some(conn) };
            self.broadcast(RingMessage::NodeRemoved(m), except);
            self.emit_layout();
        }
        Ok(())
    }

    fn handle_update_grab(&mut self, conn: ConnId, m: UpdateGrabMessage) -> Result<(), Violation> {
        let grab = &mut self.grab;
        let by_id = &self.by_id;
        match grab.handle_remote(m.generation, &m.owner_id, |id| by_id.contains_key(id)) {
            GrabClaim::Accepted { .. } => {
                debug!(owner = %m.owner_id, generation = m.generation, "grab moved");
                let y = m.y;
                self.broadcast(RingMessage::UpdateGrab(m), Some(conn));
                self.emit(NodeEvent::OwnershipChanged {
                    owner: self.grab.owner().clone(),
                    pointer_y: (y != Y_INVALID).then_some(y),
                });
                Ok(())
            }
            GrabClaim::AlreadyOwner | GrabClaim::Stale => Ok(()),
            GrabClaim::UnknownOwner => Err(Violation::UnknownGrabOwner(m.owner_id)),
        }
    }

    fn handle_update_order(&mut self, conn: ConnId, m: UpdateOrderMessage) -> Result<(), Violation> {
        let connected = self.connected_ids();
        match self.replica.apply_update(m.generation, m.order, &connected) {
            OrderUpdate::Rejected => return Err(Violation::DuplicateOrderIds),
            OrderUpdate::Stale | OrderUpdate::Unchanged => {}
            OrderUpdate::Applied {
                changed,
                echo_sender,
            } => {
                if changed {
                    self.emit_layout();
                }
                let except = if echo_sender { None } else { Some(conn) };
                self.send_update_order(except);
            }
        }

        // The newcomer's placement is settled now; release a held welcome.
        let released = self.peers.get_mut(&conn).and_then(|peer| {
            if peer.pending_welcome {
                peer.pending_welcome = false;
                peer.id.clone()
            } else {
                None
            }
        });
        if let Some(node_id) = released {
            let to_left = self.replica.left().iter().any(|l| *l == node_id);
            self.emit(NodeEvent::NeighborJoined { node_id, to_left });
        }
        Ok(())
    }

    fn handle_acquire_clipboard(
        &mut self,
        conn: ConnId,
        m: AcquireClipboardMessage,
    ) -> Result<(), Violation> {
        let Some(sender) = self.peer_id(conn) else {
            return Err(Violation::NoHandshake);
        };
        let arbiter = if m.primary {
            &mut self.primary
        } else {
            &mut self.clipboard
        };
        if arbiter.handle_acquire(m.generation, &sender) {
            self.fail_pending(m.primary, FetchError::OwnerChanged);
            self.emit(NodeEvent::SelectionOffered {
                primary: m.primary,
                targets: m.targets,
            });
        }
        Ok(())
    }

    fn handle_return_clipboard(&mut self, m: ReturnClipboardMessage) -> Result<(), Violation> {
        let arbiter = if m.primary {
            &mut self.primary
        } else {
            &mut self.clipboard
        };
        if arbiter.handle_return(m.generation) {
            self.fail_pending(m.primary, FetchError::OwnerChanged);
            self.emit(NodeEvent::SelectionCleared { primary: m.primary });
        }
        Ok(())
    }

    async fn handle_get_clipboard(
        &mut self,
        conn: ConnId,
        m: GetClipboardMessage,
    ) -> Result<(), Violation> {
        let owned_local = if m.primary {
            self.primary.is_owned_local()
        } else {
            self.clipboard.is_owned_local()
        };

        let reply = if !owned_local {
            RingMessage::ClipboardError(ClipboardErrorMessage {
                request_id: m.request_id,
                code: SelectionErrorCode::NotOwner,
                message: "we're not the selection owner".to_string(),
            })
        } else {
            match self.store.get(m.primary, &m.target).await {
                Err(error) => RingMessage::ClipboardError(ClipboardErrorMessage {
                    request_id: m.request_id,
                    code: SelectionErrorCode::ReadFailed,
                    message: error,
                }),
                Ok((_, data)) if data.len() > FETCH_MAX_BYTES => {
                    RingMessage::ClipboardError(ClipboardErrorMessage {
                        request_id: m.request_id,
                        code: SelectionErrorCode::TooLarge,
                        message: format!("{} bytes exceeds the transfer ceiling", data.len()),
                    })
                }
                Ok((format, data)) => RingMessage::ClipboardData(ClipboardDataMessage {
                    request_id: m.request_id,
                    format,
                    data,
                }),
            }
        };
        self.send_to(conn, reply);
        Ok(())
    }

    fn handle_clipboard_data(&mut self, conn: ConnId, m: ClipboardDataMessage) -> Result<(), Violation> {
        let Some(pending) = self.pending.remove(&m.request_id) else {
            debug!(request_id = %m.request_id, "reply for unknown fetch");
            return Ok(());
        };
        let result = if self.peer_id(conn).as_deref() != Some(pending.owner.as_str()) {
            Err(FetchError::OwnerChanged)
        } else if m.data.len() > FETCH_MAX_BYTES {
            Err(FetchError::TooLarge)
        } else {
            Ok(ClipboardPayload {
                format: m.format,
                data: m.data,
            })
        };
        let _ = pending.reply.send(result);
        Ok(())
    }

    fn handle_clipboard_error(&mut self, m: ClipboardErrorMessage) -> Result<(), Violation> {
        if let Some(pending) = self.pending.remove(&m.request_id) {
            let _ = pending.reply.send(Err(FetchError::Remote {
                code: m.code,
                message: m.message,
            }));
        }
        Ok(())
    }

    // ── Local commands ────────────────────────────────────────────────────────

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { address } => {
                if self.peers.len() >= self.max_peers {
                    debug!(%address, "not dialing, at capacity");
                    return;
                }
                let _ = self.dialer.send(DialRequest {
                    address,
                    announced: None,
                });
            }
            Command::EdgeCrossed { to_left, y } => self.change_grab(to_left, y),
            Command::ReleaseGesture => self.acquire_grab(),
            Command::SetOrder { order } => self.set_order(order),
            Command::SelectionAcquired { primary, targets } => {
                self.acquire_selection(primary, targets)
            }
            Command::SelectionReleased { primary } => self.release_selection(primary),
            Command::FetchSelection {
                primary,
                target,
                reply,
            } => self.fetch_selection(primary, target, reply),
            Command::Motion { dx, dy } => {
                self.send_to_grab_owner(RingMessage::MotionEvent(MotionEventMessage { dx, dy }));
            }
            Command::Button { button, is_press } => {
                self.send_to_grab_owner(RingMessage::ButtonEvent(ButtonEventMessage {
                    button,
                    is_press,
                }));
            }
            Command::Key { key, is_press } => {
                self.send_to_grab_owner(RingMessage::KeyEvent(KeyEventMessage { key, is_press }));
            }
            Command::Rename { new_id, reply } => {
                let _ = reply.send(self.rename(new_id));
            }
            Command::IsKnown { id, reply } => {
                let _ = reply.send(self.replica.is_known(&id));
            }
            Command::IsConnected { id, reply } => {
                let _ = reply.send(id == self.id || self.by_id.contains_key(&id));
            }
        }
    }

    /// Local edge-cross: hand the grab to the neighbor on that side.
    fn change_grab(&mut self, to_left: bool, y: i32) {
        let Some(neighbor) = self.replica.neighbor(to_left).map(str::to_string) else {
            debug!(to_left, "no neighbor on that side");
            return;
        };
        let generation = self.grab.grant_to(neighbor);
        let owner_id = self.grab.owner_id().to_string();
        self.broadcast(
            RingMessage::UpdateGrab(UpdateGrabMessage {
                generation,
                owner_id,
                y,
            }),
            None,
        );
        self.emit(NodeEvent::OwnershipChanged {
            owner: self.grab.owner().clone(),
            pointer_y: (y != Y_INVALID).then_some(y),
        });
    }

    /// Local release gesture: take the grab back.
    fn acquire_grab(&mut self) {
        let generation = self.grab.claim_local();
        let owner_id = self.grab.owner_id().to_string();
        self.broadcast(
            RingMessage::UpdateGrab(UpdateGrabMessage {
                generation,
                owner_id,
                y: Y_INVALID,
            }),
            None,
        );
        self.emit(NodeEvent::OwnershipChanged {
            owner: self.grab.owner().clone(),
            pointer_y: None,
        });
    }

    /// Replaces the layout wholesale (preferences collaborator) and gossips
    /// the result. Duplicate ids in local input are a caller bug; the list
    /// is dropped with a diagnostic rather than poisoning the replica.
    fn set_order(&mut self, order: Vec<String>) {
        if deskring_core::domain::order::has_duplicates(&order) {
            warn!("ignoring local layout with duplicate ids");
            return;
        }
        let connected = self.connected_ids();
        self.replica.set_order(order, &connected);
        self.emit_layout();
        self.send_update_order(None);
    }

    fn acquire_selection(&mut self, primary: bool, targets: Vec<String>) {
        let arbiter = if primary {
            &mut self.primary
        } else {
            &mut self.clipboard
        };
        let generation = arbiter.acquire_local();
        self.fail_pending(primary, FetchError::OwnerChanged);
        self.broadcast(
            RingMessage::AcquireClipboard(AcquireClipboardMessage {
                generation,
                primary,
                targets,
            }),
            None,
        );
    }

    fn release_selection(&mut self, primary: bool) {
        let arbiter = if primary {
            &mut self.primary
        } else {
            &mut self.clipboard
        };
        let Some(generation) = arbiter.release_local() else {
            debug!(primary, "release for a selection we do not own");
            return;
        };
        self.broadcast(
            RingMessage::ReturnClipboard(ReturnClipboardMessage {
                generation,
                primary,
            }),
            None,
        );
    }

    fn fetch_selection(
        &mut self,
        primary: bool,
        target: String,
        reply: oneshot::Sender<Result<ClipboardPayload, FetchError>>,
    ) {
        let arbiter = if primary { &self.primary } else { &self.clipboard };
        let Some(owner) = arbiter.remote_owner().map(str::to_string) else {
            let _ = reply.send(Err(FetchError::NotRemote));
            return;
        };
        let Some(&conn) = self.by_id.get(&owner) else {
            let _ = reply.send(Err(FetchError::OwnerChanged));
            return;
        };

        let request_id = Uuid::new_v4();
        if !self.send_to(
            conn,
            RingMessage::GetClipboard(GetClipboardMessage {
                request_id,
                primary,
                target,
            }),
        ) {
            let _ = reply.send(Err(FetchError::Transport));
            return;
        }

        self.pending.insert(
            request_id,
            PendingFetch {
                primary,
                owner,
                reply,
            },
        );

        let inbox = self.msg_tx.clone();
        let timeout = self.fetch_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = inbox.send(ServerMsg::FetchExpired { request_id });
        });
    }

    fn rename(&mut self, new_id: String) -> Result<(), RenameError> {
        if !self.peers.is_empty() {
            return Err(RenameError::PeersRegistered);
        }
        info!(old = %self.id, new = %new_id, "renaming node");
        self.replica.set_self_id(new_id.clone());
        self.grab.set_self_id(new_id.clone());
        self.id = new_id;
        Ok(())
    }

    // ── Broadcast and bookkeeping helpers ─────────────────────────────────────

    /// Sends to every handshaken peer, optionally skipping one connection.
    fn broadcast(&self, message: RingMessage, except: Option<ConnId>) {
        for (conn, peer) in &self.peers {
            if Some(*conn) == except || peer.id.is_none() {
                continue;
            }
            let _ = peer.tx.send(message.clone());
        }
    }

    fn send_to(&self, conn: ConnId, message: RingMessage) -> bool {
        match self.peers.get(&conn) {
            Some(peer) => peer.tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Sends forwarded input to the peer holding the grab; dropped when the
    /// grab is ours (nothing to forward to).
    fn send_to_grab_owner(&self, message: RingMessage) {
        let Some(owner) = self.grab.active_peer() else {
            return;
        };
        if let Some(&conn) = self.by_id.get(owner) {
            self.send_to(conn, message);
        }
    }

    /// Re-announces the grab with a fresh generation (handshake push).
    fn send_update_grab(&mut self, y: i32) {
        let generation = self.grab.advertise();
        let owner_id = self.grab.owner_id().to_string();
        self.broadcast(
            RingMessage::UpdateGrab(UpdateGrabMessage {
                generation,
                owner_id,
                y,
            }),
            None,
        );
    }

    /// Broadcasts the order with a fresh generation.
    fn send_update_order(&mut self, except: Option<ConnId>) {
        let generation = self.replica.next_generation();
        let order = self.replica.order().to_vec();
        self.broadcast(
            RingMessage::UpdateOrder(UpdateOrderMessage { generation, order }),
            except,
        );
    }

    fn connected_ids(&self) -> Vec<String> {
        self.by_id.keys().cloned().collect()
    }

    fn peer_id(&self, conn: ConnId) -> Option<String> {
        self.peers.get(&conn).and_then(|p| p.id.clone())
    }

    fn emit(&self, event: NodeEvent) {
        let _ = self.events.send(event);
    }

    fn emit_layout(&self) {
        self.emit(NodeEvent::LayoutChanged {
            left: self.replica.left().to_vec(),
            right: self.replica.right().to_vec(),
        });
    }

    /// Fails every parked fetch for one selection.
    fn fail_pending(&mut self, primary: bool, error: FetchError) {
        let expired: Vec<Uuid> = self
            .pending
            .iter()
            .filter(|(_, p)| p.primary == primary)
            .map(|(id, _)| *id)
            .collect();
        for request_id in expired {
            if let Some(pending) = self.pending.remove(&request_id) {
                let _ = pending.reply.send(Err(error.clone()));
            }
        }
    }

    /// Fails every parked fetch waiting on a departed peer.
    fn fail_pending_for_owner(&mut self, owner: &str) {
        let expired: Vec<Uuid> = self
            .pending
            .iter()
            .filter(|(_, p)| p.owner == owner)
            .map(|(id, _)| *id)
            .collect();
        for request_id in expired {
            if let Some(pending) = self.pending.remove(&request_id) {
                let _ = pending.reply.send(Err(FetchError::OwnerChanged));
            }
        }
    }
}
