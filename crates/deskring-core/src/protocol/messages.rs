//! All deskring peer protocol message types.
//!
//! Every message is either a one-way signal (membership gossip, token
//! updates, forwarded input) or part of the single request/reply pair used
//! for clipboard fetches. Signals carry no reply expectation; the fetch pair
//! is correlated by a request id because peer channels are plain symmetric
//! byte streams.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current protocol version byte.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Total size of the common message header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Sentinel for "no usable pointer y coordinate" in [`RingMessage::UpdateGrab`].
///
/// Valid y values are global vertical coordinates in `0..=0xFFFF`, scaled from
/// the sender's screen height, so the receiving side can place the pointer at
/// the matching height when the grab crosses an edge.
pub const Y_INVALID: i32 = -1;

// ── Message type codes ────────────────────────────────────────────────────────

/// All message type codes defined by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Membership (0x00–0x0F)
    Hello = 0x01,
    NodeAdded = 0x02,
    NodeRemoved = 0x03,
    // Replicated state (0x10–0x1F)
    UpdateGrab = 0x10,
    UpdateOrder = 0x11,
    // Selections (0x20–0x2F)
    AcquireClipboard = 0x20,
    ReturnClipboard = 0x21,
    GetClipboard = 0x22,
    ClipboardData = 0x23,
    ClipboardError = 0x24,
    // Forwarded input (0x40–0x4F)
    MotionEvent = 0x40,
    ButtonEvent = 0x41,
    KeyEvent = 0x42,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MessageType::Hello),
            0x02 => Ok(MessageType::NodeAdded),
            0x03 => Ok(MessageType::NodeRemoved),
            0x10 => Ok(MessageType::UpdateGrab),
            0x11 => Ok(MessageType::UpdateOrder),
            0x20 => Ok(MessageType::AcquireClipboard),
            0x21 => Ok(MessageType::ReturnClipboard),
            0x22 => Ok(MessageType::GetClipboard),
            0x23 => Ok(MessageType::ClipboardData),
            0x24 => Ok(MessageType::ClipboardError),
            0x40 => Ok(MessageType::MotionEvent),
            0x41 => Ok(MessageType::ButtonEvent),
            0x42 => Ok(MessageType::KeyEvent),
            _ => Err(()),
        }
    }
}

// ── Per-message payload structs ───────────────────────────────────────────────

/// HELLO (0x01): first message on every new channel, in both directions.
///
/// Carries the sender's identity and its current logical clocks so the
/// receiver can max-merge them before any state exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloMessage {
    /// Opaque unique node id (derived from user + host at startup).
    pub node_id: String,
    /// Connection address other nodes can dial, `"host:port"`.
    pub address: String,
    /// Grab token generation.
    pub active_generation: u64,
    /// Order replica generation.
    pub order_generation: u64,
    /// Selection generation (merged into the clipboard token).
    pub selection_generation: u64,
}

/// NODE_ADDED (0x02): membership gossip announcing a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddedMessage {
    pub node_id: String,
    pub address: String,
}

/// NODE_REMOVED (0x03): membership gossip retiring a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRemovedMessage {
    pub node_id: String,
    pub address: String,
    /// When true the node also leaves the replicated order; when false it is
    /// only disconnected and keeps its slot for a later rejoin.
    pub remove_from_order: bool,
}

/// UPDATE_GRAB (0x10): generation-stamped claim of the input focus token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateGrabMessage {
    pub generation: u64,
    /// Id of the node that owns the grab after this update.
    pub owner_id: String,
    /// Last known pointer height in global `0..=0xFFFF` coordinates, or
    /// [`Y_INVALID`].
    pub y: i32,
}

/// UPDATE_ORDER (0x11): generation-stamped replica of the node ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOrderMessage {
    pub generation: u64,
    /// Left-to-right node ids, duplicates forbidden.
    pub order: Vec<String>,
}

/// ACQUIRE_CLIPBOARD (0x20): the sender took ownership of a selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquireClipboardMessage {
    pub generation: u64,
    /// `true` for the primary selection, `false` for the clipboard.
    pub primary: bool,
    /// Target types the owner can serve, advertised without data transfer.
    pub targets: Vec<String>,
}

/// RETURN_CLIPBOARD (0x21): the owning side dissolved a selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnClipboardMessage {
    pub generation: u64,
    pub primary: bool,
}

/// GET_CLIPBOARD (0x22): fetch one target from the current selection owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetClipboardMessage {
    /// Correlates the eventual [`ClipboardDataMessage`] or
    /// [`ClipboardErrorMessage`] reply.
    pub request_id: Uuid,
    pub primary: bool,
    /// The single target type requested.
    pub target: String,
}

/// CLIPBOARD_DATA (0x23): successful reply to a GET_CLIPBOARD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardDataMessage {
    pub request_id: Uuid,
    /// Owner-side format tag, passed through opaquely.
    pub format: u32,
    pub data: Vec<u8>,
}

/// Error codes for a failed GET_CLIPBOARD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SelectionErrorCode {
    /// The asked node is not the current owner of that selection.
    NotOwner = 0x01,
    /// The owner failed to read its local selection data.
    ReadFailed = 0x02,
    /// The selection data exceeds the transport's message size ceiling.
    TooLarge = 0x03,
}

impl TryFrom<u8> for SelectionErrorCode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(SelectionErrorCode::NotOwner),
            0x02 => Ok(SelectionErrorCode::ReadFailed),
            0x03 => Ok(SelectionErrorCode::TooLarge),
            _ => Err(()),
        }
    }
}

/// CLIPBOARD_ERROR (0x24): failed reply to a GET_CLIPBOARD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardErrorMessage {
    pub request_id: Uuid,
    pub code: SelectionErrorCode,
    /// Human-readable detail for logs, never shown to end users.
    pub message: String,
}

/// MOTION_EVENT (0x40): relative pointer motion, sent only to the grab owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionEventMessage {
    pub dx: i32,
    pub dy: i32,
}

/// BUTTON_EVENT (0x41): pointer button press/release, grab owner only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonEventMessage {
    pub button: u32,
    pub is_press: bool,
}

/// KEY_EVENT (0x42): keyboard press/release, grab owner only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEventMessage {
    pub key: u32,
    pub is_press: bool,
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// All valid deskring messages, discriminated by type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RingMessage {
    Hello(HelloMessage),
    NodeAdded(NodeAddedMessage),
    NodeRemoved(NodeRemovedMessage),
    UpdateGrab(UpdateGrabMessage),
    UpdateOrder(UpdateOrderMessage),
    AcquireClipboard(AcquireClipboardMessage),
    ReturnClipboard(ReturnClipboardMessage),
    GetClipboard(GetClipboardMessage),
    ClipboardData(ClipboardDataMessage),
    ClipboardError(ClipboardErrorMessage),
    MotionEvent(MotionEventMessage),
    ButtonEvent(ButtonEventMessage),
    KeyEvent(KeyEventMessage),
}

impl RingMessage {
    /// Returns the [`MessageType`] discriminant for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            RingMessage::Hello(_) => MessageType::Hello,
            RingMessage::NodeAdded(_) => MessageType::NodeAdded,
            RingMessage::NodeRemoved(_) => MessageType::NodeRemoved,
            RingMessage::UpdateGrab(_) => MessageType::UpdateGrab,
            RingMessage::UpdateOrder(_) => MessageType::UpdateOrder,
            RingMessage::AcquireClipboard(_) => MessageType::AcquireClipboard,
            RingMessage::ReturnClipboard(_) => MessageType::ReturnClipboard,
            RingMessage::GetClipboard(_) => MessageType::GetClipboard,
            RingMessage::ClipboardData(_) => MessageType::ClipboardData,
            RingMessage::ClipboardError(_) => MessageType::ClipboardError,
            RingMessage::MotionEvent(_) => MessageType::MotionEvent,
            RingMessage::ButtonEvent(_) => MessageType::ButtonEvent,
            RingMessage::KeyEvent(_) => MessageType::KeyEvent,
        }
    }
}
