//! Binary codec for encoding and decoding deskring protocol messages.
//!
//! Wire format:
//! ```text
//! [version:1][msg_type:1][reserved:2][payload_len:4][seq:8][payload:N]
//! ```
//! Total header size: 16 bytes. All multi-byte integers are big-endian.
//! Strings are UTF-8 with a 2-byte length prefix; string lists carry a 2-byte
//! element count; byte blobs carry a 4-byte length prefix.

use crate::protocol::messages::{
    AcquireClipboardMessage, ButtonEventMessage, ClipboardDataMessage, ClipboardErrorMessage,
    GetClipboardMessage, HelloMessage, KeyEventMessage, MessageType, MotionEventMessage,
    NodeAddedMessage, NodeRemovedMessage, ReturnClipboardMessage, RingMessage,
    SelectionErrorCode, UpdateGrabMessage, UpdateOrderMessage, HEADER_SIZE, PROTOCOL_VERSION,
};
use thiserror::Error;
use uuid::Uuid;

/// Upper bound on a single message (header + payload) accepted on the wire.
///
/// A header declaring a larger payload is treated as a protocol violation and
/// drops the connection. Selection fetches enforce their byte ceiling against
/// this same bound.
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The message type byte in the header is not a recognized value.
    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// The protocol version in the header is not supported.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The payload could not be parsed (field out of range, UTF-8 error, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The encoded payload length field does not match the data available.
    #[error("payload length mismatch: header says {declared}, available is {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },

    /// The declared payload exceeds [`MAX_MESSAGE_SIZE`].
    #[error("message too large: {declared} bytes, limit is {limit}")]
    MessageTooLarge { declared: usize, limit: usize },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`RingMessage`] into a byte vector including the 16-byte header.
///
/// The sequence number is **not** set by this function – pass a value from a
/// [`crate::protocol::SequenceCounter`].
///
/// # Errors
///
/// Returns [`ProtocolError`] if serialization fails.
///
/// # Examples
///
/// ```rust
/// use deskring_core::protocol::{decode_message, encode_message};
/// use deskring_core::protocol::messages::{MotionEventMessage, RingMessage};
///
/// let msg = RingMessage::MotionEvent(MotionEventMessage { dx: 4, dy: -2 });
/// let bytes = encode_message(&msg, 0).unwrap();
/// let (decoded, consumed) = decode_message(&bytes).unwrap();
/// assert_eq!(decoded, msg);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_message(msg: &RingMessage, sequence_number: u64) -> Result<Vec<u8>, ProtocolError> {
    let payload = encode_payload(msg);
    let payload_len = payload.len() as u32;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());

    // Header: version (1) + msg_type (1) + reserved (2) + payload_len (4) +
    //         seq (8) = 16 bytes
    buf.push(PROTOCOL_VERSION);
    buf.push(msg.message_type() as u8);
    buf.push(0x00); // reserved
    buf.push(0x00); // reserved
    buf.extend_from_slice(&payload_len.to_be_bytes());
    buf.extend_from_slice(&sequence_number.to_be_bytes());

    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decodes one [`RingMessage`] from the beginning of `bytes`.
///
/// Returns the decoded message and the total number of bytes consumed
/// (header + payload), so the caller can advance their read cursor.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are malformed.
pub fn decode_message(bytes: &[u8]) -> Result<(RingMessage, usize), ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let version = bytes[0];
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let msg_type_byte = bytes[1];
    let msg_type = MessageType::try_from(msg_type_byte)
        .map_err(|_| ProtocolError::UnknownMessageType(msg_type_byte))?;

    // bytes[2..4] are reserved – ignored on decode

    let payload_len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;

    if HEADER_SIZE + payload_len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            declared: payload_len,
            limit: MAX_MESSAGE_SIZE,
        });
    }

    let total_needed = HEADER_SIZE + payload_len;
    if bytes.len() < total_needed {
        return Err(ProtocolError::PayloadLengthMismatch {
            declared: payload_len,
            available: bytes.len() - HEADER_SIZE,
        });
    }

    let payload = &bytes[HEADER_SIZE..HEADER_SIZE + payload_len];
    let msg = decode_payload(msg_type, payload)?;
    Ok((msg, total_needed))
}

/// Reads the declared payload length from an already-validated header slice.
///
/// Used by the transport to size the payload read after pulling exactly
/// [`HEADER_SIZE`] bytes off a stream.
///
/// # Errors
///
/// Returns [`ProtocolError`] when the slice is short, the version is wrong,
/// or the declared length exceeds [`MAX_MESSAGE_SIZE`].
pub fn decode_header(bytes: &[u8]) -> Result<usize, ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }
    if bytes[0] != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(bytes[0]));
    }
    MessageType::try_from(bytes[1]).map_err(|_| ProtocolError::UnknownMessageType(bytes[1]))?;
    let payload_len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    if HEADER_SIZE + payload_len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            declared: payload_len,
            limit: MAX_MESSAGE_SIZE,
        });
    }
    Ok(payload_len)
}

// ── Payload encoding ──────────────────────────────────────────────────────────

fn encode_payload(msg: &RingMessage) -> Vec<u8> {
    let mut buf = Vec::new();
    match msg {
        RingMessage::Hello(m) => encode_hello(&mut buf, m),
        RingMessage::NodeAdded(m) => encode_node_added(&mut buf, m),
        RingMessage::NodeRemoved(m) => encode_node_removed(&mut buf, m),
        RingMessage::UpdateGrab(m) => encode_update_grab(&mut buf, m),
        RingMessage::UpdateOrder(m) => encode_update_order(&mut buf, m),
        RingMessage::AcquireClipboard(m) => encode_acquire_clipboard(&mut buf, m),
        RingMessage::ReturnClipboard(m) => encode_return_clipboard(&mut buf, m),
        RingMessage::GetClipboard(m) => encode_get_clipboard(&mut buf, m),
        RingMessage::ClipboardData(m) => encode_clipboard_data(&mut buf, m),
        RingMessage::ClipboardError(m) => encode_clipboard_error(&mut buf, m),
        RingMessage::MotionEvent(m) => {
            buf.extend_from_slice(&m.dx.to_be_bytes());
            buf.extend_from_slice(&m.dy.to_be_bytes());
        }
        RingMessage::ButtonEvent(m) => {
            buf.extend_from_slice(&m.button.to_be_bytes());
            buf.push(if m.is_press { 0x01 } else { 0x00 });
        }
        RingMessage::KeyEvent(m) => {
            buf.extend_from_slice(&m.key.to_be_bytes());
            buf.push(if m.is_press { 0x01 } else { 0x00 });
        }
    }
    buf
}

// ── Payload decoding ──────────────────────────────────────────────────────────

fn decode_payload(msg_type: MessageType, payload: &[u8]) -> Result<RingMessage, ProtocolError> {
    match msg_type {
        MessageType::Hello => decode_hello(payload).map(RingMessage::Hello),
        MessageType::NodeAdded => decode_node_added(payload).map(RingMessage::NodeAdded),
        MessageType::NodeRemoved => decode_node_removed(payload).map(RingMessage::NodeRemoved),
        MessageType::UpdateGrab => decode_update_grab(payload).map(RingMessage::UpdateGrab),
        MessageType::UpdateOrder => decode_update_order(payload).map(RingMessage::UpdateOrder),
        MessageType::AcquireClipboard => {
            decode_acquire_clipboard(payload).map(RingMessage::AcquireClipboard)
        }
        MessageType::ReturnClipboard => {
            decode_return_clipboard(payload).map(RingMessage::ReturnClipboard)
        }
        MessageType::GetClipboard => decode_get_clipboard(payload).map(RingMessage::GetClipboard),
        MessageType::ClipboardData => {
            decode_clipboard_data(payload).map(RingMessage::ClipboardData)
        }
        MessageType::ClipboardError => {
            decode_clipboard_error(payload).map(RingMessage::ClipboardError)
        }
        MessageType::MotionEvent => {
            require_len(payload, 8, "MotionEvent")?;
            let dx = read_i32(payload, 0);
            let dy = read_i32(payload, 4);
            Ok(RingMessage::MotionEvent(MotionEventMessage { dx, dy }))
        }
        MessageType::ButtonEvent => {
            require_len(payload, 5, "ButtonEvent")?;
            let button = read_u32(payload, 0);
            let is_press = payload[4] != 0;
            Ok(RingMessage::ButtonEvent(ButtonEventMessage {
                button,
                is_press,
            }))
        }
        MessageType::KeyEvent => {
            require_len(payload, 5, "KeyEvent")?;
            let key = read_u32(payload, 0);
            let is_press = payload[4] != 0;
            Ok(RingMessage::KeyEvent(KeyEventMessage { key, is_press }))
        }
    }
}

// ── Per-message encode helpers ────────────────────────────────────────────────

fn encode_hello(buf: &mut Vec<u8>, m: &HelloMessage) {
    write_string(buf, &m.node_id);
    write_string(buf, &m.address);
    buf.extend_from_slice(&m.active_generation.to_be_bytes());
    buf.extend_from_slice(&m.order_generation.to_be_bytes());
    buf.extend_from_slice(&m.selection_generation.to_be_bytes());
}

fn encode_node_added(buf: &mut Vec<u8>, m: &NodeAddedMessage) {
    write_string(buf, &m.node_id);
    write_string(buf, &m.address);
}

fn encode_node_removed(buf: &mut Vec<u8>, m: &NodeRemovedMessage) {
    write_string(buf, &m.node_id);
    write_string(buf, &m.address);
    buf.push(if m.remove_from_order { 0x01 } else { 0x00 });
}

fn encode_update_grab(buf: &mut Vec<u8>, m: &UpdateGrabMessage) {
    buf.extend_from_slice(&m.generation.to_be_bytes());
    write_string(buf, &m.owner_id);
    buf.extend_from_slice(&m.y.to_be_bytes());
}

fn encode_update_order(buf: &mut Vec<u8>, m: &UpdateOrderMessage) {
    buf.extend_from_slice(&m.generation.to_be_bytes());
    write_string_list(buf, &m.order);
}

fn encode_acquire_clipboard(buf: &mut Vec<u8>, m: &AcquireClipboardMessage) {
    buf.extend_from_slice(&m.generation.to_be_bytes());
    buf.push(if m.primary { 0x01 } else { 0x00 });
    write_string_list(buf, &m.targets);
}

fn encode_return_clipboard(buf: &mut Vec<u8>, m: &ReturnClipboardMessage) {
    buf.extend_from_slice(&m.generation.to_be_bytes());
    buf.push(if m.primary { 0x01 } else { 0x00 });
}

fn encode_get_clipboard(buf: &mut Vec<u8>, m: &GetClipboardMessage) {
    buf.extend_from_slice(m.request_id.as_bytes());
    buf.push(if m.primary { 0x01 } else { 0x00 });
    write_string(buf, &m.target);
}

fn encode_clipboard_data(buf: &mut Vec<u8>, m: &ClipboardDataMessage) {
    buf.extend_from_slice(m.request_id.as_bytes());
    buf.extend_from_slice(&m.format.to_be_bytes());
    buf.extend_from_slice(&(m.data.len() as u32).to_be_bytes());
    buf.extend_from_slice(&m.data);
}

fn encode_clipboard_error(buf: &mut Vec<u8>, m: &ClipboardErrorMessage) {
    buf.extend_from_slice(m.request_id.as_bytes());
    buf.push(m.code as u8);
    write_string(buf, &m.message);
}

// ── Per-message decode helpers ────────────────────────────────────────────────

fn decode_hello(p: &[u8]) -> Result<HelloMessage, ProtocolError> {
    let (node_id, off) = read_string(p, 0)?;
    let (address, off) = read_string(p, off)?;
    require_len(p, off + 24, "Hello.generations")?;
    let active_generation = read_u64(p, off);
    let order_generation = read_u64(p, off + 8);
    let selection_generation = read_u64(p, off + 16);
    Ok(HelloMessage {
        node_id,
        address,
        active_generation,
        order_generation,
        selection_generation,
    })
}

fn decode_node_added(p: &[u8]) -> Result<NodeAddedMessage, ProtocolError> {
    let (node_id, off) = read_string(p, 0)?;
    let (address, _) = read_string(p, off)?;
    Ok(NodeAddedMessage { node_id, address })
}

fn decode_node_removed(p: &[u8]) -> Result<NodeRemovedMessage, ProtocolError> {
    let (node_id, off) = read_string(p, 0)?;
    let (address, off) = read_string(p, off)?;
    require_len(p, off + 1, "NodeRemoved.remove_from_order")?;
    let remove_from_order = p[off] != 0;
    Ok(NodeRemovedMessage {
        node_id,
        address,
        remove_from_order,
    })
}

fn decode_update_grab(p: &[u8]) -> Result<UpdateGrabMessage, ProtocolError> {
    require_len(p, 8, "UpdateGrab")?;
    let generation = read_u64(p, 0);
    let (owner_id, off) = read_string(p, 8)?;
    require_len(p, off + 4, "UpdateGrab.y")?;
    let y = read_i32(p, off);
    Ok(UpdateGrabMessage {
        generation,
        owner_id,
        y,
    })
}

fn decode_update_order(p: &[u8]) -> Result<UpdateOrderMessage, ProtocolError> {
    require_len(p, 8, "UpdateOrder")?;
    let generation = read_u64(p, 0);
    let (order, _) = read_string_list(p, 8)?;
    Ok(UpdateOrderMessage { generation, order })
}

fn decode_acquire_clipboard(p: &[u8]) -> Result<AcquireClipboardMessage, ProtocolError> {
    require_len(p, 9, "AcquireClipboard")?;
    let generation = read_u64(p, 0);
    let primary = p[8] != 0;
    let (targets, _) = read_string_list(p, 9)?;
    Ok(AcquireClipboardMessage {
        generation,
        primary,
        targets,
    })
}

fn decode_return_clipboard(p: &[u8]) -> Result<ReturnClipboardMessage, ProtocolError> {
    require_len(p, 9, "ReturnClipboard")?;
    let generation = read_u64(p, 0);
    let primary = p[8] != 0;
    Ok(ReturnClipboardMessage {
        generation,
        primary,
    })
}

fn decode_get_clipboard(p: &[u8]) -> Result<GetClipboardMessage, ProtocolError> {
    require_len(p, 17, "GetClipboard")?;
    let request_id = read_uuid(p, 0)?;
    let primary = p[16] != 0;
    let (target, _) = read_string(p, 17)?;
    Ok(GetClipboardMessage {
        request_id,
        primary,
        target,
    })
}

fn decode_clipboard_data(p: &[u8]) -> Result<ClipboardDataMessage, ProtocolError> {
    // 16 (uuid) + 4 (format) + 4 (data_len) + data
    require_len(p, 24, "ClipboardData")?;
    let request_id = read_uuid(p, 0)?;
    let format = read_u32(p, 16);
    let data_len = read_u32(p, 20) as usize;
    require_len(p, 24 + data_len, "ClipboardData.data")?;
    let data = p[24..24 + data_len].to_vec();
    Ok(ClipboardDataMessage {
        request_id,
        format,
        data,
    })
}

fn decode_clipboard_error(p: &[u8]) -> Result<ClipboardErrorMessage, ProtocolError> {
    require_len(p, 17, "ClipboardError")?;
    let request_id = read_uuid(p, 0)?;
    let code = SelectionErrorCode::try_from(p[16]).map_err(|_| {
        ProtocolError::MalformedPayload(format!("unknown selection error code: {}", p[16]))
    })?;
    let (message, _) = read_string(p, 17)?;
    Ok(ClipboardErrorMessage {
        request_id,
        code,
        message,
    })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::MalformedPayload(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    u64::from_be_bytes(buf[offset..offset + 8].try_into().unwrap())
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes(buf[offset..offset + 4].try_into().unwrap())
}

fn read_i32(buf: &[u8], offset: usize) -> i32 {
    i32::from_be_bytes(buf[offset..offset + 4].try_into().unwrap())
}

fn read_uuid(buf: &[u8], offset: usize) -> Result<Uuid, ProtocolError> {
    if buf.len() < offset + 16 {
        return Err(ProtocolError::MalformedPayload(format!(
            "need 16 bytes for UUID at offset {offset}, got {}",
            buf.len().saturating_sub(offset)
        )));
    }
    Ok(Uuid::from_bytes(
        buf[offset..offset + 16].try_into().unwrap(),
    ))
}

/// Writes a 2-byte length prefix followed by the UTF-8 string bytes.
fn write_string(buf: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    let len = bytes.len().min(u16::MAX as usize) as u16;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&bytes[..len as usize]);
}

/// Reads a 2-byte length prefix and then that many UTF-8 bytes.
/// Returns the string and the offset of the byte after the string.
fn read_string(buf: &[u8], offset: usize) -> Result<(String, usize), ProtocolError> {
    if buf.len() < offset + 2 {
        return Err(ProtocolError::MalformedPayload(format!(
            "need 2 bytes for string length at offset {offset}"
        )));
    }
    let len = u16::from_be_bytes([buf[offset], buf[offset + 1]]) as usize;
    let start = offset + 2;
    if buf.len() < start + len {
        return Err(ProtocolError::MalformedPayload(format!(
            "string of length {len} at offset {start} exceeds buffer"
        )));
    }
    let s = std::str::from_utf8(&buf[start..start + len])
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))?
        .to_string();
    Ok((s, start + len))
}

/// Writes a 2-byte element count followed by length-prefixed strings.
fn write_string_list(buf: &mut Vec<u8>, items: &[String]) {
    let count = items.len().min(u16::MAX as usize) as u16;
    buf.extend_from_slice(&count.to_be_bytes());
    for item in &items[..count as usize] {
        write_string(buf, item);
    }
}

/// Reads a 2-byte element count and then that many length-prefixed strings.
fn read_string_list(buf: &[u8], offset: usize) -> Result<(Vec<String>, usize), ProtocolError> {
    if buf.len() < offset + 2 {
        return Err(ProtocolError::MalformedPayload(format!(
            "need 2 bytes for list count at offset {offset}"
        )));
    }
    let count = u16::from_be_bytes([buf[offset], buf[offset + 1]]) as usize;
    let mut items = Vec::with_capacity(count.min(64));
    let mut off = offset + 2;
    for _ in 0..count {
        let (s, next) = read_string(buf, off)?;
        items.push(s);
        off = next;
    }
    Ok((items, off))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
