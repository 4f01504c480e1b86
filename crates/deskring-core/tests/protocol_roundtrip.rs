//! Integration tests for the deskring protocol codec.
//!
//! These tests verify complete round-trip encoding and decoding of every
//! message type through the public API, exercising the codec, message types,
//! and sequence counter together.

use deskring_core::protocol::messages::{
    AcquireClipboardMessage, ButtonEventMessage, ClipboardDataMessage, ClipboardErrorMessage,
    GetClipboardMessage, HelloMessage, KeyEventMessage, MotionEventMessage, NodeAddedMessage,
    NodeRemovedMessage, ReturnClipboardMessage, UpdateGrabMessage, UpdateOrderMessage, Y_INVALID,
};
use deskring_core::{
    decode_message, encode_message, RingMessage, SelectionErrorCode, SequenceCounter,
};
use uuid::Uuid;

/// Encodes a message and then decodes it, asserting that the decoded message
/// matches the original.
fn roundtrip(msg: RingMessage) -> RingMessage {
    let counter = SequenceCounter::new();
    let bytes = encode_message(&msg, counter.next()).expect("encode must succeed");
    let (decoded, consumed) = decode_message(&bytes).expect("decode must succeed");
    assert_eq!(consumed, bytes.len(), "all bytes must be consumed");
    decoded
}

#[test]
fn test_roundtrip_every_message_type() {
    let request_id = Uuid::new_v4();
    let messages = vec![
        RingMessage::Hello(HelloMessage {
            node_id: "integration-test".to_string(),
            address: "10.0.0.7:7421".to_string(),
            active_generation: 11,
            order_generation: 23,
            selection_generation: 5,
        }),
        RingMessage::NodeAdded(NodeAddedMessage {
            node_id: "n2".to_string(),
            address: "10.0.0.8:7421".to_string(),
        }),
        RingMessage::NodeRemoved(NodeRemovedMessage {
            node_id: "n2".to_string(),
            address: "10.0.0.8:7421".to_string(),
            remove_from_order: true,
        }),
        RingMessage::UpdateGrab(UpdateGrabMessage {
            generation: 7,
            owner_id: "n2".to_string(),
            y: 32000,
        }),
        RingMessage::UpdateOrder(UpdateOrderMessage {
            generation: 8,
            order: vec!["n1".to_string(), "n2".to_string(), "n3".to_string()],
        }),
        RingMessage::AcquireClipboard(AcquireClipboardMessage {
            generation: 3,
            primary: true,
            targets: vec!["UTF8_STRING".to_string(), "TEXT".to_string()],
        }),
        RingMessage::ReturnClipboard(ReturnClipboardMessage {
            generation: 4,
            primary: false,
        }),
        RingMessage::GetClipboard(GetClipboardMessage {
            request_id,
            primary: false,
            target: "UTF8_STRING".to_string(),
        }),
        RingMessage::ClipboardData(ClipboardDataMessage {
            request_id,
            format: 8,
            data: vec![1, 2, 3, 4, 5],
        }),
        RingMessage::ClipboardError(ClipboardErrorMessage {
            request_id,
            code: SelectionErrorCode::TooLarge,
            message: "clipboard data too large".to_string(),
        }),
        RingMessage::MotionEvent(MotionEventMessage { dx: -3, dy: 11 }),
        RingMessage::ButtonEvent(ButtonEventMessage {
            button: 1,
            is_press: true,
        }),
        RingMessage::KeyEvent(KeyEventMessage {
            key: 0x32,
            is_press: false,
        }),
    ];

    for original in messages {
        assert_eq!(original, roundtrip(original.clone()));
    }
}

#[test]
fn test_sequence_numbers_advance_per_message() {
    let counter = SequenceCounter::new();
    let msg = RingMessage::MotionEvent(MotionEventMessage { dx: 1, dy: 1 });

    let first = encode_message(&msg, counter.next()).expect("encode");
    let second = encode_message(&msg, counter.next()).expect("encode");

    let first_seq = u64::from_be_bytes(first[8..16].try_into().unwrap());
    let second_seq = u64::from_be_bytes(second[8..16].try_into().unwrap());
    assert_eq!(second_seq, first_seq + 1);
}

#[test]
fn test_roundtrip_grab_update_with_invalid_y() {
    let original = RingMessage::UpdateGrab(UpdateGrabMessage {
        generation: 1,
        owner_id: "n1".to_string(),
        y: Y_INVALID,
    });
    assert_eq!(original, roundtrip(original.clone()));
}

#[test]
fn test_decoding_a_concatenated_stream_consumes_frame_by_frame() {
    let first = RingMessage::KeyEvent(KeyEventMessage {
        key: 10,
        is_press: true,
    });
    let second = RingMessage::NodeAdded(NodeAddedMessage {
        node_id: "n9".to_string(),
        address: "10.0.0.9:7421".to_string(),
    });

    let mut stream = encode_message(&first, 0).expect("encode");
    stream.extend_from_slice(&encode_message(&second, 1).expect("encode"));

    let (decoded_first, consumed) = decode_message(&stream).expect("decode first");
    assert_eq!(decoded_first, first);
    let (decoded_second, rest) = decode_message(&stream[consumed..]).expect("decode second");
    assert_eq!(decoded_second, second);
    assert_eq!(consumed + rest, stream.len());
}
