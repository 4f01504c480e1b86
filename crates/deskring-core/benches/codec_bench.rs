//! Criterion benchmarks for the deskring binary codec.
//!
//! Encoding and decoding sit on the forwarded-input path (every pointer
//! motion crosses the codec), so both directions are measured for the small
//! hot messages and for a large clipboard payload.
//!
//! Run with:
//! ```bash
//! cargo bench --package deskring-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use deskring_core::protocol::messages::{
    AcquireClipboardMessage, ClipboardDataMessage, HelloMessage, MotionEventMessage,
    RingMessage, UpdateOrderMessage,
};
use deskring_core::{decode_message, encode_message};
use uuid::Uuid;

// ── Message fixtures ──────────────────────────────────────────────────────────

fn make_motion() -> RingMessage {
    RingMessage::MotionEvent(MotionEventMessage { dx: -4, dy: 9 })
}

fn make_hello() -> RingMessage {
    RingMessage::Hello(HelloMessage {
        node_id: "bench's desktop on argon".to_string(),
        address: "192.168.1.77:7421".to_string(),
        active_generation: 12,
        order_generation: 80,
        selection_generation: 4,
    })
}

fn make_order() -> RingMessage {
    RingMessage::UpdateOrder(UpdateOrderMessage {
        generation: 99,
        order: (0..16).map(|i| format!("node-{i:02}")).collect(),
    })
}

fn make_acquire() -> RingMessage {
    RingMessage::AcquireClipboard(AcquireClipboardMessage {
        generation: 7,
        primary: false,
        targets: vec![
            "UTF8_STRING".to_string(),
            "TEXT".to_string(),
            "text/html".to_string(),
        ],
    })
}

fn make_clipboard_data(len: usize) -> RingMessage {
    RingMessage::ClipboardData(ClipboardDataMessage {
        request_id: Uuid::nil(),
        format: 8,
        data: vec![0xA5; len],
    })
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    for (name, msg) in [
        ("motion", make_motion()),
        ("hello", make_hello()),
        ("order_16", make_order()),
        ("acquire", make_acquire()),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &msg, |b, msg| {
            b.iter(|| encode_message(black_box(msg), 0).unwrap());
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for (name, msg) in [
        ("motion", make_motion()),
        ("hello", make_hello()),
        ("order_16", make_order()),
        ("acquire", make_acquire()),
    ] {
        let bytes = encode_message(&msg, 0).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &bytes, |b, bytes| {
            b.iter(|| decode_message(black_box(bytes)).unwrap());
        });
    }
    group.finish();
}

fn bench_clipboard_payloads(c: &mut Criterion) {
    let mut group = c.benchmark_group("clipboard_roundtrip");
    for len in [1024usize, 64 * 1024, 1024 * 1024] {
        let msg = make_clipboard_data(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &msg, |b, msg| {
            b.iter(|| {
                let bytes = encode_message(black_box(msg), 0).unwrap();
                decode_message(&bytes).unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_clipboard_payloads);
criterion_main!(benches);
