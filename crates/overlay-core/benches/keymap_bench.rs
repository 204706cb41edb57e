//! Criterion benchmarks for key code translation and event encoding.
//!
//! Both run once per captured event, so they sit on the latency path between
//! a key press and the viewer seeing it.
//!
//! Run with:
//! ```bash
//! cargo bench --package overlay-core --bench keymap_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use overlay_core::keymap::KeyMapper;
use overlay_core::{Event, EventEncoder, KeyCode, ScrollAxis, WireFormat};

/// Evdev codes for common keys, a mouse button and one unmapped code.
const BENCH_EVDEV_CODES: &[u16] = &[
    30,    // KEY_A
    44,    // KEY_Z
    28,    // KEY_ENTER
    1,     // KEY_ESC
    14,    // KEY_BACKSPACE
    15,    // KEY_TAB
    57,    // KEY_SPACE
    59,    // KEY_F1
    88,    // KEY_F12
    29,    // KEY_LEFTCTRL
    42,    // KEY_LEFTSHIFT
    56,    // KEY_LEFTALT
    125,   // KEY_LEFTMETA
    105,   // KEY_LEFT
    106,   // KEY_RIGHT
    2,     // KEY_1
    0x110, // BTN_LEFT
    0x2fe, // unmapped
];

fn bench_evdev_to_key(c: &mut Criterion) {
    let mut group = c.benchmark_group("keymap_evdev");

    group.bench_function("evdev_to_key_single", |b| {
        b.iter(|| KeyMapper::evdev_to_key(black_box(30)))
    });

    group.bench_function("evdev_to_key_batch_18", |b| {
        b.iter(|| {
            BENCH_EVDEV_CODES
                .iter()
                .map(|&code| KeyMapper::evdev_to_key(black_box(code)))
                .collect::<Vec<_>>()
        })
    });

    group.finish();
}

fn bench_key_to_uiohook(c: &mut Criterion) {
    let mut group = c.benchmark_group("keymap_uiohook");

    for key in [KeyCode::A, KeyCode::Unknown] {
        group.bench_with_input(BenchmarkId::new("key_to_vc", key.name()), &key, |b, &key| {
            b.iter(|| KeyMapper::key_to_uiohook_vc(black_box(key)))
        });
    }

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let events = [
        ("key_down", Event::press(KeyCode::A, 1_000)),
        ("mouse_move", Event::mouse_move(-12, 7, 2_000)),
        ("mouse_scroll", Event::mouse_scroll(ScrollAxis::Vertical, -1, 3_000)),
    ];

    for format in [WireFormat::Native, WireFormat::Uiohook] {
        for (name, event) in &events {
            group.bench_with_input(
                BenchmarkId::new(format.to_string(), name),
                event,
                |b, event| {
                    let mut encoder = EventEncoder::new(format);
                    b.iter(|| encoder.encode(black_box(event)))
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_evdev_to_key, bench_key_to_uiohook, bench_encode);
criterion_main!(benches);
