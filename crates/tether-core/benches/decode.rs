//! Decoder benchmarks

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tether_core::{decode_auto, detect_formats, sniff};

fn auto_json_benchmark(c: &mut Criterion) {
    let data = Bytes::from_static(
        br#"{"topic":"quotes","symbol":"BTC/USDT","bid":64123.5,"ask":64124.0,"ts":1700000000000}"#,
    );

    c.bench_function("decode_auto_json", |b| b.iter(|| black_box(decode_auto(&data))));
}

fn auto_binary_benchmark(c: &mut Criterion) {
    let data = Bytes::from((0..=255u8).cycle().take(4096).collect::<Vec<_>>());

    c.bench_function("decode_auto_binary_4k", |b| {
        b.iter(|| black_box(decode_auto(&data)))
    });
}

fn sniff_benchmark(c: &mut Criterion) {
    let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();

    c.bench_function("detect_formats_4k", |b| {
        b.iter(|| black_box(detect_formats(&data)))
    });
    c.bench_function("hex_dump_4k", |b| b.iter(|| black_box(sniff::hex_dump(&data))));
}

criterion_group!(benches, auto_json_benchmark, auto_binary_benchmark, sniff_benchmark);
criterion_main!(benches);
