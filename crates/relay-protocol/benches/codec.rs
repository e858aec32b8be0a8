//! Codec benchmarks for relay-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use relay_protocol::{codec, Envelope};

fn bench_encode_small(c: &mut Criterion) {
    let envelope = Envelope::from_peer("0b6f3c1e-8f0a-4a53-9d5e-2f1c7c6a9e10", "x".repeat(64));

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(64));
    group.bench_function("small_64B", |b| b.iter(|| codec::encode(black_box(&envelope))));
    group.finish();
}

fn bench_decode_small(c: &mut Criterion) {
    let envelope = Envelope::from_peer("0b6f3c1e-8f0a-4a53-9d5e-2f1c7c6a9e10", "x".repeat(64));
    let encoded = codec::encode(&envelope).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("small_64B", |b| {
        b.iter(|| codec::decode(black_box(&encoded)))
    });
    group.finish();
}

fn bench_encode_notice(c: &mut Criterion) {
    let envelope = Envelope::joined();

    c.bench_function("encode_notice", |b| {
        b.iter(|| codec::encode(black_box(&envelope)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_encode_small,
    bench_decode_small,
    bench_encode_notice
);
criterion_main!(benches);
