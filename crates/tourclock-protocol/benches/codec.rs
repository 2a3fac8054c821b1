//! Codec benchmarks for tourclock-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use serde_json::json;
use tourclock_protocol::codec;

fn bench_decode_join(c: &mut Criterion) {
    let text = r#"{"type":"join","name":"alice","clockManager":true}"#;

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("join", |b| b.iter(|| codec::decode(black_box(text))));
    group.finish();
}

fn bench_decode_sync(c: &mut Criterion) {
    let text = r#"{"type":"sync","data":{"level":3,"elapsed":1830,"paused":false,"blinds":[100,200]}}"#;

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("sync", |b| b.iter(|| codec::decode(black_box(text))));
    group.finish();
}

fn bench_encode_payload(c: &mut Criterion) {
    let payload = json!({"level": 3, "elapsed": 1830, "paused": false, "blinds": [100, 200]});

    c.bench_function("encode_payload", |b| {
        b.iter(|| codec::encode_payload(black_box(&payload)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_decode_join,
    bench_decode_sync,
    bench_encode_payload
);
criterion_main!(benches);
