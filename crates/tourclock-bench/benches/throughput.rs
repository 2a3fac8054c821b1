//! Throughput benchmarks for tourclock.
//!
//! These benchmarks measure sync relay fan-out across channel sizes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tourclock_core::{Channel, Member};
use tourclock_transport::{Outbound, QueuedConnection};

struct Fixture {
    channel: Channel,
    _connections: Vec<Arc<dyn Outbound>>,
    receivers: Vec<mpsc::Receiver<String>>,
}

fn fixture(members: usize) -> Fixture {
    let channel = Channel::new("bench");
    let mut connections = Vec::with_capacity(members);
    let mut receivers = Vec::with_capacity(members);

    for i in 0..members {
        let (conn, rx) = QueuedConnection::channel(1024);
        let conn: Arc<dyn Outbound> = Arc::new(conn);
        channel.join(Member::new(&conn, format!("user-{i}"), i == 0));
        connections.push(conn);
        receivers.push(rx);
    }

    Fixture {
        channel,
        _connections: connections,
        receivers,
    }
}

fn drain(receivers: &mut [mpsc::Receiver<String>]) {
    for rx in receivers {
        while rx.try_recv().is_ok() {}
    }
}

/// Benchmark relaying one sync to every other member.
fn bench_relay_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("relay_fanout");
    let payload = json!({"level": 3, "elapsed": 1830, "paused": false});

    for size in [10usize, 100, 1000] {
        let mut fx = fixture(size);
        group.throughput(Throughput::Elements(size as u64 - 1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let report = fx
                    .channel
                    .broadcast(black_box(&payload), &["user-0"])
                    .unwrap();
                drain(&mut fx.receivers);
                report
            })
        });
    }

    group.finish();
}

/// Benchmark pre-encoded broadcast without exclusions.
fn bench_broadcast_text(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast_text");
    let text = r#"{"level":3,"elapsed":1830,"paused":false}"#;

    for size in [10usize, 100, 1000] {
        let mut fx = fixture(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let report = fx.channel.broadcast_text(black_box(text), &[]);
                drain(&mut fx.receivers);
                report
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_relay_fanout, bench_broadcast_text);
criterion_main!(benches);
