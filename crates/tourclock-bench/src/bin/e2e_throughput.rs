//! End-to-end relay throughput benchmark for tourclock.
//!
//! One manager client pushes sync messages as fast as it can while the
//! remaining clients count the relays they receive, over real WebSockets.

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Barrier;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const SERVER_URL: &str = "ws://127.0.0.1:3002/tours/bench/clock";
const WARMUP_SECS: u64 = 2;
const BENCH_SECS: u64 = 10;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let num_clients = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(16);

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║        tourclock End-to-End Relay Throughput Benchmark       ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Make sure the server is running: cargo run --release        ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    run_relay_benchmark(num_clients).await;
}

async fn run_relay_benchmark(num_clients: usize) {
    println!("📊 Relay Benchmark: 1 manager, {} watchers", num_clients);
    println!("   Warmup: {}s, Measurement: {}s", WARMUP_SECS, BENCH_SECS);
    println!();

    let received = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(num_clients + 2));

    let mut handles = Vec::new();

    for client_id in 0..num_clients {
        let received = Arc::clone(&received);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            if let Err(e) = run_watcher(client_id, received, barrier).await {
                eprintln!("Watcher {} error: {}", client_id, e);
            }
        }));
    }

    let manager_barrier = Arc::clone(&barrier);
    handles.push(tokio::spawn(async move {
        if let Err(e) = run_manager(manager_barrier).await {
            eprintln!("Manager error: {}", e);
        }
    }));

    barrier.wait().await;
    println!("✓ All {} clients joined", num_clients + 1);

    println!("⏳ Warming up for {}s...", WARMUP_SECS);
    tokio::time::sleep(Duration::from_secs(WARMUP_SECS)).await;

    received.store(0, Ordering::SeqCst);
    let start = Instant::now();

    println!("📈 Measuring for {}s...", BENCH_SECS);
    tokio::time::sleep(Duration::from_secs(BENCH_SECS)).await;

    let elapsed = start.elapsed();
    let total = received.load(Ordering::SeqCst);
    let per_sec = total as f64 / elapsed.as_secs_f64();
    let per_watcher = per_sec / num_clients.max(1) as f64;

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                         RESULTS                              ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!(
        "║  Watchers:             {:>10}                           ║",
        num_clients
    );
    println!(
        "║  Duration:             {:>10.2}s                          ║",
        elapsed.as_secs_f64()
    );
    println!(
        "║  Relays Received:      {:>10}                           ║",
        total
    );
    println!(
        "║  Throughput:           {:>10.0} msg/s                    ║",
        per_sec
    );
    println!(
        "║  Per-Watcher:          {:>10.0} msg/s                    ║",
        per_watcher
    );
    println!("╚══════════════════════════════════════════════════════════════╝");

    for handle in handles {
        handle.abort();
    }
}

async fn run_watcher(
    client_id: usize,
    received: Arc<AtomicU64>,
    barrier: Arc<Barrier>,
) -> Result<(), BoxError> {
    let (ws, _) = connect_async(SERVER_URL).await?;
    let (mut sender, mut receiver) = ws.split();

    let join = serde_json::json!({"type": "join", "name": format!("watcher-{client_id}")});
    sender.send(Message::Text(join.to_string())).await?;

    barrier.wait().await;

    while let Some(result) = receiver.next().await {
        if let Ok(Message::Text(_)) = result {
            received.fetch_add(1, Ordering::Relaxed);
        }
    }
    Ok(())
}

async fn run_manager(barrier: Arc<Barrier>) -> Result<(), BoxError> {
    let (ws, _) = connect_async(SERVER_URL).await?;
    let (mut sender, mut receiver) = ws.split();

    let join = r#"{"type":"join","name":"manager","clockManager":true}"#;
    sender.send(Message::Text(join.to_string())).await?;

    // Discard join signals from watchers.
    let drain = tokio::spawn(async move { while receiver.next().await.is_some() {} });

    barrier.wait().await;

    let mut elapsed: u64 = 0;
    loop {
        elapsed += 1;
        let sync = format!(r#"{{"type":"sync","data":{{"elapsed":{elapsed},"paused":false}}}}"#);
        if sender.send(Message::Text(sync)).await.is_err() {
            break;
        }
        tokio::task::yield_now().await;
    }

    drain.abort();
    Ok(())
}
