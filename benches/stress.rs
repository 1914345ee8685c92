use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use gatesched::engine::{Engine, EngineError};
use gatesched::model::{AssignmentRequest, Ms};
use gatesched::notify::NotifyHub;
use gatesched::store::WalStore;

const HOUR: Ms = 3_600_000; // 1 hour in ms
const BASE: Ms = 1_767_225_600_000; // 2026-01-01T00:00:00Z

type BenchEngine = Arc<Engine<WalStore>>;

fn open_engine(name: &str) -> BenchEngine {
    let dir = std::env::temp_dir().join("gatesched_bench");
    if let Err(e) = std::fs::create_dir_all(&dir) {
        panic!("cannot create {}: {e}", dir.display());
    }
    let path = dir.join(format!("{name}_{}.wal", std::process::id()));
    let _ = std::fs::remove_file(&path);
    let store = match WalStore::open(&path) {
        Ok(store) => store,
        Err(e) => panic!("cannot open {}: {e}", path.display()),
    };
    Arc::new(Engine::new(Arc::new(store), Arc::new(NotifyHub::new())))
}

/// Non-overlapping hour slot `i` on the bench day range.
fn slot(gate: &str, flight: usize, i: i64) -> AssignmentRequest {
    let start = BASE + i * HOUR;
    AssignmentRequest::new(gate, format!("FL{flight}"), start, start + HOUR)
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

async fn phase1_sequential(engine: &BenchEngine) {
    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let t = Instant::now();
        if let Err(e) = engine.create_assignment(slot("SEQ1", i, i as i64)).await {
            panic!("sequential create {i} failed: {e}");
        }
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} assignments in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

/// Tasks on distinct gates never contend for a gate lock; group commit
/// batches their WAL appends.
async fn phase2_concurrent(engine: &BenchEngine) {
    let n_tasks = 10;
    let n_per_task = 200;

    let start = Instant::now();
    let mut handles = Vec::new();
    for task in 0..n_tasks {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let gate = format!("PAR{task}");
            for j in 0..n_per_task {
                if let Err(e) = engine.create_assignment(slot(&gate, j, j as i64)).await {
                    panic!("{gate} create {j} failed: {e}");
                }
            }
        }));
    }
    for h in handles {
        let _ = h.await;
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    let ops = total as f64 / elapsed.as_secs_f64();
    println!(
        "  {n_tasks} tasks x {n_per_task} assignments = {total} total in {:.2}s = {ops:.0} ops/sec",
        elapsed.as_secs_f64()
    );
}

/// Every task races for the same slots on one gate. Exactly one create per
/// slot may win.
async fn phase3_contended(engine: &BenchEngine) {
    let n_tasks = 50;
    let n_slots = 20;
    let won = Arc::new(AtomicUsize::new(0));
    let lost = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let mut handles = Vec::new();
    for task in 0..n_tasks {
        let engine = engine.clone();
        let won = won.clone();
        let lost = lost.clone();
        handles.push(tokio::spawn(async move {
            for s in 0..n_slots {
                match engine.create_assignment(slot("HOT1", task, s)).await {
                    Ok(_) => won.fetch_add(1, Ordering::Relaxed),
                    Err(EngineError::Conflict { .. }) => lost.fetch_add(1, Ordering::Relaxed),
                    Err(e) => panic!("contended create failed: {e}"),
                };
            }
        }));
    }
    for h in handles {
        let _ = h.await;
    }

    let won = won.load(Ordering::Relaxed);
    let lost = lost.load(Ordering::Relaxed);
    println!(
        "  {n_tasks} tasks x {n_slots} slots: {won} won, {lost} conflicts in {:.2}s",
        start.elapsed().as_secs_f64()
    );
    assert_eq!(won, n_slots as usize, "double booking under contention");
}

async fn phase4_read_under_load(engine: &BenchEngine) {
    for i in 0..200 {
        if let Err(e) = engine.create_assignment(slot("READ1", i, i as i64)).await {
            panic!("prefill {i} failed: {e}");
        }
    }

    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5 {
        let engine = engine.clone();
        let stop = stop.clone();
        writer_handles.push(tokio::spawn(async move {
            let gate = format!("BG{w}");
            let mut i = 0i64;
            while !stop.load(Ordering::Relaxed) && i < 24 * 365 {
                let _ = engine.create_assignment(slot(&gate, w, i)).await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 500;
    let mut reader_handles = Vec::new();
    for r in 0..n_readers {
        let engine = engine.clone();
        reader_handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for k in 0..reads_per_reader {
                let now = BASE + ((r * reads_per_reader + k) as i64 % 200) * HOUR + HOUR / 2;
                let t = Instant::now();
                if let Err(e) = engine.current_and_next("READ1", now).await {
                    panic!("current_and_next failed: {e}");
                }
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        if let Ok(latencies) = h.await {
            all_latencies.extend(latencies);
        }
    }
    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("current_and_next", &mut all_latencies);
}

#[tokio::main]
async fn main() {
    println!("=== gatesched stress benchmark ===\n");

    println!("[phase 1] sequential write throughput");
    phase1_sequential(&open_engine("sequential")).await;

    println!("\n[phase 2] concurrent write throughput");
    phase2_concurrent(&open_engine("concurrent")).await;

    println!("\n[phase 3] contended single gate");
    phase3_contended(&open_engine("contended")).await;

    println!("\n[phase 4] read latency under write load");
    phase4_read_under_load(&open_engine("reads")).await;

    println!("\n=== benchmark complete ===");
}
