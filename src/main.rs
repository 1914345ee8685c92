use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use gatesched::clock::{Clock, SystemClock};
use gatesched::config::Config;
use gatesched::engine::{Engine, EngineError};
use gatesched::model::{AssignmentStats, CurrentAndNext, Ms};
use gatesched::notify::NotifyHub;
use gatesched::store::{AssignmentStore, WalStore, run_compactor};

/// What the dashboard shows: every gate with history, its current and next
/// assignment, and overall counts.
#[derive(Serialize)]
struct Snapshot {
    at: Ms,
    gates: BTreeMap<String, CurrentAndNext>,
    stats: AssignmentStats,
}

async fn snapshot<S: AssignmentStore>(engine: &Engine<S>, now: Ms) -> Result<Snapshot, EngineError> {
    let stats = engine.stats().await?;
    let mut gates = BTreeMap::new();
    for gate in stats.by_gate.keys() {
        gates.insert(gate.clone(), engine.current_and_next(gate, now).await?);
    }
    Ok(Snapshot {
        at: now,
        gates,
        stats,
    })
}

async fn print_snapshot<S: AssignmentStore>(engine: &Engine<S>) -> Result<(), Box<dyn std::error::Error>> {
    let snap = snapshot(engine, SystemClock.now_ms()).await?;
    println!("{}", serde_json::to_string_pretty(&snap)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    gatesched::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(WalStore::open(&config.wal_path())?);
    let engine = Engine::new(store.clone(), Arc::new(NotifyHub::new()))
        .with_config(config.engine_config());

    let follow = std::env::args().skip(1).any(|a| a == "--follow");
    info!("gatesched opened {}", config.wal_path().display());
    info!("  store_timeout: {:?}", config.store_timeout);
    info!("  compact_threshold: {}", config.compact_threshold);
    info!("  mode: {}", if follow { "follow" } else { "snapshot" });

    if !follow {
        return print_snapshot(&engine).await;
    }

    tokio::spawn(run_compactor(store, config.compact_threshold));

    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!("SIGTERM handler unavailable: {e}");
                    ctrl_c.await.ok();
                }
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    let mut refresh = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = refresh.tick() => {
                if let Err(e) = print_snapshot(&engine).await {
                    tracing::error!("snapshot failed: {e}");
                }
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    info!("gatesched stopped");
    Ok(())
}
