use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: engine operations. Labels: operation, status.
pub const OPERATIONS_TOTAL: &str = "gatesched_operations_total";

/// Histogram: engine operation latency in seconds. Labels: operation.
pub const OPERATION_DURATION_SECONDS: &str = "gatesched_operation_duration_seconds";

/// Counter: writes rejected because of an overlapping assignment.
pub const CONFLICTS_TOTAL: &str = "gatesched_conflicts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: entries in the per-gate lock registry.
pub const GATE_LOCKS: &str = "gatesched_gate_locks";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "gatesched_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (records per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "gatesched_wal_flush_batch_size";

/// Install the Prometheus exporter on `port`. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for an engine error, used as the `status` metric label.
pub fn status_label<T>(result: &Result<T, crate::engine::EngineError>) -> &'static str {
    use crate::engine::EngineError;
    match result {
        Ok(_) => "ok",
        Err(EngineError::InvalidInput(_)) => "invalid_input",
        Err(EngineError::Conflict { .. }) => "conflict",
        Err(EngineError::NotFound(_)) => "not_found",
        Err(EngineError::InvalidTransition { .. }) => "invalid_transition",
        Err(EngineError::StoreUnavailable(_)) => "store_unavailable",
    }
}
