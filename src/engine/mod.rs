mod conflict;
mod error;
pub mod lifecycle;
mod mutations;
mod queries;

pub use conflict::{conflicts, find_conflict};
pub use error::EngineError;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, broadcast};

use crate::clock::{Clock, SystemClock};
use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability;
use crate::store::{AssignmentStore, StoreError};

/// Engine-facing settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on any single store call.
    pub store_timeout: Duration,
    /// Identity stamped into `assigned_by` / `created_by` when a request leaves them blank.
    pub system_user: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
            system_user: "system".into(),
        }
    }
}

/// Gate-assignment scheduler over an injected store.
///
/// Every write to a gate runs its read-check-write sequence under that
/// gate's mutex, so two overlapping requests for one gate cannot both pass
/// the conflict check. Reads take no locks.
pub struct Engine<S: AssignmentStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    notify: Arc<NotifyHub>,
    /// Lazily populated, never shrinks: one entry per gate ever written.
    gate_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<S: AssignmentStore> Engine<S> {
    pub fn new(store: Arc<S>, notify: Arc<NotifyHub>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            config: EngineConfig::default(),
            notify,
            gate_locks: DashMap::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Changes committed to `gate` from now on.
    pub fn subscribe(&self, gate: &str) -> broadcast::Receiver<Change> {
        self.notify.subscribe(gate)
    }

    pub fn gate_lock_count(&self) -> usize {
        self.gate_locks.len()
    }

    pub(super) fn now(&self) -> Ms {
        self.clock.now_ms()
    }

    /// Acquire the write lock for `gate`, creating it on first use.
    pub(super) async fn lock_gate(&self, gate: &str) -> OwnedMutexGuard<()> {
        let lock = match self.gate_locks.get(gate) {
            Some(entry) => entry.value().clone(),
            None => {
                let lock = self
                    .gate_locks
                    .entry(gate.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .value()
                    .clone();
                metrics::gauge!(observability::GATE_LOCKS).set(self.gate_locks.len() as f64);
                lock
            }
        };
        lock.lock_owned().await
    }

    /// Run a store call under the configured deadline.
    pub(super) async fn store_call<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, EngineError> {
        match tokio::time::timeout(self.config.store_timeout, call).await {
            Ok(result) => result.map_err(EngineError::from),
            Err(_) => Err(StoreError::Timeout.into()),
        }
    }

    /// Load `id` and check it belongs to `gate`. A mismatch is reported as
    /// `NotFound`, never silently followed.
    pub(super) async fn resolve_owned(
        &self,
        gate: &str,
        id: AssignmentId,
    ) -> Result<Assignment, EngineError> {
        let existing = self
            .store_call(self.store.find_by_id(id))
            .await?
            .ok_or(EngineError::NotFound(id))?;
        if existing.gate != gate {
            tracing::warn!(%id, gate, owner = %existing.gate, "assignment does not belong to gate");
            return Err(EngineError::NotFound(id));
        }
        Ok(existing)
    }

    /// Run a store write to completion on its own task, holding the gate's
    /// guard until the store answers.
    ///
    /// The caller may time out or be dropped while the write is in flight;
    /// the gate stays locked until the outcome is known, so no other write
    /// can pass a conflict check that misses it.
    pub(super) async fn store_write<T, F>(
        &self,
        guard: OwnedMutexGuard<()>,
        write: F,
    ) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, EngineError>> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let result = write.await;
            drop(guard);
            result
        });
        match tokio::time::timeout(self.config.store_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(EngineError::StoreUnavailable(format!("store write failed: {e}"))),
            Err(_) => Err(StoreError::Timeout.into()),
        }
    }

    /// Save, then publish the change to gate subscribers.
    pub(super) async fn persist_and_notify(
        &self,
        guard: OwnedMutexGuard<()>,
        record: Assignment,
        created: bool,
    ) -> Result<Assignment, EngineError> {
        let store = self.store.clone();
        let notify = self.notify.clone();
        self.store_write(guard, async move {
            let stored = store.save(record).await?;
            let change = if created {
                Change::Created(stored.clone())
            } else {
                Change::Updated(stored.clone())
            };
            notify.send(&stored.gate, change);
            Ok(stored)
        })
        .await
    }

    /// Hard-delete `id` from `gate`, then publish the removal.
    pub(super) async fn remove_and_notify(
        &self,
        guard: OwnedMutexGuard<()>,
        gate: &str,
        id: AssignmentId,
    ) -> Result<(), EngineError> {
        let store = self.store.clone();
        let notify = self.notify.clone();
        let gate = gate.to_string();
        self.store_write(guard, async move {
            if !store.delete_by_id(id).await? {
                return Err(EngineError::NotFound(id));
            }
            notify.send(&gate, Change::Deleted { gate: gate.clone(), id });
            Ok(())
        })
        .await
    }
}

/// Record RED metrics for one engine call.
pub(super) fn observe<T>(operation: &'static str, started: Instant, result: &Result<T, EngineError>) {
    metrics::counter!(
        observability::OPERATIONS_TOTAL,
        "operation" => operation,
        "status" => observability::status_label(result)
    )
    .increment(1);
    metrics::histogram!(observability::OPERATION_DURATION_SECONDS, "operation" => operation)
        .record(started.elapsed().as_secs_f64());
}
