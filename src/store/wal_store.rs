use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::info;

use crate::limits::WAL_CHANNEL_CAPACITY;
use crate::model::{Assignment, AssignmentId, Record};
use crate::observability;
use crate::wal::Wal;

use super::{AssignmentStore, MemoryStore, StoreError};

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        record: Record,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        response: oneshot::Sender<io::Result<usize>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type Pending = (Record, oneshot::Sender<io::Result<()>>);

/// Owns the log and the in-memory state, and batches appends:
/// 1. Block until the first Append arrives.
/// 2. Drain every Append already queued behind it.
/// 3. One flush_sync for the whole batch, apply it to `state`, then answer
///    every sender.
///
/// A record that reaches the channel is logged and applied whether or not
/// its sender is still waiting, so memory never lags the log.
async fn wal_writer_loop(mut wal: Wal, state: Arc<MemoryStore>, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { record, response } = cmd else {
            handle_non_append(&mut wal, &state, cmd);
            continue;
        };

        let mut batch = vec![(record, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { record, response }) => batch.push((record, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let started = Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        if result.is_ok() {
            for (record, _) in &batch {
                state.apply(record);
            }
        }
        respond_batch(batch, &result);

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, &state, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[Pending]) -> io::Result<()> {
    let mut append_err = None;
    for (record, _) in batch {
        if let Err(e) = wal.append_buffered(record) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after a failed append so half-buffered bytes don't leak
    // into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn respond_batch(batch: Vec<Pending>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

/// Checkpoint of `state`: the id watermark, then one `Saved` per live record.
fn checkpoint(state: &MemoryStore) -> Vec<Record> {
    let mut records = vec![Record::Watermark {
        next_id: state.next_id(),
    }];
    records.extend(state.snapshot().into_iter().map(Record::Saved));
    records
}

fn handle_non_append(wal: &mut Wal, state: &MemoryStore, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { response } => {
            // Every earlier append is already flushed and applied, so the
            // snapshot matches the log being replaced.
            let records = checkpoint(state);
            let live = records.len() - 1;
            let result = Wal::write_compact_file(wal.path(), &records)
                .and_then(|()| wal.swap_compact_file())
                .map(|()| live);
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

fn writer_gone() -> StoreError {
    StoreError::Unavailable("WAL writer shut down".into())
}

fn response_dropped() -> StoreError {
    StoreError::Unavailable("WAL writer dropped response".into())
}

/// [`MemoryStore`] made durable by a write-ahead log.
///
/// Every write is appended and fsynced before it becomes visible to readers.
/// Only the writer task mutates the state.
pub struct WalStore {
    state: Arc<MemoryStore>,
    wal_tx: mpsc::Sender<WalCommand>,
    path: PathBuf,
}

impl WalStore {
    /// Replay the log at `path` and start its writer task. Must run inside a
    /// tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let records = Wal::replay(path)?;
        let wal = Wal::open(path)?;

        let state = Arc::new(MemoryStore::new());
        for record in &records {
            state.apply(record);
        }
        info!(
            path = %path.display(),
            replayed = records.len(),
            assignments = state.len(),
            "assignment log opened"
        );

        let (wal_tx, wal_rx) = mpsc::channel(WAL_CHANNEL_CAPACITY);
        tokio::spawn(wal_writer_loop(wal, state.clone(), wal_rx));

        Ok(Self {
            state,
            wal_tx,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Log `record`; the writer applies it to memory once it is durable.
    async fn commit(&self, record: Record) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                record,
                response: tx,
            })
            .await
            .map_err(|_| writer_gone())?;
        rx.await
            .map_err(|_| response_dropped())?
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    /// Rewrite the log as a watermark plus one `Saved` per live record.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { response: tx })
            .await
            .map_err(|_| writer_gone())?;
        let live = rx
            .await
            .map_err(|_| response_dropped())?
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        info!(path = %self.path.display(), live, "assignment log compacted");
        Ok(())
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl AssignmentStore for WalStore {
    async fn find_all(&self) -> Result<Vec<Assignment>, StoreError> {
        Ok(self.state.snapshot())
    }

    async fn find_by_gate(&self, gate: &str) -> Result<Vec<Assignment>, StoreError> {
        Ok(self.state.gate_records(gate))
    }

    async fn find_by_id(&self, id: AssignmentId) -> Result<Option<Assignment>, StoreError> {
        Ok(self.state.get(id))
    }

    async fn save(&self, mut assignment: Assignment) -> Result<Assignment, StoreError> {
        if assignment.id.is_none() {
            assignment.id = Some(self.state.allocate_id());
        }
        self.commit(Record::Saved(assignment.clone())).await?;
        Ok(assignment)
    }

    async fn delete_by_id(&self, id: AssignmentId) -> Result<bool, StoreError> {
        if self.state.get(id).is_none() {
            return Ok(false);
        }
        self.commit(Record::Deleted { id }).await?;
        Ok(true)
    }
}

/// Periodically compact the log once enough appends have piled up.
pub async fn run_compactor(store: Arc<WalStore>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        let appends = store.appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        if let Err(e) = store.compact().await {
            tracing::warn!("compaction of {} failed: {e}", store.path().display());
        }
    }
}
