//! Assignment persistence.
//!
//! The engine only talks to [`AssignmentStore`]. [`MemoryStore`] keeps
//! records in process memory; [`WalStore`] adds a write-ahead log on top of
//! it so records survive restarts.

mod memory;
mod wal_store;

pub use memory::MemoryStore;
pub use wal_store::{WalStore, run_compactor};

use async_trait::async_trait;

use crate::model::{Assignment, AssignmentId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend could not serve the request (I/O failure, writer gone).
    Unavailable(String),
    /// The caller's deadline expired before the backend answered.
    Timeout,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable(reason) => write!(f, "store unavailable: {reason}"),
            StoreError::Timeout => write!(f, "store operation timed out"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Durable keyed storage of assignments.
///
/// Implementations must return every record they were handed back with
/// `id` set, and must never reuse an id.
#[async_trait]
pub trait AssignmentStore: Send + Sync + 'static {
    async fn find_all(&self) -> Result<Vec<Assignment>, StoreError>;

    async fn find_by_gate(&self, gate: &str) -> Result<Vec<Assignment>, StoreError>;

    async fn find_by_id(&self, id: AssignmentId) -> Result<Option<Assignment>, StoreError>;

    /// Insert when `assignment.id` is `None`, otherwise replace the stored record.
    async fn save(&self, assignment: Assignment) -> Result<Assignment, StoreError>;

    /// `false` when no record had this id.
    async fn delete_by_id(&self, id: AssignmentId) -> Result<bool, StoreError>;
}
