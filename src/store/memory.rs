use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::model::{Assignment, AssignmentId, Record};

use super::{AssignmentStore, StoreError};

pub struct MemoryStore {
    records: DashMap<AssignmentId, Assignment>,
    /// Gate key → ids of every record on that gate, cancelled ones included.
    by_gate: DashMap<String, Vec<AssignmentId>>,
    next_id: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            by_gate: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // ── Id allocation ────────────────────────────────────────

    pub fn allocate_id(&self) -> AssignmentId {
        AssignmentId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    /// Never hand out an id below `next_id`.
    pub fn raise_watermark(&self, next_id: u64) {
        self.next_id.fetch_max(next_id, Ordering::SeqCst);
    }

    // ── Record index ─────────────────────────────────────────

    /// Insert or replace a record that already carries an id.
    pub fn put(&self, assignment: Assignment) {
        let Some(id) = assignment.id else { return };
        self.raise_watermark(id.0 + 1);

        if let Some(previous) = self.records.insert(id, assignment.clone()) {
            if previous.gate == assignment.gate {
                return;
            }
            self.unindex(&previous.gate, id);
        }
        self.by_gate.entry(assignment.gate).or_default().push(id);
    }

    pub fn remove(&self, id: AssignmentId) -> Option<Assignment> {
        let (_, removed) = self.records.remove(&id)?;
        self.unindex(&removed.gate, id);
        Some(removed)
    }

    pub fn get(&self, id: AssignmentId) -> Option<Assignment> {
        self.records.get(&id).map(|e| e.value().clone())
    }

    pub fn gate_records(&self, gate: &str) -> Vec<Assignment> {
        let ids = self
            .by_gate
            .get(gate)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        ids.into_iter().filter_map(|id| self.get(id)).collect()
    }

    /// All records ordered by id.
    pub fn snapshot(&self) -> Vec<Assignment> {
        let mut all: Vec<Assignment> = self.records.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|a| a.id);
        all
    }

    fn unindex(&self, gate: &str, id: AssignmentId) {
        if let Some(mut ids) = self.by_gate.get_mut(gate) {
            ids.retain(|i| *i != id);
        }
    }

    // ── Log application ──────────────────────────────────────

    pub fn apply(&self, record: &Record) {
        match record {
            Record::Saved(assignment) => self.put(assignment.clone()),
            Record::Deleted { id } => {
                self.remove(*id);
            }
            Record::Watermark { next_id } => self.raise_watermark(*next_id),
        }
    }
}

#[async_trait]
impl AssignmentStore for MemoryStore {
    async fn find_all(&self) -> Result<Vec<Assignment>, StoreError> {
        Ok(self.snapshot())
    }

    async fn find_by_gate(&self, gate: &str) -> Result<Vec<Assignment>, StoreError> {
        Ok(self.gate_records(gate))
    }

    async fn find_by_id(&self, id: AssignmentId) -> Result<Option<Assignment>, StoreError> {
        Ok(self.get(id))
    }

    async fn save(&self, mut assignment: Assignment) -> Result<Assignment, StoreError> {
        if assignment.id.is_none() {
            assignment.id = Some(self.allocate_id());
        }
        self.put(assignment.clone());
        Ok(assignment)
    }

    async fn delete_by_id(&self, id: AssignmentId) -> Result<bool, StoreError> {
        Ok(self.remove(id).is_some())
    }
}
