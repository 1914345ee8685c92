use std::collections::BTreeMap;
use std::time::Instant;

use crate::model::*;
use crate::store::AssignmentStore;

use super::conflict::find_conflict;
use super::lifecycle::is_active;
use super::{Engine, EngineError, observe};

fn by_start(records: &mut [Assignment]) {
    records.sort_by_key(|a| (a.span.start, a.id));
}

/// Pick the one assignment occupying a gate. More than one means the
/// non-overlap invariant was broken underneath us; take the earliest created
/// and say so.
fn pick_current(gate: &str, mut active: Vec<Assignment>) -> Option<Assignment> {
    if active.len() > 1 {
        tracing::warn!(
            gate,
            count = active.len(),
            ids = ?active.iter().map(|a| a.id).collect::<Vec<_>>(),
            "multiple active assignments on one gate, store is inconsistent"
        );
    }
    active.sort_by_key(|a| (a.created_at.unwrap_or(Ms::MAX), a.id));
    active.into_iter().next()
}

/// Current and next assignment on one gate's records at `now`.
pub fn current_and_next_of(gate: &str, records: Vec<Assignment>, now: Ms) -> CurrentAndNext {
    let mut active = Vec::new();
    let mut next: Option<Assignment> = None;
    for a in records.into_iter().filter(|a| !a.cancelled) {
        if is_active(&a, now) {
            active.push(a);
        } else if a.span.start > now
            && next
                .as_ref()
                .is_none_or(|n| (a.span.start, a.id) < (n.span.start, n.id))
        {
            next = Some(a);
        }
    }
    CurrentAndNext {
        current: pick_current(gate, active),
        next,
    }
}

impl<S: AssignmentStore> Engine<S> {
    /// Every assignment on a gate, cancelled ones included, by start time.
    pub async fn assignments_for_gate(&self, gate: &str) -> Result<Vec<Assignment>, EngineError> {
        let started = Instant::now();
        let result = self
            .store_call(self.store().find_by_gate(gate))
            .await
            .map(|mut records| {
                by_start(&mut records);
                records
            });
        observe("assignments_for_gate", started, &result);
        result
    }

    /// What occupies `gate` at `now`, and what arrives there next.
    pub async fn current_and_next(&self, gate: &str, now: Ms) -> Result<CurrentAndNext, EngineError> {
        let started = Instant::now();
        let result = self
            .store_call(self.store().find_by_gate(gate))
            .await
            .map(|records| current_and_next_of(gate, records, now));
        observe("current_and_next", started, &result);
        tracing::debug!(gate, now, "current/next computed");
        result
    }

    /// Gate → assignment occupying it at `now`, for every occupied gate.
    pub async fn all_current(&self, now: Ms) -> Result<BTreeMap<String, Assignment>, EngineError> {
        let started = Instant::now();
        let result = self.store_call(self.store().find_all()).await.map(|records| {
            let mut by_gate: BTreeMap<String, Vec<Assignment>> = BTreeMap::new();
            for a in records.into_iter().filter(|a| is_active(a, now)) {
                by_gate.entry(a.gate.clone()).or_default().push(a);
            }
            by_gate
                .into_iter()
                .filter_map(|(gate, active)| pick_current(&gate, active).map(|a| (gate, a)))
                .collect()
        });
        observe("all_current", started, &result);
        result
    }

    pub async fn assignments_for_flight(&self, flight: &str) -> Result<Vec<Assignment>, EngineError> {
        let mut records: Vec<Assignment> = self
            .store_call(self.store().find_all())
            .await?
            .into_iter()
            .filter(|a| a.flight == flight)
            .collect();
        by_start(&mut records);
        Ok(records)
    }

    pub async fn assignments_by_status(
        &self,
        status: AssignmentStatus,
    ) -> Result<Vec<Assignment>, EngineError> {
        let mut records: Vec<Assignment> = self
            .store_call(self.store().find_all())
            .await?
            .into_iter()
            .filter(|a| a.status == status)
            .collect();
        by_start(&mut records);
        Ok(records)
    }

    /// Live assignments starting after `now`, across all gates.
    pub async fn upcoming(&self, now: Ms) -> Result<Vec<Assignment>, EngineError> {
        let mut records: Vec<Assignment> = self
            .store_call(self.store().find_all())
            .await?
            .into_iter()
            .filter(|a| !a.cancelled && a.span.start > now)
            .collect();
        by_start(&mut records);
        Ok(records)
    }

    /// Would `candidate` collide with a live assignment on its gate? Checks
    /// without writing or locking; `candidate.id`, when set, is excluded.
    pub async fn has_conflict(&self, candidate: &Assignment) -> Result<bool, EngineError> {
        let on_gate = self
            .store_call(self.store().find_by_gate(&candidate.gate))
            .await?;
        Ok(find_conflict(candidate, &on_gate, candidate.id).is_some())
    }

    pub fn is_current(&self, assignment: &Assignment, now: Ms) -> bool {
        is_active(assignment, now)
    }

    pub async fn stats(&self) -> Result<AssignmentStats, EngineError> {
        let records = self.store_call(self.store().find_all()).await?;
        let mut stats = AssignmentStats {
            total: records.len(),
            ..Default::default()
        };
        for a in records {
            *stats.by_status.entry(a.status).or_default() += 1;
            *stats.by_gate.entry(a.gate).or_default() += 1;
        }
        Ok(stats)
    }
}
