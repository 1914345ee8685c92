use std::time::Instant;

use tracing::{info, warn};

use crate::model::*;
use crate::observability;
use crate::store::AssignmentStore;

use super::conflict::{find_conflict, validate_audit, validate_key, validate_span};
use super::lifecycle::{self, check_transition};
use super::{Engine, EngineError, observe};

/// `None` for a missing or whitespace-only value.
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn conflict_with(other: &Assignment) -> EngineError {
    metrics::counter!(observability::CONFLICTS_TOTAL).increment(1);
    EngineError::Conflict {
        with: other.id.unwrap_or_default(),
    }
}

impl<S: AssignmentStore> Engine<S> {
    /// Book a gate for a flight. Fails with `Conflict`, writing nothing, if
    /// the interval overlaps a live assignment on that gate.
    pub async fn create_assignment(
        &self,
        request: AssignmentRequest,
    ) -> Result<Assignment, EngineError> {
        let started = Instant::now();
        let result = self.create_inner(request).await;
        observe("create_assignment", started, &result);
        result
    }

    async fn create_inner(&self, request: AssignmentRequest) -> Result<Assignment, EngineError> {
        validate_key(&request.gate, "gate is required")?;
        validate_key(&request.flight, "flight is required")?;
        let span = Span {
            start: request.start,
            end: request.end,
        };
        validate_span(&span)?;
        let status = request.status.unwrap_or(AssignmentStatus::Scheduled);
        if status.is_terminal() {
            return Err(EngineError::InvalidInput("new assignment cannot start in a terminal state"));
        }
        let system = &self.config().system_user;
        let assigned_by = non_blank(request.assigned_by).unwrap_or_else(|| system.clone());
        let created_by = non_blank(request.created_by).unwrap_or_else(|| system.clone());
        validate_audit(&assigned_by)?;
        validate_audit(&created_by)?;

        let mut candidate = Assignment {
            id: None,
            gate: request.gate,
            flight: request.flight,
            span,
            status,
            cancelled: false,
            assigned_by,
            created_by,
            created_at: None,
            updated_at: None,
        };

        let guard = self.lock_gate(&candidate.gate).await;
        let existing = self.store_call(self.store().find_by_gate(&candidate.gate)).await?;
        if let Some(other) = find_conflict(&candidate, &existing, None) {
            warn!(
                gate = %candidate.gate,
                flight = %candidate.flight,
                with = ?other.id,
                "time conflict, assignment rejected"
            );
            return Err(conflict_with(other));
        }

        lifecycle::initialize_timestamps(&mut candidate, self.now());
        let stored = self.persist_and_notify(guard, candidate, true).await?;
        info!(id = ?stored.id, gate = %stored.gate, flight = %stored.flight, "assignment created");
        Ok(stored)
    }

    /// Replace an assignment's mutable fields. `created_at`/`created_by` are
    /// kept from the stored record; the gate cannot change.
    pub async fn update_assignment(
        &self,
        gate: &str,
        id: AssignmentId,
        updated: Assignment,
    ) -> Result<Assignment, EngineError> {
        let started = Instant::now();
        let result = self.update_inner(gate, id, updated).await;
        observe("update_assignment", started, &result);
        result
    }

    async fn update_inner(
        &self,
        gate: &str,
        id: AssignmentId,
        updated: Assignment,
    ) -> Result<Assignment, EngineError> {
        let guard = self.lock_gate(gate).await;
        let existing = self.resolve_owned(gate, id).await?;

        if updated.gate != gate {
            return Err(EngineError::InvalidInput("gate cannot change; cancel and create instead"));
        }
        if updated.id.is_some_and(|uid| uid != id) {
            return Err(EngineError::InvalidInput("assignment id is immutable"));
        }
        validate_key(&updated.flight, "flight is required")?;
        validate_span(&updated.span)?;
        if updated.status != existing.status {
            check_transition(existing.status, updated.status)?;
        }
        let assigned_by = non_blank(Some(updated.assigned_by)).unwrap_or(existing.assigned_by);
        validate_audit(&assigned_by)?;

        let candidate = Assignment {
            id: Some(id),
            gate: existing.gate,
            flight: updated.flight,
            span: updated.span,
            status: updated.status,
            cancelled: updated.status == AssignmentStatus::Cancelled,
            assigned_by,
            created_by: existing.created_by,
            created_at: existing.created_at,
            updated_at: Some(self.now()),
        };

        let on_gate = self.store_call(self.store().find_by_gate(gate)).await?;
        if let Some(other) = find_conflict(&candidate, &on_gate, Some(id)) {
            warn!(%id, gate, with = ?other.id, "time conflict, update rejected");
            return Err(conflict_with(other));
        }

        let stored = self.persist_and_notify(guard, candidate, false).await?;
        info!(%id, gate, "assignment updated");
        Ok(stored)
    }

    /// Administrative hard delete. Normal cancellation goes through
    /// [`Engine::cancel_assignment`] and keeps the record.
    pub async fn delete_assignment(&self, gate: &str, id: AssignmentId) -> Result<(), EngineError> {
        let started = Instant::now();
        let result = self.delete_inner(gate, id).await;
        observe("delete_assignment", started, &result);
        result
    }

    async fn delete_inner(&self, gate: &str, id: AssignmentId) -> Result<(), EngineError> {
        let guard = self.lock_gate(gate).await;
        self.resolve_owned(gate, id).await?;
        self.remove_and_notify(guard, gate, id).await?;
        info!(%id, gate, "assignment deleted");
        Ok(())
    }

    /// Apply `mutation` to a stored assignment and persist it.
    ///
    /// The identifier, gate and audit creation fields are fixed. A status
    /// change must be a legal transition, and a changed interval is checked
    /// for conflicts like any other write.
    pub async fn update_assignment_field<F>(
        &self,
        gate: &str,
        id: AssignmentId,
        mutation: F,
    ) -> Result<Assignment, EngineError>
    where
        F: FnOnce(&mut Assignment) + Send,
    {
        let started = Instant::now();
        let result = self.update_field_inner(gate, id, mutation).await;
        observe("update_assignment_field", started, &result);
        result
    }

    async fn update_field_inner<F>(
        &self,
        gate: &str,
        id: AssignmentId,
        mutation: F,
    ) -> Result<Assignment, EngineError>
    where
        F: FnOnce(&mut Assignment) + Send,
    {
        let guard = self.lock_gate(gate).await;
        let existing = self.resolve_owned(gate, id).await?;

        let mut record = existing.clone();
        mutation(&mut record);

        if record.id != existing.id {
            return Err(EngineError::InvalidInput("assignment id is immutable"));
        }
        if record.gate != existing.gate {
            return Err(EngineError::InvalidInput("gate cannot change; cancel and create instead"));
        }
        validate_key(&record.flight, "flight is required")?;
        validate_audit(&record.assigned_by)?;

        if record.status != existing.status {
            check_transition(existing.status, record.status)?;
        }
        // The flag follows status; touching it on its own is ambiguous.
        let derived = record.status == AssignmentStatus::Cancelled;
        if record.cancelled != existing.cancelled && record.cancelled != derived {
            return Err(EngineError::InvalidInput("set status to cancel an assignment"));
        }
        record.cancelled = derived;

        record.created_at = existing.created_at;
        record.created_by = existing.created_by.clone();
        record.updated_at = Some(self.now());

        if record.span != existing.span {
            validate_span(&record.span)?;
            let on_gate = self.store_call(self.store().find_by_gate(gate)).await?;
            if let Some(other) = find_conflict(&record, &on_gate, Some(id)) {
                warn!(%id, gate, with = ?other.id, "time conflict, field update rejected");
                return Err(conflict_with(other));
            }
        }

        let stored = self.persist_and_notify(guard, record, false).await?;
        tracing::debug!(%id, gate, "assignment field updated");
        Ok(stored)
    }

    /// Drive an assignment through the status state machine.
    /// Cancelling an already cancelled assignment succeeds without a write.
    pub async fn update_status(
        &self,
        gate: &str,
        id: AssignmentId,
        status: AssignmentStatus,
    ) -> Result<Assignment, EngineError> {
        let started = Instant::now();
        let result = self.update_status_inner(gate, id, status).await;
        observe("update_status", started, &result);
        result
    }

    async fn update_status_inner(
        &self,
        gate: &str,
        id: AssignmentId,
        status: AssignmentStatus,
    ) -> Result<Assignment, EngineError> {
        let guard = self.lock_gate(gate).await;
        let mut record = self.resolve_owned(gate, id).await?;
        let from = record.status;
        if !lifecycle::update_status(&mut record, status, self.now())? {
            return Ok(record);
        }
        let stored = self.persist_and_notify(guard, record, false).await?;
        info!(%id, gate, %from, to = %status, "assignment status changed");
        Ok(stored)
    }

    pub async fn cancel_assignment(
        &self,
        gate: &str,
        id: AssignmentId,
    ) -> Result<Assignment, EngineError> {
        self.update_status(gate, id, AssignmentStatus::Cancelled).await
    }
}
