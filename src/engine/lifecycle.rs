//! Assignment status state machine.
//!
//! ```text
//! SCHEDULED ──▶ IN_PROGRESS ──▶ ACTIVE ──▶ COMPLETED
//!   │  ▲            │              │
//!   ▼  │            │              │
//! DELAYED ──────────┘ (to IN_PROGRESS)
//!
//! any non-terminal ──▶ CANCELLED
//! ```
//!
//! COMPLETED and CANCELLED are terminal. `status` is the operationally
//! reported label; whether an assignment occupies its gate at an instant is
//! answered by [`is_active`] from the interval alone.

use crate::model::AssignmentStatus::{self, *};
use crate::model::{Assignment, Ms};

use super::EngineError;

pub fn can_transition(from: AssignmentStatus, to: AssignmentStatus) -> bool {
    matches!(
        (from, to),
        (Scheduled, InProgress | Delayed | Cancelled)
            | (Delayed, InProgress | Scheduled | Cancelled)
            | (InProgress, Active | Cancelled)
            | (Active, Completed | Cancelled)
    )
}

/// What applying `to` to a record in state `from` would do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Apply,
    /// Cancelling an already cancelled record.
    NoOp,
}

pub fn check_transition(
    from: AssignmentStatus,
    to: AssignmentStatus,
) -> Result<Transition, EngineError> {
    if from == Cancelled && to == Cancelled {
        return Ok(Transition::NoOp);
    }
    if can_transition(from, to) {
        Ok(Transition::Apply)
    } else {
        Err(EngineError::InvalidTransition { from, to })
    }
}

/// Move `assignment` to `to`, stamping `updated_at`. On error the record is
/// left untouched. Returns whether anything changed.
pub fn update_status(
    assignment: &mut Assignment,
    to: AssignmentStatus,
    now: Ms,
) -> Result<bool, EngineError> {
    match check_transition(assignment.status, to)? {
        Transition::NoOp => Ok(false),
        Transition::Apply => {
            assignment.status = to;
            assignment.updated_at = Some(now);
            if to == Cancelled {
                // Permanent: the record leaves conflict checks from here on.
                assignment.cancelled = true;
            }
            Ok(true)
        }
    }
}

/// Occupies its gate at `now`: not cancelled and `start <= now < end`.
pub fn is_active(assignment: &Assignment, now: Ms) -> bool {
    !assignment.cancelled && assignment.span.contains_instant(now)
}

pub fn initialize_timestamps(assignment: &mut Assignment, now: Ms) {
    if assignment.created_at.is_none() {
        assignment.created_at = Some(now);
    }
    assignment.updated_at = Some(now);
}
