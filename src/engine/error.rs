use crate::model::{AssignmentId, AssignmentStatus};
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Missing or malformed gate/flight key, or an empty/inverted interval.
    InvalidInput(&'static str),
    /// Overlaps an existing non-cancelled assignment on the same gate.
    Conflict { with: AssignmentId },
    /// No such assignment, or it belongs to a different gate.
    NotFound(AssignmentId),
    InvalidTransition {
        from: AssignmentStatus,
        to: AssignmentStatus,
    },
    StoreUnavailable(String),
}

impl EngineError {
    /// Only store failures may succeed on a plain retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::StoreUnavailable(_))
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::Conflict { with } => write!(f, "conflict with assignment: {with}"),
            EngineError::NotFound(id) => write!(f, "assignment not found: {id}"),
            EngineError::InvalidTransition { from, to } => {
                write!(f, "invalid status transition: {from} -> {to}")
            }
            EngineError::StoreUnavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(reason) => EngineError::StoreUnavailable(reason),
            StoreError::Timeout => EngineError::StoreUnavailable(e.to_string()),
        }
    }
}
