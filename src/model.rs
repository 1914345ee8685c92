use std::fmt;

use serde::{Deserialize, Serialize};

/// Unix milliseconds. The only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// `start < end`. Spans built through struct literals or deserialization
    /// may violate this, so callers check before trusting them.
    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// Store-assigned assignment identifier. Stores start counting at 1.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssignmentId(pub u64);

impl fmt::Display for AssignmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AssignmentStatus {
    Scheduled,
    InProgress,
    Active,
    Delayed,
    Completed,
    Cancelled,
}

impl AssignmentStatus {
    pub const ALL: [AssignmentStatus; 6] = [
        AssignmentStatus::Scheduled,
        AssignmentStatus::InProgress,
        AssignmentStatus::Active,
        AssignmentStatus::Delayed,
        AssignmentStatus::Completed,
        AssignmentStatus::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, AssignmentStatus::Completed | AssignmentStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentStatus::Scheduled => "SCHEDULED",
            AssignmentStatus::InProgress => "IN_PROGRESS",
            AssignmentStatus::Active => "ACTIVE",
            AssignmentStatus::Delayed => "DELAYED",
            AssignmentStatus::Completed => "COMPLETED",
            AssignmentStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operational state of a gate, as reported by gate master data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateStatus {
    Available,
    Occupied,
    Maintenance,
    Closed,
    Unknown,
}

/// A gate. The engine only ever uses `key`; the classification fields are
/// read by the compatibility check that runs before a request arrives here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gate {
    pub key: String,
    pub size: Option<String>,
    pub gate_type: Option<String>,
    pub features: Vec<String>,
    pub active: bool,
    pub status: GateStatus,
}

/// A time-bounded binding of a flight to a gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// `None` until the store has persisted the record.
    pub id: Option<AssignmentId>,
    pub gate: String,
    pub flight: String,
    pub span: Span,
    pub status: AssignmentStatus,
    pub cancelled: bool,
    pub assigned_by: String,
    pub created_by: String,
    pub created_at: Option<Ms>,
    pub updated_at: Option<Ms>,
}

impl Assignment {
    pub fn start(&self) -> Ms {
        self.span.start
    }

    pub fn end(&self) -> Ms {
        self.span.end
    }
}

/// Candidate for `Engine::create_assignment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRequest {
    pub gate: String,
    pub flight: String,
    pub start: Ms,
    pub end: Ms,
    pub status: Option<AssignmentStatus>,
    pub assigned_by: Option<String>,
    pub created_by: Option<String>,
}

impl AssignmentRequest {
    pub fn new(gate: impl Into<String>, flight: impl Into<String>, start: Ms, end: Ms) -> Self {
        Self {
            gate: gate.into(),
            flight: flight.into(),
            start,
            end,
            status: None,
            assigned_by: None,
            created_by: None,
        }
    }

    pub fn assigned_by(mut self, who: impl Into<String>) -> Self {
        self.assigned_by = Some(who.into());
        self
    }

    pub fn created_by(mut self, who: impl Into<String>) -> Self {
        self.created_by = Some(who.into());
        self
    }

    pub fn with_status(mut self, status: AssignmentStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// WAL record types. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    /// Full post-image of an inserted or updated assignment.
    Saved(Assignment),
    Deleted { id: AssignmentId },
    /// Lowest id the store may hand out next. Written at compaction so ids of
    /// deleted records are never reused after replay.
    Watermark { next_id: u64 },
}

/// Change published to gate subscribers after a write commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    Created(Assignment),
    Updated(Assignment),
    Deleted { gate: String, id: AssignmentId },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CurrentAndNext {
    pub current: Option<Assignment>,
    pub next: Option<Assignment>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssignmentStats {
    pub total: usize,
    pub by_status: std::collections::BTreeMap<AssignmentStatus, usize>,
    pub by_gate: std::collections::BTreeMap<String, usize>,
}
