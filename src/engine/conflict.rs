use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Do two assignments collide on the timeline?
///
/// Cancelled assignments never collide. An empty or inverted span collides
/// with everything live, so a malformed record blocks rather than slips in.
/// Gates are not compared; callers only pass records from one gate.
pub fn conflicts(a: &Assignment, b: &Assignment) -> bool {
    if a.cancelled || b.cancelled {
        return false;
    }
    if !a.span.is_valid() || !b.span.is_valid() {
        return true;
    }
    a.span.overlaps(&b.span)
}

/// First live assignment in `existing` that collides with `candidate`,
/// skipping `exclude` (the record being updated).
pub fn find_conflict<'a>(
    candidate: &Assignment,
    existing: &'a [Assignment],
    exclude: Option<AssignmentId>,
) -> Option<&'a Assignment> {
    existing
        .iter()
        .filter(|other| exclude.is_none() || other.id != exclude)
        .find(|other| conflicts(candidate, other))
}

pub(crate) fn validate_key(key: &str, what: &'static str) -> Result<(), EngineError> {
    if key.trim().is_empty() {
        return Err(EngineError::InvalidInput(what));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(EngineError::InvalidInput("key too long"));
    }
    Ok(())
}

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if !span.is_valid() {
        return Err(EngineError::InvalidInput("start must precede end"));
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::InvalidInput("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::InvalidInput("span too wide"));
    }
    Ok(())
}

pub(crate) fn validate_audit(value: &str) -> Result<(), EngineError> {
    if value.len() > MAX_AUDIT_LEN {
        return Err(EngineError::InvalidInput("audit field too long"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = 3_600_000;
    const BASE: Ms = 1_767_225_600_000; // 2026-01-01T00:00:00Z

    fn at(id: u64, start: Ms, end: Ms) -> Assignment {
        Assignment {
            id: Some(AssignmentId(id)),
            gate: "T1G1".into(),
            flight: format!("FL{id}"),
            span: Span { start, end },
            status: AssignmentStatus::Scheduled,
            cancelled: false,
            assigned_by: "system".into(),
            created_by: "system".into(),
            created_at: None,
            updated_at: None,
        }
    }

    fn cancelled(mut a: Assignment) -> Assignment {
        a.cancelled = true;
        a.status = AssignmentStatus::Cancelled;
        a
    }

    #[test]
    fn overlapping_intervals_conflict_both_ways() {
        let a = at(1, 10 * H, 12 * H);
        let b = at(2, 11 * H, 13 * H);
        assert!(conflicts(&a, &b));
        assert!(conflicts(&b, &a));
    }

    #[test]
    fn touching_endpoints_do_not_conflict() {
        let a = at(1, 11 * H, 12 * H);
        let b = at(2, 12 * H, 13 * H);
        assert!(!conflicts(&a, &b));
        assert!(!conflicts(&b, &a));
    }

    #[test]
    fn identical_and_nested_intervals_conflict() {
        let a = at(1, 10 * H, 12 * H);
        assert!(conflicts(&a, &at(2, 10 * H, 12 * H)));
        assert!(conflicts(&a, &at(3, 10 * H + 1, 11 * H)));
    }

    #[test]
    fn cancelled_never_conflicts() {
        let a = at(1, 10 * H, 12 * H);
        let b = cancelled(at(2, 10 * H, 12 * H));
        assert!(!conflicts(&a, &b));
        assert!(!conflicts(&b, &a));
    }

    #[test]
    fn malformed_span_blocks() {
        let good = at(1, 10 * H, 12 * H);
        let empty = at(2, 20 * H, 20 * H);
        let inverted = at(3, 30 * H, 29 * H);
        assert!(conflicts(&good, &empty));
        assert!(conflicts(&inverted, &good));
        // ...unless the malformed record is cancelled.
        assert!(!conflicts(&good, &cancelled(inverted)));
    }

    #[test]
    fn find_conflict_skips_excluded_record() {
        let existing = vec![at(1, 9 * H, 10 * H), at(2, 11 * H, 13 * H)];
        let mut moved = at(2, 11 * H + 30 * 60_000, 13 * H);

        assert_eq!(find_conflict(&moved, &existing, None).map(|a| a.id), Some(Some(AssignmentId(2))));
        assert!(find_conflict(&moved, &existing, Some(AssignmentId(2))).is_none());

        moved.span = Span::new(9 * H + 30 * 60_000, 12 * H);
        assert_eq!(
            find_conflict(&moved, &existing, Some(AssignmentId(2))).map(|a| a.id),
            Some(Some(AssignmentId(1)))
        );
    }

    #[test]
    fn validate_span_rules() {
        assert!(validate_span(&Span::new(BASE, BASE + H)).is_ok());
        assert!(matches!(
            validate_span(&Span { start: BASE, end: BASE }),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(
            validate_span(&Span::new(0, H)),
            Err(EngineError::InvalidInput("timestamp out of range"))
        ));
        assert!(matches!(
            validate_span(&Span::new(BASE, BASE + MAX_SPAN_DURATION_MS + 1)),
            Err(EngineError::InvalidInput("span too wide"))
        ));
    }

    #[test]
    fn validate_key_rules() {
        assert!(validate_key("T1G1", "gate is required").is_ok());
        assert_eq!(
            validate_key("  ", "gate is required"),
            Err(EngineError::InvalidInput("gate is required"))
        );
        assert_eq!(
            validate_key(&"x".repeat(MAX_KEY_LEN + 1), "gate is required"),
            Err(EngineError::InvalidInput("key too long"))
        );
    }
}
