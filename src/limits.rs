use crate::model::Ms;

/// Longest accepted gate or flight key, in bytes.
pub const MAX_KEY_LEN: usize = 64;

/// Longest accepted `assigned_by` / `created_by` value, in bytes.
pub const MAX_AUDIT_LEN: usize = 128;

/// An assignment may not hold a gate longer than a week.
pub const MAX_SPAN_DURATION_MS: Ms = 7 * 24 * 3_600_000;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;

/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// Capacity of the WAL group-commit channel.
pub const WAL_CHANNEL_CAPACITY: usize = 4096;
