//! Pagination defaults and clamping for list endpoints and tracker searches.

/// Default page size for request history.
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;

/// Maximum page size for request history.
pub const MAX_HISTORY_LIMIT: i64 = 200;

/// Default number of candidates requested from the tracker.
pub const DEFAULT_SEARCH_LIMIT: i64 = 10;

/// Maximum number of candidates requested from the tracker.
pub const MAX_SEARCH_LIMIT: i64 = 100;

/// Clamp a user-provided limit to valid bounds.
pub fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).max(1).min(max)
}

/// Clamp a user-provided offset to non-negative.
pub fn clamp_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}
