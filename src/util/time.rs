//! Time helpers, mirroring `garage_util::time`'s `now_msec`-style API but
//! at microsecond resolution, since the precommit engine's `TimestampVersion`
//! (spec §4.3) and retention truncation (spec §4.4) both require it.

use chrono::{DateTime, Utc};

/// Current time, microsecond resolution, UTC.
pub fn now_micros() -> i64 {
	Utc::now().timestamp_micros()
}

/// Truncates a timestamp down to microsecond resolution, as required when
/// setting `retain_until` (spec §4.4: "truncation to microseconds").
pub fn truncate_to_micros(t: DateTime<Utc>) -> DateTime<Utc> {
	DateTime::from_timestamp_micros(t.timestamp_micros()).unwrap_or(t)
}

/// `now() + hours`, used for the default zombie-deletion deadline (+24h).
pub fn hours_from_now(hours: i64) -> DateTime<Utc> {
	Utc::now() + chrono::Duration::hours(hours)
}
