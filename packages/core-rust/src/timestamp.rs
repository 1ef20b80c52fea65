//! Header timestamp parsing and formatting.
//!
//! The wire format is a space-separated date-time with optional millisecond
//! precision and optional UTC offset. Four formats are accepted in strict
//! fallback order; senders are expected to use the canonical zoned
//! millisecond form.

use chrono::{DateTime, Duration, Local, NaiveDateTime, Utc};

/// Human-readable name of the canonical wire format, used in error messages.
pub const CANONICAL_PATTERN: &str = "YYYY-MM-DD HH:MM:SS.mmm±HH:MM";

/// strftime pattern of the canonical wire format (zoned, millisecond precision).
pub const CANONICAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f%:z";

const ZONED_SECONDS: &str = "%Y-%m-%d %H:%M:%S%:z";
const LOCAL_MILLIS: &str = "%Y-%m-%d %H:%M:%S%.3f";
const LOCAL_SECONDS: &str = "%Y-%m-%d %H:%M:%S";

/// Parses a header timestamp, trying formats in strict fallback order:
/// zoned with milliseconds, zoned without, local with milliseconds, local
/// without. The first successful parse wins; local formats are interpreted
/// in the process's local time zone.
#[must_use]
pub fn parse(value: &str) -> Option<DateTime<Utc>> {
    for format in [CANONICAL_FORMAT, ZONED_SECONDS] {
        if let Ok(parsed) = DateTime::parse_from_str(value, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }
    for format in [LOCAL_MILLIS, LOCAL_SECONDS] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            // DST gaps have no local representation; treat those as unparseable.
            if let Some(local) = naive.and_local_timezone(Local).earliest() {
                return Some(local.with_timezone(&Utc));
            }
        }
    }
    None
}

/// Current wall-clock time in the canonical wire format.
#[must_use]
pub fn now_canonical() -> String {
    Local::now().format(CANONICAL_FORMAT).to_string()
}

/// Converts a wire duration (signed integer nanoseconds) into a `Duration`.
/// Negative values count as zero, i.e. "no expiry".
#[must_use]
pub fn duration_from_nanos(nanos: i64) -> Duration {
    Duration::nanoseconds(nanos.max(0))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
