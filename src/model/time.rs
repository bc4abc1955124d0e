//! Timestamp parsing and canonical conversions
//!
//! Accepted textual formats:
//! - RFC 3339 (`2024-01-05T10:00:00Z`, `2024-01-05T10:00:00+02:00`)
//! - `%Y-%m-%d %H:%M:%S,%f` and `%Y-%m-%d %H:%M:%S.%f`
//! - `%Y-%m-%d %H:%M:%S` / `%Y-%m-%dT%H:%M:%S`
//! - `%Y-%m-%d %H:%M`
//! - `%Y-%m-%d` (midnight)
//!
//! Naive inputs are interpreted as UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::errors::{TimelineError, TimelineResult};

/// Timestamp type used for every validity bound
pub type Timestamp = DateTime<Utc>;

const NAIVE_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parses an absolute date/time token.
///
/// # Errors
///
/// Returns `TL_FORMAT_INVALID` when no supported format matches.
pub fn parse_timestamp(text: &str) -> TimelineResult<Timestamp> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(TimelineError::format("empty date"));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    // `,` is accepted as the fractional-second separator
    let dotted = trimmed.replacen(',', ".", 1);
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&dotted, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    Err(TimelineError::format(format!(
        "date {} is not in a supported format",
        text
    )))
}

/// Converts epoch seconds (possibly fractional) to a timestamp.
pub fn from_epoch_seconds(seconds: f64) -> TimelineResult<Timestamp> {
    if !seconds.is_finite() {
        return Err(TimelineError::format(format!(
            "epoch value {} is not finite",
            seconds
        )));
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1_000_000_000.0).round() as u32;
    let (whole, nanos) = if nanos >= 1_000_000_000 {
        (whole as i64 + 1, 0)
    } else {
        (whole as i64, nanos)
    };
    Utc.timestamp_opt(whole, nanos)
        .single()
        .ok_or_else(|| TimelineError::format(format!("epoch value {} out of range", seconds)))
}

/// Canonical epoch-microsecond representation used for hashing.
#[inline]
pub fn to_epoch_micros(ts: &Timestamp) -> i64 {
    ts.timestamp_micros()
}

/// Sentinel ordering key for an open `end`.
#[inline]
pub fn open_end() -> Timestamp {
    DateTime::<Utc>::MAX_UTC
}
