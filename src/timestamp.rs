//! Timestamp parsing and formatting at the API boundary
//!
//! Inbound timestamps are ISO-8601. A trailing `Z` is normalised to `+00:00`
//! before parsing and timestamps without an offset are taken as UTC. Offsets
//! may be written `+09:00`, `+0900` or `+09`. Digit-only input is a basic
//! `YYYYMMDD` date when it has eight digits and Unix seconds when it has
//! nine or more.

use crate::error::ValidationError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

/// `%#z` accepts `+09:00`, `+0900` and `+09`
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M%#z",
    "%Y-%m-%d %H:%M:%S%.f%#z",
];

/// Shorter digit strings are too easily a mistyped date
const MIN_UNIX_SECONDS_DIGITS: usize = 9;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Parse a caller-supplied timestamp into UTC
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidTimestamp(input.to_string()));
    }

    let normalized = match trimmed.strip_suffix(['Z', 'z']) {
        Some(stripped) => format!("{}+00:00", stripped),
        None => trimmed.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
        && let Some(midnight) = date.and_hms_opt(0, 0, 0)
    {
        return Ok(midnight.and_utc());
    }

    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        if trimmed.len() == 8 {
            return parse_basic_date(trimmed)
                .ok_or_else(|| ValidationError::InvalidTimestamp(input.to_string()));
        }
        if trimmed.len() >= MIN_UNIX_SECONDS_DIGITS
            && let Ok(secs) = trimmed.parse::<i64>()
            && let Some(dt) = DateTime::from_timestamp(secs, 0)
        {
            return Ok(dt);
        }
    }

    Err(ValidationError::InvalidTimestamp(input.to_string()))
}

/// `YYYYMMDD` at midnight UTC
fn parse_basic_date(digits: &str) -> Option<DateTime<Utc>> {
    let year = digits.get(0..4)?.parse().ok()?;
    let month = digits.get(4..6)?.parse().ok()?;
    let day = digits.get(6..8)?.parse().ok()?;
    let midnight = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)?;
    Some(midnight.and_utc())
}

/// Parse both ends of a window and reject `from > to`
pub fn parse_time_range(
    from: &str,
    to: &str,
) -> Result<(DateTime<Utc>, DateTime<Utc>), ValidationError> {
    let from = parse_timestamp(from)?;
    let to = parse_timestamp(to)?;
    check_time_range(from, to)?;
    Ok((from, to))
}

pub fn check_time_range(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<(), ValidationError> {
    if from > to {
        return Err(ValidationError::InvalidTimeRange {
            from: format_timestamp(from),
            to: format_timestamp(to),
        });
    }
    Ok(())
}

/// RFC 3339 in UTC with a `Z` suffix, as the provider expects
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
