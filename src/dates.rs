use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;

/// All date bucketing happens in a fixed UTC+4 business timezone, regardless
/// of any offset carried by the source data.
pub const BUSINESS_UTC_OFFSET_HOURS: i64 = 4;

// ---------------------------------------------------------------------------
// Flexible parsing
// ---------------------------------------------------------------------------

/// Parse a calendar date out of an untrusted value. Strings first try their
/// leading 10 characters as ISO `YYYY-MM-DD`, then a small set of slash
/// formats. `DD/MM/YYYY` is tried before `MM/DD/YYYY`; the precedence is
/// ambiguous when both components are <= 12 and is kept as-is because
/// upstream sources depend on it.
pub fn parse_flexible_date(value: &Value) -> Option<NaiveDate> {
    let Value::String(raw) = value else {
        return None;
    };
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    let head = text.get(..10).unwrap_or(text);
    for format in ["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(head, format) {
            return Some(date);
        }
    }
    None
}

/// A datetime parsed from source data, keeping track of whether the original
/// text carried a zone offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParsedDateTime {
    Zoned(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

const DATETIME_PATTERNS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%d/%m/%Y %I:%M%p",
    "%d/%m/%Y %H:%M",
    "%m/%d/%Y %I:%M%p",
    "%m/%d/%Y %H:%M",
];

const DATE_PATTERNS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%m/%d/%Y"];

/// Parse a datetime, preserving time-of-day and zone offset when present.
/// A trailing `Z` means UTC. ISO8601/RFC3339 is tried first, then a fixed
/// ordered pattern list; the first successful pattern wins and no pattern is
/// retried. Bare dates parse to midnight.
pub fn parse_flexible_datetime(value: &Value) -> Option<ParsedDateTime> {
    let Value::String(raw) = value else {
        return None;
    };
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    let iso_candidate = match text.strip_suffix('Z') {
        Some(stripped) => format!("{stripped}+00:00"),
        None => text.to_string(),
    };
    if let Ok(zoned) = DateTime::parse_from_rfc3339(&iso_candidate) {
        return Some(ParsedDateTime::Zoned(zoned));
    }

    for format in DATETIME_PATTERNS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(ParsedDateTime::Naive(naive));
        }
    }
    for format in DATE_PATTERNS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(ParsedDateTime::Naive(date.and_time(NaiveTime::MIN)));
        }
    }
    None
}

/// Resolve a value to the calendar date it falls on in the business timezone.
/// Zone-aware datetimes are converted to UTC first; naive ones are taken as
/// already UTC. When datetime parsing fails entirely, falls back to a plain
/// date parse with no shift applied.
pub fn to_business_date(value: &Value) -> Option<NaiveDate> {
    let shift = Duration::hours(BUSINESS_UTC_OFFSET_HOURS);
    match parse_flexible_datetime(value) {
        Some(ParsedDateTime::Zoned(zoned)) => {
            Some((zoned.with_timezone(&Utc).naive_utc() + shift).date())
        }
        Some(ParsedDateTime::Naive(naive)) => Some((naive + shift).date()),
        None => parse_flexible_date(value),
    }
}
