//! Timestamp and date utilities

use chrono::{DateTime, NaiveDate, Utc};

/// Date formats accepted from provider payloads and curated files
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d", "%Y/%m/%d"];

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Leniently parse a provider date.
///
/// Accepts `2010-01-01`, `20100101`, `2010/01/01` and full RFC 3339
/// timestamps (the date part is kept). Anything else yields `None`; a bad
/// date never fails a record.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }

    DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|dt| dt.date_naive())
        .or_else(|| {
            // "2010-01-01T00:00:00" without offset
            trimmed
                .get(..10)
                .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        })
}
