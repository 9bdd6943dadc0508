//! Date helpers shared by spec parsing, templating and query generation.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::error::ParseError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse `YYYY-MM-DD` into a UTC midnight timestamp.
pub fn parse_date(key: &str, value: &str) -> Result<DateTime<Utc>, ParseError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
        .ok_or_else(|| ParseError::InvalidDate {
            key: key.to_string(),
            value: value.to_string(),
        })
}

pub fn format_date(date: &DateTime<Utc>) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Truncate a timestamp to midnight UTC.
pub fn start_of_day(date: &DateTime<Utc>) -> DateTime<Utc> {
    let naive = date.date_naive().and_hms_opt(0, 0, 0).unwrap_or_default();
    Utc.from_utc_datetime(&naive)
}

pub fn from_unix_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

pub fn from_unix_seconds(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}
