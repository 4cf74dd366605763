use anyhow::{anyhow, Result};
use chrono::{Datelike, TimeZone};

/// Parses an IANA timezone name, e.g. `America/Buenos_Aires`.
pub fn parse_tz(tz: &str) -> Result<chrono_tz::Tz> {
    tz.parse().map_err(|_| anyhow!("invalid tz: {tz}"))
}

/// Returns YYYY-MM-DD for a unix-millis timestamp in the given timezone.
///
/// Timestamps chrono can't represent fall back to the epoch day.
pub fn day_key_at(tz: &chrono_tz::Tz, timestamp_ms: i64) -> String {
    let dt = chrono::Utc
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .unwrap_or_default()
        .with_timezone(tz);
    format!("{:04}-{:02}-{:02}", dt.year(), dt.month(), dt.day())
}
