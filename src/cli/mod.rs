pub mod config;
pub mod run;

use chrono::{DateTime, TimeZone, Utc};

/// Parse `--start-timestamp`: RFC 3339, or seconds since the Unix epoch.
pub fn parse_start_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    let secs: f64 = raw
        .parse()
        .map_err(|_| format!("'{}' is neither RFC 3339 nor epoch seconds", raw))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("'{}' is not a valid epoch timestamp", raw));
    }

    let millis = (secs * 1000.0).round() as i64;
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| format!("'{}' is out of range", raw))
}
