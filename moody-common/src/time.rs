//! Timestamp utilities

use chrono::{DateTime, TimeZone, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current time as milliseconds since the Unix epoch (storage format)
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert stored epoch milliseconds back into a timestamp
pub fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
