//! Redaction of credentials in provider request logs

use reqwest::header::HeaderMap;
use serde_json::Value;

pub const REDACTED: &str = "[REDACTED]";

/// Keys whose values never reach a log line (case-insensitive)
const SENSITIVE_KEYS: [&str; 4] = ["authorization", "code", "access_token", "refresh_token"];

pub fn is_sensitive(key: &str) -> bool {
    SENSITIVE_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
}

/// Render key/value pairs (query params or form fields) with secrets masked
pub fn sanitize_pairs(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| {
            if is_sensitive(key) {
                format!("{}={}", key, REDACTED)
            } else {
                format!("{}={}", key, value)
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Header names with sensitive values masked
pub fn sanitize_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            if is_sensitive(name.as_str()) {
                format!("{}: {}", name, REDACTED)
            } else {
                format!("{}: {}", name, value.to_str().unwrap_or("<binary>"))
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Deep copy of a JSON body with sensitive object keys masked
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, v)| {
                    if is_sensitive(key) {
                        (key.clone(), Value::String(REDACTED.to_string()))
                    } else {
                        (key.clone(), sanitize_json(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_json).collect()),
        other => other.clone(),
    }
}
