//! Rendering of the alarm's epoch-millisecond timestamp.
//!
//! Protect sends `timestamp` as milliseconds since the epoch at the top level
//! of the event. It is optional, and we never fail a request over it: a value
//! we can't interpret becomes a placeholder string in the notification.

use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use serde_json::Value;

/// Outcome of interpreting the inbound `timestamp` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTime {
    At(DateTime<Utc>),
    Missing,
    Invalid,
}

impl EventTime {
    /// Interpret a raw JSON `timestamp` value (milliseconds since the epoch).
    ///
    /// Absent and "empty" values (null, false, 0, "", [], {}) count as
    /// missing. Whole seconds are taken with floor division.
    pub fn from_millis(raw: Option<&Value>) -> Self {
        let value = match raw {
            Some(v) if !is_empty(v) => v,
            _ => return EventTime::Missing,
        };

        let seconds = match value {
            Value::Bool(true) => Some(0),
            Value::Number(n) => {
                if let Some(ms) = n.as_i64() {
                    Some(ms.div_euclid(1000))
                } else if let Some(ms) = n.as_u64() {
                    i64::try_from(ms / 1000).ok()
                } else {
                    n.as_f64().and_then(float_seconds)
                }
            }
            _ => None,
        };

        match seconds.and_then(|s| DateTime::from_timestamp(s, 0)) {
            Some(at) if (1..=9999).contains(&at.year()) => EventTime::At(at),
            _ => EventTime::Invalid,
        }
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTime::At(at) => write!(f, "{}", at.format("%Y-%m-%d %H:%M:%S UTC")),
            EventTime::Missing => f.write_str("No timestamp available"),
            EventTime::Invalid => f.write_str("Invalid timestamp"),
        }
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => true,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn float_seconds(ms: f64) -> Option<i64> {
    let secs = (ms / 1000.0).floor();
    // i64 bounds are far outside the representable calendar range anyway.
    if secs.is_finite() && secs.abs() < 1e15 {
        Some(secs as i64)
    } else {
        None
    }
}
