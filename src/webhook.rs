//! Webhook receiver for UniFi Protect alarm notifications.
//!
//! Protect's alarm manager POSTs a JSON event to `/data` whenever an alarm
//! fires. Every trigger in the alarm is relayed to Discord as its own
//! message. Delivery failures are logged and never change the response the
//! caller gets; only a malformed request does.

use std::borrow::Cow;

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::discord::{ForwardError, Notification};
use crate::timestamp::EventTime;
use crate::AppState;

const UNKNOWN_TRIGGER: &str = "Unknown trigger";
const UNKNOWN_DEVICE: &str = "Unknown device";

/// Top-level alarm event. Fields we don't use are ignored.
#[derive(Deserialize, Debug)]
struct AlarmEvent {
    alarm: Option<Alarm>,
    /// Epoch milliseconds. Kept raw so a bad value only degrades the
    /// rendered time instead of rejecting the event.
    timestamp: Option<Value>,
}

#[derive(Deserialize, Debug)]
struct Alarm {
    triggers: Option<Vec<Trigger>>,
}

/// One trigger. `key` and `device` are normally strings; any other value is
/// relayed as its JSON text rather than failing the whole alarm.
#[derive(Deserialize, Debug)]
struct Trigger {
    key: Option<Value>,
    device: Option<Value>,
}

impl Trigger {
    fn key(&self) -> Cow<'_, str> {
        label(self.key.as_ref(), UNKNOWN_TRIGGER)
    }

    fn device(&self) -> Cow<'_, str> {
        label(self.device.as_ref(), UNKNOWN_DEVICE)
    }
}

fn label<'a>(value: Option<&'a Value>, default: &'static str) -> Cow<'a, str> {
    match value {
        None | Some(Value::Null) => Cow::Borrowed(default),
        Some(Value::String(s)) => Cow::Borrowed(s.as_str()),
        Some(other) => Cow::Owned(other.to_string()),
    }
}

/// Reasons a request is refused before anything is forwarded.
#[derive(Debug, PartialEq, Eq)]
enum Rejection {
    NotJson,
    InvalidStructure,
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let message = match self {
            Rejection::NotJson => "Request must be JSON",
            Rejection::InvalidStructure => "Invalid JSON structure",
        };
        warn!(reason = message, "Rejected alarm request");
        (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/data", post(handle_alarm))
}

/// `application/json` or any `application/*+json`, parameters ignored.
fn is_json(headers: &HeaderMap) -> bool {
    let Some(mime) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let mime = mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

fn parse_event(body: &[u8]) -> Result<(Alarm, Option<Value>), Rejection> {
    let value: Value = serde_json::from_slice(body).map_err(|_| Rejection::NotJson)?;
    if !value.is_object() {
        return Err(Rejection::InvalidStructure);
    }

    let event: AlarmEvent =
        serde_json::from_value(value).map_err(|_| Rejection::InvalidStructure)?;
    let alarm = event.alarm.ok_or(Rejection::InvalidStructure)?;
    Ok((alarm, event.timestamp))
}

async fn handle_alarm(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, Rejection> {
    if !is_json(&headers) {
        return Err(Rejection::NotJson);
    }
    let (alarm, timestamp) = parse_event(&body)?;

    let timestamp = EventTime::from_millis(timestamp.as_ref()).to_string();
    let triggers = alarm.triggers.unwrap_or_default();
    debug!(
        triggers = triggers.len(),
        timestamp = %timestamp,
        "Alarm received"
    );

    for trigger in &triggers {
        let key = trigger.key();
        let device_id = trigger.device();
        let device = state.device_names.resolve(&device_id);
        let notification = Notification::alert(&key, device, &timestamp);

        match state.webhook.send(&notification).await {
            Ok(()) => {
                debug!(trigger = %key, device, "Alert posted to Discord");
            }
            Err(ForwardError::Status { status, body }) => {
                warn!(
                    trigger = %key,
                    device,
                    status = %status,
                    body = %body,
                    "Failed to post alert to Discord"
                );
            }
            Err(e) => {
                error!(trigger = %key, device, "Failed to post alert to Discord: {e}");
            }
        }
    }

    Ok(Json(json!({ "message": "JSON received and posted to Discord" })))
}
