//! Discord webhook notifications.
//!
//! Each alarm trigger becomes one message carrying a single embed. Discord
//! answers a successful webhook execution with `204 No Content`; anything
//! else is treated as a failed delivery.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use reqwest::{StatusCode, Url};
use serde::Serialize;
use tracing::debug;

const TITLE: &str = "Alert Triggered :camera_with_flash:";
const COLOR_RED: u32 = 16711680;
const FOOTER_TEXT: &str = "Unifi Protect";
const FOOTER_ICON_URL: &str =
    "https://pbs.twimg.com/profile_images/1610157462321254402/tMCv8T-y_400x400.png";

/// Most of an error response body we keep for the logs.
const MAX_ERROR_BODY_BYTES: usize = 512;

// ── Payload ────────────────────────────────────────────────────────────────

/// Body of a webhook execution request.
#[derive(Serialize, Debug, Clone)]
pub struct Notification {
    embeds: Vec<Embed>,
}

#[derive(Serialize, Debug, Clone)]
pub struct Embed {
    pub title: String,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    pub footer: EmbedFooter,
    /// Time the notification was built, RFC 3339 UTC.
    pub timestamp: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Serialize, Debug, Clone)]
pub struct EmbedFooter {
    pub text: String,
    pub icon_url: String,
}

impl Notification {
    /// Build the alert embed for one trigger.
    ///
    /// `timestamp` is the already-formatted event time; the embed's own
    /// timestamp is always the current time.
    pub fn alert(trigger: &str, device: &str, timestamp: &str) -> Self {
        let field = |name: &str, value: &str, inline| EmbedField {
            name: name.to_string(),
            value: value.to_string(),
            inline,
        };

        Self {
            embeds: vec![Embed {
                title: TITLE.to_string(),
                color: COLOR_RED,
                fields: vec![
                    field("Trigger", trigger, true),
                    field("Device", device, true),
                    field("Timestamp", timestamp, false),
                ],
                footer: EmbedFooter {
                    text: FOOTER_TEXT.to_string(),
                    icon_url: FOOTER_ICON_URL.to_string(),
                },
                timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            }],
        }
    }
}

// ── Delivery ───────────────────────────────────────────────────────────────

/// Why a notification was not delivered.
#[derive(Debug)]
pub enum ForwardError {
    /// The webhook answered with something other than 204.
    Status { status: StatusCode, body: String },
    /// No usable response: connect failure, timeout, broken connection.
    Transport(reqwest::Error),
}

impl fmt::Display for ForwardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForwardError::Status { status, .. } => {
                write!(f, "webhook returned HTTP {}", status.as_u16())
            }
            ForwardError::Transport(e) if e.is_timeout() => write!(f, "webhook timed out: {e}"),
            ForwardError::Transport(e) => write!(f, "webhook request failed: {e}"),
        }
    }
}

impl std::error::Error for ForwardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ForwardError::Status { .. } => None,
            ForwardError::Transport(e) => Some(e),
        }
    }
}

/// Client for the configured Discord webhook.
#[derive(Clone)]
pub struct Webhook {
    url: Url,
    http: reqwest::Client,
}

impl Webhook {
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .context("build webhook HTTP client")?;
        Ok(Self { url, http })
    }

    /// Host part of the webhook URL. The full URL embeds the webhook token
    /// and must stay out of logs.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or("-")
    }

    /// POST one notification. Not retried.
    pub async fn send(&self, notification: &Notification) -> Result<(), ForwardError> {
        let response = self
            .http
            .post(self.url.clone())
            .json(notification)
            .send()
            .await
            .map_err(ForwardError::Transport)?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            debug!("Webhook accepted notification");
            return Ok(());
        }

        let body = read_error_body(response).await;
        Err(ForwardError::Status { status, body })
    }
}

/// Read at most `MAX_ERROR_BODY_BYTES` of a failed response.
async fn read_error_body(mut response: reqwest::Response) -> String {
    let mut buf = Vec::new();
    while buf.len() <= MAX_ERROR_BODY_BYTES {
        match response.chunk().await {
            Ok(Some(chunk)) => buf.extend_from_slice(&chunk),
            _ => break,
        }
    }

    let truncated = buf.len() > MAX_ERROR_BODY_BYTES;
    buf.truncate(MAX_ERROR_BODY_BYTES);
    let mut body = String::from_utf8_lossy(&buf).into_owned();
    if truncated {
        body.push_str("...");
    }
    body
}


#[cfg(test)]
mod tests {
    use super::stub::{self, Reply};
    use super::*;
    use serde_json::json;

    #[test]
    fn alert_embed_shape() {
        let n = Notification::alert("Motion", "Front Door", "2023-11-14 22:13:20 UTC");
        let mut v = serde_json::to_value(&n).unwrap();

        let embed = &mut v["embeds"][0];
        let sent_at = embed["timestamp"].take();
        assert_eq!(
            *embed,
            json!({
                "title": "Alert Triggered :camera_with_flash:",
                "color": 16711680,
                "fields": [
                    {"name": "Trigger", "value": "Motion", "inline": true},
                    {"name": "Device", "value": "Front Door", "inline": true},
                    {"name": "Timestamp", "value": "2023-11-14 22:13:20 UTC", "inline": false},
                ],
                "footer": {
                    "text": "Unifi Protect",
                    "icon_url": FOOTER_ICON_URL,
                },
                "timestamp": null,
            })
        );
        assert_eq!(v["embeds"].as_array().unwrap().len(), 1);

        let sent_at = chrono::DateTime::parse_from_rfc3339(sent_at.as_str().unwrap()).unwrap();
        let age = Utc::now().signed_duration_since(sent_at);
        assert!(age.num_seconds().abs() < 60, "sent_at too far from now: {sent_at}");
    }

    #[test]
    fn sent_at_ignores_event_time() {
        let n = Notification::alert("Motion", "AA:BB", "1999-01-01 00:00:00 UTC");
        assert!(n.embeds[0].timestamp.ends_with('Z'));
        assert!(!n.embeds[0].timestamp.starts_with("1999"));
    }

    #[test]
    fn host_hides_token() {
        let url = Url::parse("https://discord.com/api/webhooks/123/secret-token").unwrap();
        let webhook = Webhook::new(url, Duration::from_secs(1)).unwrap();
        assert_eq!(webhook.host(), "discord.com");
    }

    #[tokio::test]
    async fn unreachable_webhook_is_transport_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("http://{addr}/hook")).unwrap();
        let webhook = Webhook::new(url, Duration::from_secs(2)).unwrap();
        let err = webhook
            .send(&Notification::alert("Motion", "AA:BB", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::Transport(_)), "{err}");
    }

    #[tokio::test]
    async fn accepts_204() {
        let (url, received) = stub::spawn(Reply::status(StatusCode::NO_CONTENT)).await;
        let webhook = Webhook::new(url, Duration::from_secs(2)).unwrap();
        webhook
            .send(&Notification::alert("Motion", "AA:BB", "x"))
            .await
            .unwrap();
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn plain_200_counts_as_failure() {
        let (url, _received) = stub::spawn(Reply::status(StatusCode::OK)).await;
        let webhook = Webhook::new(url, Duration::from_secs(2)).unwrap();
        let err = webhook
            .send(&Notification::alert("Motion", "AA:BB", "x"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ForwardError::Status { status, .. } if status == StatusCode::OK),
            "{err}"
        );
    }

    #[tokio::test]
    async fn slow_webhook_times_out() {
        let reply = Reply::status(StatusCode::NO_CONTENT).delay(Duration::from_secs(5));
        let (url, received) = stub::spawn(reply).await;
        let webhook = Webhook::new(url, Duration::from_secs(1)).unwrap();

        let started = std::time::Instant::now();
        let err = webhook
            .send(&Notification::alert("Motion", "AA:BB", "x"))
            .await
            .unwrap_err();

        assert!(
            matches!(&err, ForwardError::Transport(e) if e.is_timeout()),
            "{err}"
        );
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn error_body_is_capped() {
        let reply = Reply::status(StatusCode::INTERNAL_SERVER_ERROR).body("x".repeat(10_000));
        let (url, _received) = stub::spawn(reply).await;
        let webhook = Webhook::new(url, Duration::from_secs(2)).unwrap();

        match webhook
            .send(&Notification::alert("Motion", "AA:BB", "x"))
            .await
        {
            Err(ForwardError::Status { status, body }) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body.len(), MAX_ERROR_BODY_BYTES + 3);
                assert!(body.ends_with("..."));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn short_error_body_is_kept() {
        let reply = Reply::status(StatusCode::BAD_REQUEST).body(r#"{"message":"Invalid Form Body"}"#);
        let (url, _received) = stub::spawn(reply).await;
        let webhook = Webhook::new(url, Duration::from_secs(2)).unwrap();

        let err = webhook
            .send(&Notification::alert("Motion", "AA:BB", "x"))
            .await
            .unwrap_err();
        match err {
            ForwardError::Status { body, .. } => {
                assert_eq!(body, r#"{"message":"Invalid Form Body"}"#)
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }
}
