//! Startup configuration.
//!
//! Read once from the environment (after `.env`, if present) and then shared
//! read-only with every request.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::Url;
use tracing::info;

use crate::devices::DeviceNames;

const DEFAULT_LISTEN_HOST: &str = "0.0.0.0";
const DEFAULT_LISTEN_PORT: u16 = 5000;
const DEFAULT_FORWARD_TIMEOUT_SECS: u64 = 5;
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub webhook_url: Url,
    pub device_names: DeviceNames,
    pub listen_host: String,
    pub listen_port: u16,
    pub forward_timeout: Duration,
    pub max_body_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_url = lookup("WEBHOOK_URL")
            .filter(|v| !v.trim().is_empty())
            .context("WEBHOOK_URL must be set")?;
        let webhook_url = parse_webhook_url(raw_url.trim())?;

        let mut device_names = DeviceNames::default();
        if let Some(path) = lookup("DEVICE_NAME_MAP_FILE").filter(|v| !v.trim().is_empty()) {
            let contents = std::fs::read_to_string(&path).with_context(|| format!("read {path}"))?;
            let from_file =
                DeviceNames::from_json(&contents).with_context(|| format!("parse {path}"))?;
            info!(path = %path, count = from_file.len(), "Loaded device names from file");
            device_names.extend(from_file);
        }
        if let Some(raw) = lookup("DEVICE_NAME_MAP") {
            device_names.extend(DeviceNames::from_json(&raw).context("parse DEVICE_NAME_MAP")?);
        }

        let listen_host = lookup("LISTEN_HOST")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LISTEN_HOST.to_string());
        let listen_port = parse_or(&lookup, "LISTEN_PORT", DEFAULT_LISTEN_PORT)?;

        let timeout_secs: u64 =
            parse_or(&lookup, "FORWARD_TIMEOUT_SECS", DEFAULT_FORWARD_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            bail!("FORWARD_TIMEOUT_SECS must be greater than zero");
        }
        let max_body_bytes = parse_or(&lookup, "MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES)?;

        Ok(Self {
            webhook_url,
            device_names,
            listen_host,
            listen_port,
            forward_timeout: Duration::from_secs(timeout_secs),
            max_body_bytes,
        })
    }
}

fn parse_webhook_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).context("WEBHOOK_URL is not a valid URL")?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("WEBHOOK_URL must be http or https, got {}", url.scheme());
    }
    Ok(url)
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .with_context(|| format!("invalid {key}: {v:?}")),
        _ => Ok(default),
    }
}
