//! Device identifier → display name mapping.
//!
//! Protect identifies cameras by MAC address. The map is loaded once from
//! configuration and only ever read afterwards.

use std::collections::HashMap;

use anyhow::{Context, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceNames {
    names: HashMap<String, String>,
}

impl DeviceNames {
    /// Parse a JSON object of `"device id": "display name"` pairs.
    ///
    /// Blank input yields an empty map. Duplicate keys are not an error: the
    /// last definition wins.
    pub fn from_json(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let names: HashMap<String, String> = serde_json::from_str(raw)
            .context("device name map must be a JSON object of string values")?;
        Ok(Self { names })
    }

    /// Add every entry from `other`, replacing existing names on conflict.
    pub fn extend(&mut self, other: DeviceNames) {
        self.names.extend(other.names);
    }

    /// Display name for `device`, or `device` itself when unmapped.
    pub fn resolve<'a>(&'a self, device: &'a str) -> &'a str {
        self.names.get(device).map(String::as_str).unwrap_or(device)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for DeviceNames
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            names: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
