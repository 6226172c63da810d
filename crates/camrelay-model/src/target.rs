use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::error::TargetError;

/// Where a [`Target`] came from in the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetSource {
    /// Returned by the source resolver.
    Resolved,
    /// Configured default, used because resolution failed.
    Fallback,
    /// Pinned by an operator `setTarget` command.
    Override,
}

/// Resource to fetch in one cycle. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub fetch_url: String,
    /// Human readable name placed in the published caption.
    pub label: String,
    #[serde(with = "crate::epoch_ms")]
    pub resolved_at: SystemTime,
    pub source: TargetSource,
}

impl Target {
    pub fn new(fetch_url: impl Into<String>, label: impl Into<String>, source: TargetSource) -> Self {
        Self {
            fetch_url: fetch_url.into(),
            label: label.into(),
            resolved_at: SystemTime::now(),
            source,
        }
    }

    pub fn resolved(fetch_url: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(fetch_url, label, TargetSource::Resolved)
    }

    pub fn fallback(fetch_url: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(fetch_url, label, TargetSource::Fallback)
    }

    #[inline]
    pub fn is_fallback(&self) -> bool {
        self.source == TargetSource::Fallback
    }
}

/// Checks that an operator supplied URL is something the fetcher can use.
pub fn validate_fetch_url(url: &str) -> Result<(), TargetError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(TargetError::Empty);
    }
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| TargetError::UnsupportedScheme(url.to_string()))?;

    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() {
        return Err(TargetError::MissingHost(url.to_string()));
    }
    Ok(())
}
