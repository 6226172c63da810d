//! Contracts of the external collaborators.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use camrelay_model::Target;
use tracing::{debug, info};

use crate::error::{FetchError, NotifyError, ResolveError};

/// Looks up the current fetch target from a reference page.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn resolve(&self, page_ref: &str) -> Result<Target, ResolveError>;
}

/// Outbound notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Forwards an image with its caption.
    async fn publish(&self, bytes: Vec<u8>, caption: &str) -> Result<(), NotifyError>;
    /// Sends a plain text message to the operator.
    async fn message(&self, text: &str) -> Result<(), NotifyError>;
}

/// Response of [`Session::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Fetched {
    #[inline]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Reusable connection resource.
#[async_trait]
pub trait Session: Send + Sync {
    async fn get(&self, url: &str) -> Result<Fetched, FetchError>;

    /// Releases the session. Called once it has been replaced.
    async fn close(&self) {}
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Arc<dyn Session>, FetchError>;
}

/// Resolver that always answers with one configured target.
#[derive(Debug, Clone)]
pub struct FixedResolver {
    url: String,
    label: String,
}

impl FixedResolver {
    pub fn new(url: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            label: label.into(),
        }
    }
}

#[async_trait]
impl SourceResolver for FixedResolver {
    async fn resolve(&self, _page_ref: &str) -> Result<Target, ResolveError> {
        if self.url.is_empty() {
            return Err(ResolveError::Missing("fixed resolver".to_string()));
        }
        Ok(Target::resolved(&self.url, &self.label))
    }
}

/// Notifier that only writes to the log. Used when no endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, bytes: Vec<u8>, caption: &str) -> Result<(), NotifyError> {
        info!(bytes = bytes.len(), caption, "publish (log only)");
        Ok(())
    }

    async fn message(&self, text: &str) -> Result<(), NotifyError> {
        info!(text, "operator message (log only)");
        Ok(())
    }
}

/// Sends `text` to the operator, swallowing failures.
///
/// Returns whether the message was delivered within `limit`.
pub async fn notify_best_effort(notifier: &dyn Notifier, text: &str, limit: Duration) -> bool {
    match tokio::time::timeout(limit, notifier.message(text)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(error = %e, "operator notification failed");
            false
        }
        Err(_) => {
            debug!(timeout = ?limit, "operator notification timed out");
            false
        }
    }
}
