use std::time::Duration;

use thiserror::Error;

/// Failure to obtain the resource from the remote source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("source answered with status {0}")]
    Status(u16),
    #[error("session unavailable: {0}")]
    Session(String),
}

/// Failure of the source resolver. Always replaced by the default target.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("lookup failed: {0}")]
    Lookup(String),
    #[error("no image reference found on '{0}'")]
    Missing(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notifier transport error: {0}")]
    Transport(String),
    #[error("notifier rejected the request with status {status}")]
    Rejected { status: u16 },
    #[error("notifier timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed state in {backend}: {reason}")]
    Malformed {
        backend: &'static str,
        reason: String,
    },
}

/// Failure of one fetch/publish cycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CycleError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("publish failed: {0}")]
    Publish(#[from] NotifyError),
    #[error("cycle cancelled")]
    Cancelled,
}

/// Terminal outcome of scheduled work.
///
/// `Cancelled` is a control signal, not a fault.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkError {
    #[error("work cancelled")]
    Cancelled,
    #[error("work failed: {0}")]
    Failed(String),
}

impl WorkError {
    pub fn fail(reason: impl Into<String>) -> Self {
        WorkError::Failed(reason.into())
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkError::Cancelled)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("worker context is gone; inbox closed")]
    Closed,
}

/// Errors of the supervision layer. Caught and logged per watchdog tick.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("session setup failed: {0}")]
    Session(#[from] FetchError),
    #[error("watchdog tick panicked: {0}")]
    TickPanicked(String),
}
