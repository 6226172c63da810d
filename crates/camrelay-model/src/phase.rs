use serde::{Deserialize, Serialize};

/// Observable state of the periodic worker.
///
/// ```text
/// Idle → Suspended → Fetching → Publishing → Sleeping ─┐
///          ▲                                           │
///          └───────────────────────────────────────────┘
/// any suspension point ─► Cancelled      running=false ─► Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkerPhase {
    /// No worker has run yet.
    #[default]
    Idle,
    /// Waiting for the run signal.
    Suspended,
    /// Resolving the fetch target.
    Fetching,
    /// Downloading and forwarding the resource.
    Publishing,
    /// Waiting for the next cycle (or backing off after a failure).
    Sleeping,
    /// Cancelled at a suspension point.
    Cancelled,
    /// Exited because the operator asked the relay to stop.
    Stopped,
}

impl WorkerPhase {
    /// Returns `true` once the worker has exited.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerPhase::Cancelled | WorkerPhase::Stopped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerPhase::Idle => "idle",
            WorkerPhase::Suspended => "suspended",
            WorkerPhase::Fetching => "fetching",
            WorkerPhase::Publishing => "publishing",
            WorkerPhase::Sleeping => "sleeping",
            WorkerPhase::Cancelled => "cancelled",
            WorkerPhase::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
