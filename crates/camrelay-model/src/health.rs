use serde::{Deserialize, Serialize};

use crate::WorkerPhase;

/// Answer to a liveness/health query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Persisted operator intent.
    pub running: bool,
    /// Whether a worker instance is currently executing.
    pub worker_active: bool,
    /// Milliseconds since the liveness mark was last touched.
    pub last_liveness_age_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub phase: WorkerPhase,
    /// Replacement workers started by the watchdog since boot.
    pub restarts: u64,
    /// Fetch URL used by the most recent cycle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}
