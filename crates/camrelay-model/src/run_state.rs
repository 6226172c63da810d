use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Operator intent that must survive process restarts.
///
/// `running` is what the operator last asked for, not what the worker is
/// currently doing; the watchdog reconciles the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    /// Whether periodic publication should be active.
    pub running: bool,
    /// When this value was last written.
    #[serde(with = "crate::epoch_ms")]
    pub last_reconciled: SystemTime,
}

impl RunState {
    /// Creates a state stamped with the current time.
    pub fn new(running: bool) -> Self {
        Self {
            running,
            last_reconciled: SystemTime::now(),
        }
    }
}

impl Default for RunState {
    /// With nothing persisted the relay starts in the running state.
    fn default() -> Self {
        Self::new(true)
    }
}
