use std::sync::Mutex;

use camrelay_model::RunState;
use tracing::warn;

use crate::{error::StoreError, state::StateBackend};

/// In-memory layer, optionally seeded from an environment variable.
///
/// Placed first in the backend list it acts as an explicit override of the
/// file copy. Saves update the overlay so later loads in the same process agree.
#[derive(Debug)]
pub struct OverrideBackend {
    value: Mutex<Option<bool>>,
}

impl OverrideBackend {
    /// Seeds the overlay from `var` (`true|false|1|0|yes|no|on|off`).
    ///
    /// An unset or unparsable variable leaves the overlay empty.
    pub fn from_env(var: &str) -> Self {
        let value = match std::env::var(var) {
            Ok(raw) => {
                let parsed = parse_flag(&raw);
                if parsed.is_none() {
                    warn!(var, value = %raw, "ignoring unparsable run state override");
                }
                parsed
            }
            Err(_) => None,
        };
        Self::in_memory(value)
    }

    pub fn in_memory(initial: Option<bool>) -> Self {
        Self {
            value: Mutex::new(initial),
        }
    }
}

impl StateBackend for OverrideBackend {
    fn name(&self) -> &'static str {
        "override"
    }

    fn load(&self) -> Result<Option<RunState>, StoreError> {
        let value = *self.value.lock().unwrap_or_else(|e| e.into_inner());
        Ok(value.map(RunState::new))
    }

    fn save(&self, state: &RunState) -> Result<(), StoreError> {
        *self.value.lock().unwrap_or_else(|e| e.into_inner()) = Some(state.running);
        Ok(())
    }
}

pub(crate) fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
