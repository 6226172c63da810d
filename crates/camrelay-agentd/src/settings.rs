use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use camrelay_core::RelayConfig;
use camrelay_model::validate_fetch_url;
use thiserror::Error;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{var} is required")]
    Missing { var: &'static str },
    #[error("{var}='{value}' is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Agent settings, read from `CAMRELAY_*` variables.
#[derive(Debug, Clone)]
pub struct Settings {
    pub listen: SocketAddr,
    pub state_file: PathBuf,
    /// Variable consulted for an explicit running/stopped override.
    pub run_override_var: String,
    /// Webhook base URL. Without it notifications only go to the log.
    pub webhook: Option<String>,
    /// URL handed out by the fixed resolver; defaults to the fallback URL.
    pub target_url: String,
    pub target_label: String,
    pub reply_timeout: Duration,
    pub log_format: Option<String>,
    pub log_level: Option<String>,
    pub relay: RelayConfig,
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);
        let mut relay = RelayConfig::default();

        relay.default_url = env.required("CAMRELAY_DEFAULT_URL")?;
        if let Err(e) = validate_fetch_url(&relay.default_url) {
            return Err(SettingsError::Invalid {
                var: "CAMRELAY_DEFAULT_URL",
                value: relay.default_url,
                reason: e.to_string(),
            });
        }
        if let Some(label) = env.text("CAMRELAY_DEFAULT_LABEL") {
            relay.default_label = label;
        }
        relay.page_ref = env.text("CAMRELAY_PAGE").unwrap_or_default();

        relay.cycle_interval = env.secs("CAMRELAY_CYCLE_SECS", relay.cycle_interval)?;
        relay.failure_backoff = env.secs("CAMRELAY_BACKOFF_SECS", relay.failure_backoff)?;
        relay.call_timeout = env.secs("CAMRELAY_TIMEOUT_SECS", relay.call_timeout)?;
        relay.watchdog_period = env.secs("CAMRELAY_WATCHDOG_SECS", relay.watchdog_period)?;
        relay.staleness_ceiling = env.secs("CAMRELAY_STALE_SECS", relay.staleness_ceiling)?;
        relay.restart_notice_window =
            env.secs("CAMRELAY_RESTART_NOTICE_SECS", relay.restart_notice_window)?;
        relay.idle_reminder_ceiling = env.secs("CAMRELAY_IDLE_REMINDER_SECS", relay.idle_reminder_ceiling)?;
        relay.heartbeat_interval = env.secs("CAMRELAY_HEARTBEAT_SECS", relay.heartbeat_interval)?;
        relay.session_max_age = env.secs("CAMRELAY_SESSION_MAX_AGE_SECS", relay.session_max_age)?;
        relay.restart_budget = env.parse("CAMRELAY_RESTART_BUDGET", relay.restart_budget)?;
        relay.memory_high_water = env.mebibytes("CAMRELAY_MEMORY_HIGH_MB", relay.memory_high_water)?;
        relay.memory_critical = env.mebibytes("CAMRELAY_MEMORY_CRITICAL_MB", relay.memory_critical)?;
        relay.notify_cycle_failures = env.flag("CAMRELAY_NOTIFY_FAILURES", relay.notify_cycle_failures)?;

        if relay.memory_critical < relay.memory_high_water {
            return Err(SettingsError::Invalid {
                var: "CAMRELAY_MEMORY_CRITICAL_MB",
                value: (relay.memory_critical / MIB).to_string(),
                reason: "must not be below CAMRELAY_MEMORY_HIGH_MB".to_string(),
            });
        }

        let gap = relay.max_cycle_gap();
        if relay.staleness_ceiling <= gap {
            return Err(SettingsError::Invalid {
                var: "CAMRELAY_STALE_SECS",
                value: relay.staleness_ceiling.as_secs().to_string(),
                reason: format!(
                    "must exceed {}s (longest pause plus four call timeouts)",
                    gap.as_secs()
                ),
            });
        }

        let target_url = env.text("CAMRELAY_TARGET_URL").unwrap_or_else(|| relay.default_url.clone());
        if let Err(e) = validate_fetch_url(&target_url) {
            return Err(SettingsError::Invalid {
                var: "CAMRELAY_TARGET_URL",
                value: target_url,
                reason: e.to_string(),
            });
        }

        Ok(Self {
            listen: env.parse("CAMRELAY_LISTEN", SocketAddr::from(([127, 0, 0, 1], 8080)))?,
            state_file: env
                .text("CAMRELAY_STATE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("camrelay-state.json")),
            run_override_var: env
                .text("CAMRELAY_RUN_OVERRIDE_VAR")
                .unwrap_or_else(|| "CAMRELAY_RUNNING".to_string()),
            webhook: env.text("CAMRELAY_WEBHOOK"),
            target_label: env
                .text("CAMRELAY_TARGET_LABEL")
                .unwrap_or_else(|| relay.default_label.clone()),
            target_url,
            reply_timeout: Duration::from_millis(env.parse("CAMRELAY_REPLY_TIMEOUT_MS", 2_000u64)?),
            log_format: env.text("CAMRELAY_LOG_FORMAT"),
            log_level: env.text("CAMRELAY_LOG").or_else(|| env.text("RUST_LOG")),
            relay,
        })
    }
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Trimmed value; empty counts as unset.
    fn text(&self, var: &str) -> Option<String> {
        (self.0)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, var: &'static str) -> Result<String, SettingsError> {
        self.text(var).ok_or(SettingsError::Missing { var })
    }

    fn parse<T>(&self, var: &'static str, default: T) -> Result<T, SettingsError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.text(var) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| SettingsError::Invalid {
                var,
                reason: e.to_string(),
                value,
            }),
        }
    }

    fn secs(&self, var: &'static str, default: Duration) -> Result<Duration, SettingsError> {
        let secs: u64 = self.parse(var, default.as_secs())?;
        if secs == 0 {
            return Err(SettingsError::Invalid {
                var,
                value: "0".to_string(),
                reason: "must be at least one second".to_string(),
            });
        }
        Ok(Duration::from_secs(secs))
    }

    /// Megabytes in `var`, returned as bytes. `default` is in bytes.
    fn mebibytes(&self, var: &'static str, default: u64) -> Result<u64, SettingsError> {
        let mb: u64 = self.parse(var, default / MIB)?;
        mb.checked_mul(MIB).ok_or_else(|| SettingsError::Invalid {
            var,
            value: mb.to_string(),
            reason: "too large".to_string(),
        })
    }

    fn flag(&self, var: &'static str, default: bool) -> Result<bool, SettingsError> {
        match self.text(var).map(|v| v.to_ascii_lowercase()) {
            None => Ok(default),
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
            Some(value) => Err(SettingsError::Invalid {
                var,
                value,
                reason: "expected a boolean".to_string(),
            }),
        }
    }
}
