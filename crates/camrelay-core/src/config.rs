use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// Intervals, ceilings and thresholds of the relay.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Page handed to the source resolver each cycle.
    pub page_ref: String,
    /// Fetch URL used when resolution fails.
    pub default_url: String,
    /// Caption label used with `default_url`.
    pub default_label: String,

    /// Sleep between successful cycles.
    pub cycle_interval: Duration,
    /// Sleep after a failed cycle.
    pub failure_backoff: Duration,
    /// Upper bound of every network call.
    pub call_timeout: Duration,

    /// Watchdog tick period.
    pub watchdog_period: Duration,
    /// Liveness older than this makes the watchdog replace the worker.
    pub staleness_ceiling: Duration,
    /// At most one restart notice per window.
    pub restart_notice_window: Duration,
    /// Remind the operator after being stopped this long, once per window.
    pub idle_reminder_ceiling: Duration,
    /// At most `restart_budget` replacements within `restart_budget_window`.
    pub restart_budget: usize,
    pub restart_budget_window: Duration,

    /// Resident memory that triggers a session recycle after a publish.
    pub memory_high_water: u64,
    /// Resident memory that triggers a one-shot watchdog warning.
    pub memory_critical: u64,
    /// Session age that triggers a recycle.
    pub session_max_age: Duration,

    pub heartbeat_interval: Duration,
    /// Whether cycle failures are also sent to the notifier.
    pub notify_cycle_failures: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            page_ref: String::new(),
            default_url: String::new(),
            default_label: "camera".to_string(),

            cycle_interval: Duration::from_secs(60),
            failure_backoff: Duration::from_secs(10),
            call_timeout: Duration::from_secs(10),

            watchdog_period: Duration::from_secs(15),
            staleness_ceiling: Duration::from_secs(180),
            restart_notice_window: Duration::from_secs(300),
            idle_reminder_ceiling: Duration::from_secs(600),
            restart_budget: 5,
            restart_budget_window: Duration::from_secs(600),

            memory_high_water: 300 * MIB,
            memory_critical: 500 * MIB,
            session_max_age: Duration::from_secs(3600),

            heartbeat_interval: Duration::from_secs(3600),
            notify_cycle_failures: false,
        }
    }
}

impl RelayConfig {
    /// Longest a healthy worker can go between liveness updates: the longer
    /// pause plus four bounded calls (resolve, fetch, publish, session reopen).
    ///
    /// A `staleness_ceiling` at or below this replaces healthy workers.
    pub fn max_cycle_gap(&self) -> Duration {
        self.cycle_interval.max(self.failure_backoff) + self.call_timeout * 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ceiling_clears_cycle_gap() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.max_cycle_gap(), Duration::from_secs(100));
        assert!(cfg.staleness_ceiling > cfg.max_cycle_gap());
    }

    #[test]
    fn long_cycle_outgrows_default_ceiling() {
        let cfg = RelayConfig {
            cycle_interval: Duration::from_secs(300),
            ..Default::default()
        };
        assert!(cfg.staleness_ceiling <= cfg.max_cycle_gap());
    }
}
