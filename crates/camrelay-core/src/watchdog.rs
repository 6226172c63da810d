use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::{
    context::RelayContext,
    error::CoreError,
    notify_gate::NotifyGate,
    ports::notify_best_effort,
    scheduler::{WorkHandle, WorkState, panic_message},
};

/// Why the watchdog replaced the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartReason {
    /// No worker was ever started.
    Absent,
    /// The worker ended or was asked to stop while the relay should run.
    Exited,
    /// The worker failed or panicked.
    Failed(String),
    /// Liveness older than the staleness ceiling.
    Stale(Duration),
}

impl std::fmt::Display for RestartReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestartReason::Absent => f.write_str("no worker"),
            RestartReason::Exited => f.write_str("worker exited"),
            RestartReason::Failed(reason) => write!(f, "worker failed: {reason}"),
            RestartReason::Stale(age) => write!(f, "worker stale for {}s", age.as_secs()),
        }
    }
}

/// Result of one reconciliation tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Healthy,
    Restarted(RestartReason),
    /// A restart was needed but the restart budget is spent.
    Deferred,
    /// The relay is stopped and a live worker was cancelled.
    Halted,
    /// The relay has been stopped long enough to remind the operator.
    Reminded,
}

/// Periodic reconciliation of worker state against the persisted intent.
pub struct Watchdog {
    ctx: Arc<RelayContext>,
    restart_notice: NotifyGate,
    idle_reminder: NotifyGate,
    budget_notice: NotifyGate,
    budget: Mutex<VecDeque<Instant>>,
    stopped_since: Mutex<Option<Instant>>,
    memory_warned: AtomicBool,
}

impl Watchdog {
    pub fn new(ctx: Arc<RelayContext>) -> Self {
        let cfg = ctx.config();
        Self {
            restart_notice: NotifyGate::new(cfg.restart_notice_window),
            idle_reminder: NotifyGate::new(cfg.idle_reminder_ceiling),
            budget_notice: NotifyGate::new(cfg.restart_budget_window),
            budget: Mutex::new(VecDeque::new()),
            stopped_since: Mutex::new(None),
            memory_warned: AtomicBool::new(false),
            ctx,
        }
    }

    /// Ticks every `watchdog_period` until `token` is cancelled.
    ///
    /// Each tick runs in its own task; errors and panics are logged and the
    /// loop carries on.
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.ctx.config().watchdog_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period = ?self.ctx.config().watchdog_period, "watchdog started");

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let this = Arc::clone(&self);
            match tokio::spawn(async move { this.tick().await }).await {
                Ok(Ok(TickOutcome::Healthy)) => trace!("watchdog tick: healthy"),
                Ok(Ok(outcome)) => debug!(?outcome, "watchdog tick"),
                Ok(Err(e)) => warn!(error = %e, "watchdog tick failed"),
                Err(join) if join.is_panic() => {
                    let e = CoreError::TickPanicked(panic_message(join.into_panic()));
                    error!(error = %e, "watchdog tick panicked");
                }
                Err(_) => debug!("watchdog tick aborted"),
            }
        }
        info!("watchdog stopped");
    }

    /// One reconciliation pass.
    pub async fn tick(&self) -> Result<TickOutcome, CoreError> {
        let ctx = &self.ctx;
        let staleness = ctx.liveness().age();
        let running = ctx.store().running();
        let handle = ctx.worker_handle();

        // A failed restart still lets the memory check below run.
        let outcome = if running {
            self.clear_stopped();
            match restart_reason(handle.as_ref(), staleness, ctx.config().staleness_ceiling) {
                Some(reason) => self.replace_worker(reason).await,
                None => Ok(TickOutcome::Healthy),
            }
        } else {
            let mut outcome = TickOutcome::Healthy;
            if handle.as_ref().is_some_and(WorkHandle::is_live) {
                ctx.halt_worker();
                ctx.store().persist_current();
                warn!("relay is stopped but a worker was live; cancelled it");
                outcome = TickOutcome::Halted;
            }
            if self.remind_if_idle().await {
                outcome = TickOutcome::Reminded;
            }
            Ok(outcome)
        };

        self.check_memory().await;
        outcome
    }

    async fn replace_worker(&self, reason: RestartReason) -> Result<TickOutcome, CoreError> {
        let ctx = &self.ctx;
        if !self.admit_restart() {
            warn!(%reason, "restart deferred: restart budget spent");
            if self.budget_notice.try_acquire() {
                let text = format!(
                    "camrelay: worker needs a restart ({reason}) but {} restarts within {}s were already made; retrying later",
                    ctx.config().restart_budget,
                    ctx.config().restart_budget_window.as_secs()
                );
                self.notify(&text).await;
            }
            return Ok(TickOutcome::Deferred);
        }

        let handle = match ctx.restart_worker() {
            Ok(handle) => handle,
            Err(e) => {
                self.refund_restart();
                return Err(e.into());
            }
        };
        warn!(%reason, id = handle.id(), restarts = ctx.restarts(), "worker replaced");
        if self.restart_notice.try_acquire() {
            self.notify(&format!("camrelay: worker restarted ({reason})"))
                .await;
        }
        Ok(TickOutcome::Restarted(reason))
    }

    fn admit_restart(&self) -> bool {
        let cfg = self.ctx.config();
        let mut budget = self.budget.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        while budget
            .front()
            .is_some_and(|at| now.saturating_duration_since(*at) >= cfg.restart_budget_window)
        {
            budget.pop_front();
        }
        if budget.len() >= cfg.restart_budget {
            return false;
        }
        budget.push_back(now);
        true
    }

    // A restart that never happened does not count against the budget.
    fn refund_restart(&self) {
        self.budget.lock().unwrap_or_else(|e| e.into_inner()).pop_back();
    }

    fn clear_stopped(&self) {
        *self.stopped_since.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.idle_reminder.reset();
    }

    async fn remind_if_idle(&self) -> bool {
        let ceiling = self.ctx.config().idle_reminder_ceiling;
        let stopped_for = {
            let mut since = self.stopped_since.lock().unwrap_or_else(|e| e.into_inner());
            let at = *since.get_or_insert_with(Instant::now);
            Instant::now().saturating_duration_since(at)
        };
        if stopped_for < ceiling || !self.idle_reminder.try_acquire() {
            return false;
        }
        let text = format!(
            "camrelay reminder: publication has been stopped for {} minutes",
            stopped_for.as_secs() / 60
        );
        self.notify(&text).await;
        true
    }

    async fn check_memory(&self) {
        let Some(resident) = self.ctx.memory().resident_bytes() else {
            return;
        };
        let critical = self.ctx.config().memory_critical;
        if resident <= critical {
            self.memory_warned.store(false, Ordering::Relaxed);
            return;
        }
        if self.memory_warned.swap(true, Ordering::Relaxed) {
            return;
        }
        let mib = resident / (1024 * 1024);
        warn!(resident_mib = mib, critical_mib = critical / (1024 * 1024), "resident memory above critical threshold");
        self.notify(&format!("camrelay warning: resident memory at {mib} MiB"))
            .await;
    }

    async fn notify(&self, text: &str) {
        notify_best_effort(
            self.ctx.notifier().as_ref(),
            text,
            self.ctx.config().call_timeout,
        )
        .await;
    }
}

fn restart_reason(
    handle: Option<&WorkHandle>,
    staleness: Duration,
    ceiling: Duration,
) -> Option<RestartReason> {
    let Some(handle) = handle else {
        return Some(RestartReason::Absent);
    };
    match handle.state() {
        WorkState::Failed(reason) => return Some(RestartReason::Failed(reason)),
        state if state.is_done() || handle.cancel_requested() => return Some(RestartReason::Exited),
        _ => {}
    }
    (staleness > ceiling).then_some(RestartReason::Stale(staleness))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, settle, test_config};
    use camrelay_model::WorkerPhase;

    const MIB: u64 = 1024 * 1024;

    fn restarts_notices(h: &Harness) -> usize {
        h.notifier
            .messages()
            .iter()
            .filter(|m| m.contains("restarted"))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_recovers_running_state() {
        let h = Harness::running(test_config()).await;
        let watchdog = Watchdog::new(h.ctx.clone());

        assert_eq!(watchdog.tick().await.unwrap(), TickOutcome::Restarted(RestartReason::Absent));
        settle().await;

        assert!(h.ctx.status().cycles() >= 1);
        assert_eq!(h.notifier.photos().len(), 1);
        assert_eq!(watchdog.tick().await.unwrap(), TickOutcome::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_worker_is_replaced_exactly_once() {
        let mut cfg = test_config();
        cfg.staleness_ceiling = Duration::from_secs(30);
        let h = Harness::running(cfg).await;
        let watchdog = Watchdog::new(h.ctx.clone());

        watchdog.tick().await.unwrap();
        settle().await;
        let first = h.ctx.worker_handle().unwrap();

        tokio::time::advance(Duration::from_secs(31)).await;
        let outcome = watchdog.tick().await.unwrap();
        assert!(matches!(outcome, TickOutcome::Restarted(RestartReason::Stale(_))));
        settle().await;

        assert_eq!(watchdog.tick().await.unwrap(), TickOutcome::Healthy);
        assert_eq!(h.ctx.restarts(), 2);
        assert!(first.is_done());
        assert_eq!(h.ctx.status().active(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_relay_halts_live_worker() {
        let h = Harness::running(test_config()).await;
        let watchdog = Watchdog::new(h.ctx.clone());
        watchdog.tick().await.unwrap();
        settle().await;

        // intent flipped without going through the command path
        h.ctx.store().save(false);
        assert!(h.ctx.worker_live());

        assert_eq!(watchdog.tick().await.unwrap(), TickOutcome::Halted);
        settle().await;
        assert!(!h.ctx.worker_live());
        assert_eq!(h.ctx.status().active(), 0);
        assert!(!h.file_state().unwrap().running);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_notices_are_rate_limited() {
        let h = Harness::running(test_config()).await;
        let watchdog = Watchdog::new(h.ctx.clone());

        watchdog.tick().await.unwrap();
        settle().await;
        h.ctx.worker_handle().unwrap().cancel();
        settle().await;

        assert_eq!(watchdog.tick().await.unwrap(), TickOutcome::Restarted(RestartReason::Exited));
        settle().await;
        assert_eq!(h.ctx.restarts(), 2);
        assert_eq!(restarts_notices(&h), 1);

        tokio::time::advance(Duration::from_secs(300)).await;
        h.ctx.worker_handle().unwrap().cancel();
        settle().await;
        watchdog.tick().await.unwrap();
        assert_eq!(restarts_notices(&h), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_worker_reason_is_reported() {
        let reason = restart_reason(None, Duration::ZERO, Duration::from_secs(1));
        assert_eq!(reason, Some(RestartReason::Absent));

        let h = Harness::running(test_config()).await;
        let handle = h
            .ctx
            .scheduler
            .submit("broken", |_| async { Err(crate::WorkError::fail("socket closed")) })
            .unwrap();
        handle.finished().await;

        let reason = restart_reason(Some(&handle), Duration::ZERO, Duration::from_secs(1));
        assert_eq!(reason, Some(RestartReason::Failed("socket closed".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_reminder_once_per_ceiling() {
        let h = Harness::stopped(test_config()).await;
        let watchdog = Watchdog::new(h.ctx.clone());
        let reminders = || {
            h.notifier
                .messages()
                .iter()
                .filter(|m| m.contains("reminder"))
                .count()
        };

        assert_eq!(watchdog.tick().await.unwrap(), TickOutcome::Healthy);
        tokio::time::advance(Duration::from_secs(601)).await;
        assert_eq!(watchdog.tick().await.unwrap(), TickOutcome::Reminded);
        assert_eq!(watchdog.tick().await.unwrap(), TickOutcome::Healthy);
        assert_eq!(reminders(), 1);

        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(watchdog.tick().await.unwrap(), TickOutcome::Reminded);
        assert_eq!(reminders(), 2);
        assert!(h.ctx.worker_handle().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn critical_memory_warns_once_until_rearmed() {
        let h = Harness::stopped(test_config()).await;
        let watchdog = Watchdog::new(h.ctx.clone());
        let warnings = || {
            h.notifier
                .messages()
                .iter()
                .filter(|m| m.contains("memory"))
                .count()
        };

        h.memory.set(600 * MIB);
        watchdog.tick().await.unwrap();
        watchdog.tick().await.unwrap();
        assert_eq!(warnings(), 1);

        h.memory.set(100 * MIB);
        watchdog.tick().await.unwrap();
        h.memory.set(600 * MIB);
        watchdog.tick().await.unwrap();
        assert_eq!(warnings(), 2);
        // warning only, no recycle
        assert_eq!(h.sessions.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_budget_defers_without_flipping_intent() {
        let mut cfg = test_config();
        cfg.restart_budget = 2;
        cfg.restart_budget_window = Duration::from_secs(600);
        let h = Harness::running(cfg).await;
        let watchdog = Watchdog::new(h.ctx.clone());

        for _ in 0..2 {
            assert!(matches!(watchdog.tick().await.unwrap(), TickOutcome::Restarted(_)));
            settle().await;
            h.ctx.worker_handle().unwrap().cancel();
            settle().await;
        }

        assert_eq!(watchdog.tick().await.unwrap(), TickOutcome::Deferred);
        assert_eq!(watchdog.tick().await.unwrap(), TickOutcome::Deferred);
        assert!(h.ctx.store().running());
        let budget_notices = h
            .notifier
            .messages()
            .iter()
            .filter(|m| m.contains("retrying later"))
            .count();
        assert_eq!(budget_notices, 1);

        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(watchdog.tick().await.unwrap(), TickOutcome::Restarted(RestartReason::Exited));
        settle().await;
        assert_eq!(h.ctx.status().phase(), WorkerPhase::Sleeping);
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_survives_and_stops_on_cancel() {
        let h = Harness::running(test_config()).await;
        let watchdog = Arc::new(Watchdog::new(h.ctx.clone()));
        let token = CancellationToken::new();
        let task = tokio::spawn(watchdog.run(token.clone()));

        settle().await;
        assert!(h.ctx.worker_live());

        token.cancel();
        settle().await;
        assert!(task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_restart_still_checks_memory() {
        let h = Harness::running(test_config()).await;
        h.close_inbox().await;
        h.memory.set(600 * MIB);
        let watchdog = Watchdog::new(h.ctx.clone());

        let res = watchdog.tick().await;
        assert!(matches!(res, Err(CoreError::Schedule(_))), "{res:?}");
        assert_eq!(h.memory.reads(), 1);
        settle().await;
        assert!(h.notifier.messages().iter().any(|m| m.contains("resident memory")));
        assert!(watchdog.budget.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_keeps_ticking_through_errors_and_panics() {
        let h = Harness::running(test_config()).await;
        h.close_inbox().await;
        h.memory.panic_on_read(true);
        let period = h.ctx.config().watchdog_period;
        let watchdog = Arc::new(Watchdog::new(h.ctx.clone()));
        let token = CancellationToken::new();
        let task = tokio::spawn(watchdog.run(token.clone()));

        settle().await;
        assert_eq!(h.memory.reads(), 1);

        tokio::time::advance(period).await;
        settle().await;
        assert_eq!(h.memory.reads(), 2);
        assert!(!task.is_finished());

        token.cancel();
        settle().await;
        assert!(task.is_finished());
    }
}
