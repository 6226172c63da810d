//! The fetch → publish → sleep cycle.

mod buster;
pub use buster::{CacheBuster, caption};

mod status;
pub use status::WorkerStatus;

use std::{sync::Arc, time::SystemTime};

use camrelay_model::{Target, TargetSource, WorkerPhase};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    bounded::{Interrupt, bounded},
    context::RelayContext,
    error::{CycleError, FetchError, NotifyError, WorkError},
};

/// One instance of the periodic loop.
///
/// Runs until the relay is told to stop (`Ok`, phase `Stopped`) or its token
/// is cancelled (`Err(WorkError::Cancelled)`, phase `Cancelled`). Cycle
/// failures never end the loop.
pub struct PeriodicWorker {
    ctx: Arc<RelayContext>,
}

impl PeriodicWorker {
    pub fn new(ctx: Arc<RelayContext>) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, token: CancellationToken) -> Result<(), WorkError> {
        let status = &self.ctx.status;
        let _active = status.enter();
        debug!("worker started");

        let res = self.run_cycles(&token).await;
        match &res {
            Ok(()) => {
                status.set_phase(WorkerPhase::Stopped);
                info!("worker stopped: relay is not running");
            }
            Err(WorkError::Cancelled) => {
                self.ctx.signal.clear();
                status.set_phase(WorkerPhase::Cancelled);
                info!("worker cancelled");
            }
            Err(WorkError::Failed(reason)) => {
                status.record_error(reason.clone());
                status.set_phase(WorkerPhase::Stopped);
                warn!(%reason, "worker ended with failure");
            }
        }
        res
    }

    async fn run_cycles(&self, token: &CancellationToken) -> Result<(), WorkError> {
        let ctx = &self.ctx;
        loop {
            ctx.liveness.touch();
            if !ctx.store.running() {
                return Ok(());
            }

            if !ctx.signal.is_set() {
                ctx.status.set_phase(WorkerPhase::Suspended);
                debug!("waiting for run signal");
                ctx.signal
                    .wait(token)
                    .await
                    .map_err(|_| WorkError::Cancelled)?;
                ctx.liveness.touch();
                if !ctx.store.running() {
                    return Ok(());
                }
            }

            let cycle = ctx.status.bump_cycle();
            let pause = match self.cycle(token).await {
                Ok(()) => {
                    ctx.status.clear_error();
                    ctx.cfg.cycle_interval
                }
                Err(CycleError::Cancelled) => return Err(WorkError::Cancelled),
                Err(e) => {
                    self.on_failure(token, cycle, &e).await;
                    ctx.cfg.failure_backoff
                }
            };

            self.account(token).await?;

            ctx.status.set_phase(WorkerPhase::Sleeping);
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(WorkError::Cancelled),
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    async fn cycle(&self, token: &CancellationToken) -> Result<(), CycleError> {
        let ctx = &self.ctx;
        let limit = ctx.cfg.call_timeout;

        ctx.status.set_phase(WorkerPhase::Fetching);
        let target = self.resolve_target(token).await?;
        ctx.status.set_target(target.clone());

        ctx.status.set_phase(WorkerPhase::Publishing);
        let url = ctx.buster.apply(&target.fetch_url);
        let session = ctx.recycler.session();
        let fetched = bounded(token, limit, session.get(&url))
            .await
            .map_err(|i| match i {
                Interrupt::Cancelled => CycleError::Cancelled,
                Interrupt::TimedOut(d) => CycleError::Fetch(FetchError::Timeout(d)),
            })??;

        if !fetched.is_success() {
            warn!(url = %url, status = fetched.status, "source answered non-success, skipping publish");
            return Err(FetchError::Status(fetched.status).into());
        }

        let size = fetched.body.len();
        let text = caption(&target.label, SystemTime::now());
        bounded(token, limit, ctx.notifier.publish(fetched.body, &text))
            .await
            .map_err(|i| match i {
                Interrupt::Cancelled => CycleError::Cancelled,
                Interrupt::TimedOut(d) => CycleError::Publish(NotifyError::Timeout(d)),
            })??;

        info!(target = %target.fetch_url, label = %target.label, bytes = size, "image published");
        Ok(())
    }

    /// Pinned override, else the resolver, else the configured default.
    async fn resolve_target(&self, token: &CancellationToken) -> Result<Target, CycleError> {
        let ctx = &self.ctx;
        if let Some(url) = ctx.target_override() {
            return Ok(Target::new(url, &ctx.cfg.default_label, TargetSource::Override));
        }

        let fallback = || Target::fallback(&ctx.cfg.default_url, &ctx.cfg.default_label);
        match bounded(token, ctx.cfg.call_timeout, ctx.resolver.resolve(&ctx.cfg.page_ref)).await {
            Ok(Ok(target)) => Ok(target),
            Ok(Err(e)) => {
                warn!(page = %ctx.cfg.page_ref, error = %e, "target resolution failed, using default");
                Ok(fallback())
            }
            Err(Interrupt::TimedOut(limit)) => {
                warn!(page = %ctx.cfg.page_ref, ?limit, "target resolution timed out, using default");
                Ok(fallback())
            }
            Err(Interrupt::Cancelled) => Err(CycleError::Cancelled),
        }
    }

    async fn on_failure(&self, token: &CancellationToken, cycle: u64, error: &CycleError) {
        let ctx = &self.ctx;
        warn!(cycle, error = %error, backoff = ?ctx.cfg.failure_backoff, "cycle failed");
        ctx.status.record_error(error.to_string());

        if ctx.cfg.notify_cycle_failures {
            let text = format!("camrelay cycle {cycle} failed: {error}");
            if let Ok(Err(e)) = bounded(token, ctx.cfg.call_timeout, ctx.notifier.message(&text)).await {
                debug!(error = %e, "failure notice not delivered");
            }
        }
    }

    /// Samples memory and session age after a publish attempt.
    async fn account(&self, token: &CancellationToken) -> Result<(), WorkError> {
        let ctx = &self.ctx;
        let resident = ctx.memory.resident_bytes();
        let Some(reason) = ctx.recycler.check(resident) else {
            return Ok(());
        };

        match bounded(token, ctx.cfg.call_timeout, ctx.recycler.maybe_recycle(reason)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => {
                debug!(error = %e, "session recycle skipped");
                Ok(())
            }
            Err(Interrupt::TimedOut(limit)) => {
                warn!(%reason, ?limit, "session recycle timed out");
                Ok(())
            }
            Err(Interrupt::Cancelled) => Err(WorkError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{Harness, settle, test_config};

    #[tokio::test(start_paused = true)]
    async fn publishes_resolved_target_with_cache_buster() {
        let h = Harness::running(test_config()).await;
        h.ctx.ensure_worker().unwrap();
        settle().await;

        let photos = h.notifier.photos();
        assert_eq!(photos.len(), 1);
        assert!(photos[0].1.starts_with("harbour "));

        let gets = h.sessions.gets();
        assert_eq!(gets.len(), 1);
        assert!(gets[0].starts_with("http://cams.test/live.jpg?t="));
        assert_eq!(h.ctx.status.phase(), WorkerPhase::Sleeping);
    }

    #[tokio::test(start_paused = true)]
    async fn resolver_failures_fall_back_to_default() {
        let mut cfg = test_config();
        cfg.cycle_interval = Duration::from_secs(1);
        let h = Harness::running(cfg).await;
        h.resolver.fail_next(3);

        h.ctx.ensure_worker().unwrap();
        settle().await;
        for _ in 0..2 {
            tokio::time::advance(Duration::from_secs(1)).await;
            settle().await;
        }

        let photos = h.notifier.photos();
        assert_eq!(photos.len(), 3);
        assert!(photos.iter().all(|(_, caption)| caption.starts_with("default ")));
        assert!(h.sessions.gets().iter().all(|url| url.starts_with("http://cams.test/default.jpg?t=")));
        assert!(h.ctx.status.target().unwrap().is_fallback());

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        let photos = h.notifier.photos();
        assert_eq!(photos.len(), 4);
        assert!(photos[3].1.starts_with("harbour "));
    }

    #[tokio::test(start_paused = true)]
    async fn non_success_skips_publish_and_backs_off() {
        let h = Harness::running(test_config()).await;
        h.sessions.set_status(503);

        h.ctx.ensure_worker().unwrap();
        settle().await;

        assert!(h.notifier.photos().is_empty());
        let error = h.ctx.status.last_error().unwrap();
        assert!(error.contains("503"));

        // failure backoff (10s) is shorter than the cycle interval (60s)
        h.sessions.set_status(200);
        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(h.notifier.photos().len(), 1);
        assert!(h.ctx.status.last_error().is_none());
        assert!(h.ctx.health().last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_sleep_is_prompt() {
        let h = Harness::running(test_config()).await;
        h.ctx.ensure_worker().unwrap();
        settle().await;
        assert_eq!(h.ctx.status.phase(), WorkerPhase::Sleeping);

        let handle = h.ctx.worker_handle().unwrap();
        handle.cancel();
        settle().await;

        assert!(handle.is_done());
        assert_eq!(h.ctx.status.phase(), WorkerPhase::Cancelled);
        assert!(!h.ctx.signal.is_set());
        assert_eq!(h.ctx.status.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn liveness_increases_every_cycle() {
        let mut cfg = test_config();
        cfg.cycle_interval = Duration::from_secs(1);
        let h = Harness::running(cfg).await;

        h.ctx.ensure_worker().unwrap();
        settle().await;
        let first = h.ctx.liveness.last();

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        let second = h.ctx.liveness.last();
        assert!(second > first);
    }

    #[tokio::test(start_paused = true)]
    async fn high_memory_recycles_once_per_cycle() {
        let h = Harness::running(test_config()).await;
        h.memory.set(400 * 1024 * 1024);

        h.ctx.ensure_worker().unwrap();
        settle().await;

        assert_eq!(h.notifier.photos().len(), 1);
        assert_eq!(h.sessions.opens(), 2);
        assert_eq!(h.sessions.closes(), 1);
        assert_eq!(h.ctx.recycler.generation(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_not_running() {
        let h = Harness::running(test_config()).await;
        h.ctx.store.save(false);
        h.ctx.signal.set();

        let worker = PeriodicWorker::new(Arc::clone(&h.ctx));
        let res = worker.run(CancellationToken::new()).await;

        assert_eq!(res, Ok(()));
        assert_eq!(h.ctx.status.phase(), WorkerPhase::Stopped);
        assert!(h.notifier.photos().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn suspended_worker_resumes_on_signal() {
        let h = Harness::running(test_config()).await;
        let token = CancellationToken::new();
        let worker = PeriodicWorker::new(Arc::clone(&h.ctx));
        let task = tokio::spawn(async move { worker.run(token).await });

        settle().await;
        assert_eq!(h.ctx.status.phase(), WorkerPhase::Suspended);
        assert!(h.notifier.photos().is_empty());

        h.ctx.signal.set();
        settle().await;
        assert_eq!(h.notifier.photos().len(), 1);
        task.abort();
    }
}
