use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use camrelay_model::{Command, CommandReply, HealthReport, validate_fetch_url};
use tracing::{debug, info, warn};

use crate::{
    bounded::{Interrupt, bounded},
    config::RelayConfig,
    error::{CoreError, ScheduleError, WorkError},
    liveness::LivenessMark,
    ports::{Notifier, SessionFactory, SourceResolver},
    recycler::ResourceRecycler,
    scheduler::{Scheduler, WorkHandle},
    signal::RunSignal,
    state::RunStateStore,
    system::MemoryProbe,
    worker::{CacheBuster, PeriodicWorker, WorkerStatus},
};

const WORKER_NAME: &str = "periodic-worker";

/// External collaborators of the relay.
pub struct Collaborators {
    pub resolver: Arc<dyn SourceResolver>,
    pub notifier: Arc<dyn Notifier>,
    pub sessions: Arc<dyn SessionFactory>,
    pub memory: Arc<dyn MemoryProbe>,
}

/// Shared state of the relay, passed as `Arc` to every component.
///
/// Owns the single worker slot. Every lock here is short and never held
/// across an `.await`.
pub struct RelayContext {
    pub(crate) cfg: RelayConfig,
    pub(crate) store: Arc<RunStateStore>,
    pub(crate) signal: RunSignal,
    pub(crate) liveness: LivenessMark,
    pub(crate) scheduler: Scheduler,
    pub(crate) recycler: ResourceRecycler,
    pub(crate) resolver: Arc<dyn SourceResolver>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) memory: Arc<dyn MemoryProbe>,
    pub(crate) status: WorkerStatus,
    pub(crate) buster: CacheBuster,
    slot: Mutex<Option<WorkHandle>>,
    target_override: Mutex<Option<String>>,
    restarts: AtomicU64,
}

impl RelayContext {
    /// Builds the context and opens the first session.
    ///
    /// `store` should already be loaded. No worker is started here; the
    /// watchdog's first tick does that.
    pub async fn new(
        cfg: RelayConfig,
        store: Arc<RunStateStore>,
        scheduler: Scheduler,
        parts: Collaborators,
    ) -> Result<Arc<Self>, CoreError> {
        let recycler =
            ResourceRecycler::open(parts.sessions, cfg.session_max_age, cfg.memory_high_water)
                .await?;

        Ok(Arc::new(Self {
            cfg,
            store,
            signal: RunSignal::new(false),
            liveness: LivenessMark::new(),
            scheduler,
            recycler,
            resolver: parts.resolver,
            notifier: parts.notifier,
            memory: parts.memory,
            status: WorkerStatus::default(),
            buster: CacheBuster::new(),
            slot: Mutex::new(None),
            target_override: Mutex::new(None),
            restarts: AtomicU64::new(0),
        }))
    }

    pub fn config(&self) -> &RelayConfig {
        &self.cfg
    }

    pub fn store(&self) -> &RunStateStore {
        &self.store
    }

    pub fn liveness(&self) -> &LivenessMark {
        &self.liveness
    }

    pub fn status(&self) -> &WorkerStatus {
        &self.status
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn memory(&self) -> &dyn MemoryProbe {
        self.memory.as_ref()
    }

    /// Replacement workers started since boot.
    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::Relaxed)
    }

    pub fn worker_handle(&self) -> Option<WorkHandle> {
        self.lock_slot().clone()
    }

    /// Whether the tracked worker is neither done nor asked to stop.
    pub fn worker_live(&self) -> bool {
        self.lock_slot().as_ref().is_some_and(WorkHandle::is_live)
    }

    pub fn target_override(&self) -> Option<String> {
        self.target_override
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_target_override(&self, url: Option<String>) -> Option<String> {
        let mut slot = self.target_override.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *slot, url)
    }

    /// Starts a worker unless a live one exists. Returns whether one was started.
    pub fn ensure_worker(self: &Arc<Self>) -> Result<bool, ScheduleError> {
        let mut slot = self.lock_slot();
        if slot.as_ref().is_some_and(WorkHandle::is_live) {
            return Ok(false);
        }
        let handle = self.spawn_worker(slot.clone())?;
        debug!(id = handle.id(), "worker scheduled");
        *slot = Some(handle);
        Ok(true)
    }

    /// Cancels the tracked worker (if any) and installs a fresh one.
    pub fn restart_worker(self: &Arc<Self>) -> Result<WorkHandle, ScheduleError> {
        let mut slot = self.lock_slot();
        if let Some(old) = slot.as_ref() {
            old.cancel();
        }
        let handle = self.spawn_worker(slot.clone())?;
        *slot = Some(handle.clone());
        drop(slot);

        self.liveness.touch();
        self.restarts.fetch_add(1, Ordering::Relaxed);
        Ok(handle)
    }

    /// Cancels the tracked worker. Returns whether it was live.
    pub fn halt_worker(&self) -> bool {
        self.signal.clear();
        let slot = self.lock_slot();
        match slot.as_ref() {
            Some(handle) if handle.is_live() => {
                handle.cancel();
                true
            }
            _ => false,
        }
    }

    // The replacement waits for its predecessor so two instances never cycle at once.
    fn spawn_worker(self: &Arc<Self>, prior: Option<WorkHandle>) -> Result<WorkHandle, ScheduleError> {
        let ctx = Arc::clone(self);
        self.scheduler.submit(WORKER_NAME, move |token| async move {
            if let Some(prior) = prior
                && !prior.is_done()
            {
                match bounded(&token, ctx.cfg.call_timeout, prior.finished()).await {
                    Ok(()) => {}
                    Err(Interrupt::Cancelled) => return Err(WorkError::Cancelled),
                    Err(Interrupt::TimedOut(limit)) => {
                        warn!(prior = prior.id(), ?limit, "previous worker still finishing, starting anyway");
                    }
                }
            }
            if ctx.store.running() {
                ctx.signal.set();
            }
            PeriodicWorker::new(ctx).run(token).await
        })
    }

    /// Applies one control command. Always answers.
    pub async fn apply(self: &Arc<Self>, command: Command) -> CommandReply {
        let name = command.name();
        let reply = match command {
            Command::Start => self.start(),
            Command::Stop => self.stop(),
            Command::Resume => self.resume(),
            Command::SetTarget { url } => self.set_target(url),
            Command::ResetTarget => match self.set_target_override(None) {
                Some(prev) => CommandReply::accepted(format!("target override {prev} cleared")),
                None => CommandReply::accepted("no target override was set"),
            },
        };
        info!(command = name, accepted = reply.accepted, message = %reply.message, "command applied");
        reply
    }

    fn start(self: &Arc<Self>) -> CommandReply {
        if self.store.running() && self.worker_live() {
            return CommandReply::accepted("already running");
        }
        if !self.store.running() {
            self.store.save(true);
        }
        self.signal.set();
        match self.ensure_worker() {
            Ok(_) => CommandReply::accepted("started"),
            Err(e) => CommandReply::rejected(format!("running state saved but worker not started: {e}")),
        }
    }

    // Everything here is synchronous so the next watchdog tick sees it.
    fn stop(&self) -> CommandReply {
        let was_running = self.store.running();
        if was_running {
            self.store.save(false);
        }
        let halted = self.halt_worker();
        if was_running || halted {
            CommandReply::accepted("stopped")
        } else {
            CommandReply::accepted("already stopped")
        }
    }

    fn resume(self: &Arc<Self>) -> CommandReply {
        let was_running = self.store.running();
        if !was_running {
            self.store.save(true);
        }
        self.signal.set();
        match self.ensure_worker() {
            Ok(true) => CommandReply::accepted("resumed"),
            Ok(false) if was_running => CommandReply::accepted("already running"),
            Ok(false) => CommandReply::accepted("resumed"),
            Err(e) => CommandReply::rejected(format!("running state saved but worker not started: {e}")),
        }
    }

    /// Checks that `url` is well formed and answers a GET with 2xx within `limit`.
    ///
    /// Runs on the caller's side so a slow target never holds up the command
    /// loop. Returns the trimmed url, or the rejection to hand back.
    pub async fn check_target(&self, url: &str, limit: Duration) -> Result<String, CommandReply> {
        let url = url.trim().to_string();
        if let Err(e) = validate_fetch_url(&url) {
            return Err(CommandReply::rejected(e.to_string()));
        }

        let keeping = self
            .target_override()
            .unwrap_or_else(|| "the resolved target".to_string());
        let session = self.recycler.session();
        match tokio::time::timeout(limit, session.get(&url)).await {
            Ok(Ok(fetched)) if fetched.is_success() => Ok(url),
            Ok(Ok(fetched)) => Err(CommandReply::rejected(format!(
                "{url} answered with status {}; keeping {keeping}",
                fetched.status
            ))),
            Ok(Err(e)) => Err(CommandReply::rejected(format!(
                "{url} is unreachable ({e}); keeping {keeping}"
            ))),
            Err(_) => Err(CommandReply::rejected(format!(
                "{url} did not answer within {}ms; keeping {keeping}",
                limit.as_millis()
            ))),
        }
    }

    // Reachability is checked by the caller; only the shape is checked here.
    fn set_target(&self, url: String) -> CommandReply {
        let url = url.trim().to_string();
        if let Err(e) = validate_fetch_url(&url) {
            return CommandReply::rejected(e.to_string());
        }
        self.set_target_override(Some(url.clone()));
        CommandReply::accepted(format!("target set to {url}"))
    }

    pub fn health(&self) -> HealthReport {
        let last_error = self
            .status
            .last_error()
            .or_else(|| self.worker_handle().and_then(|h| h.error()));
        HealthReport {
            running: self.store.running(),
            worker_active: self.status.active() > 0,
            last_liveness_age_ms: self.liveness.age().as_millis() as u64,
            last_error,
            phase: self.status.phase(),
            restarts: self.restarts(),
            target: self.status.target().map(|t| t.fetch_url),
        }
    }

    /// Termination path: persist intent as-is, then cancel the worker.
    pub fn shutdown(&self) {
        self.store.persist_current();
        if self.halt_worker() {
            info!("worker cancelled for shutdown");
        }
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Option<WorkHandle>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for RelayContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayContext")
            .field("running", &self.store.running())
            .field("phase", &self.status.phase())
            .field("restarts", &self.restarts())
            .finish_non_exhaustive()
    }
}
