//! Durable operator intent.
//!
//! [`RunStateStore`] keeps the current [`RunState`] in memory and mirrors every
//! change to an ordered list of [`StateBackend`]s, most authoritative first.

mod file;
pub use file::FileBackend;

mod overlay;
pub use overlay::OverrideBackend;

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use camrelay_model::RunState;
use tracing::{debug, info, warn};

use crate::{
    error::StoreError,
    ports::{Notifier, notify_best_effort},
};

const STOPPED_NOTICE: &str = "camrelay stopped: periodic publication is paused until resumed";

/// One persistence layer of the run state.
pub trait StateBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Reads the persisted value. `Ok(None)` means nothing is stored.
    fn load(&self) -> Result<Option<RunState>, StoreError>;

    fn save(&self, state: &RunState) -> Result<(), StoreError>;
}

pub struct RunStateStore {
    backends: Vec<Box<dyn StateBackend>>,
    current: Mutex<RunState>,
    notifier: Option<(Arc<dyn Notifier>, Duration)>,
}

impl RunStateStore {
    /// Creates a store over `backends`, ordered most authoritative first.
    pub fn new(backends: Vec<Box<dyn StateBackend>>) -> Self {
        Self {
            backends,
            current: Mutex::new(RunState::default()),
            notifier: None,
        }
    }

    /// Sends a one-shot notice whenever `running = false` is saved.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        self.notifier = Some((notifier, timeout));
        self
    }

    /// Reads the persisted flag from the backends.
    ///
    /// The first backend holding a value wins. Unreadable or missing state
    /// falls back to `running = true`, which is then written everywhere.
    pub fn load(&self) -> bool {
        let mut chosen: Option<(&'static str, RunState)> = None;
        let mut disagree = false;

        for backend in &self.backends {
            match backend.load() {
                Ok(Some(state)) => {
                    if let Some((winner, won)) = chosen {
                        if won.running != state.running {
                            warn!(
                                winner,
                                ignored = backend.name(),
                                running = won.running,
                                "persisted run states disagree"
                            );
                            disagree = true;
                        }
                    } else {
                        chosen = Some((backend.name(), state));
                    }
                }
                Ok(None) => debug!(backend = backend.name(), "no persisted run state"),
                Err(e) => warn!(backend = backend.name(), error = %e, "failed to read run state"),
            }
        }

        let (state, rewrite) = match chosen {
            Some((source, state)) => {
                info!(source, running = state.running, "run state loaded");
                (RunState::new(state.running), disagree)
            }
            None => {
                info!("no usable run state, defaulting to running");
                (RunState::default(), true)
            }
        };

        *self.lock() = state;
        if rewrite {
            self.write_all(&state);
        }
        state.running
    }

    /// Updates the flag in memory, then on every backend.
    ///
    /// Backend failures are logged and never abort the remaining writes.
    pub fn save(&self, running: bool) {
        let state = RunState::new(running);
        *self.lock() = state;
        self.write_all(&state);

        if !running {
            self.notify_stopped();
        }
    }

    /// Re-writes the in-memory state without notifying.
    pub fn persist_current(&self) {
        let state = self.snapshot();
        self.write_all(&state);
    }

    pub fn running(&self) -> bool {
        self.lock().running
    }

    pub fn snapshot(&self) -> RunState {
        *self.lock()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RunState> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write_all(&self, state: &RunState) {
        for backend in &self.backends {
            if let Err(e) = backend.save(state) {
                warn!(backend = backend.name(), error = %e, running = state.running, "failed to persist run state");
            }
        }
    }

    fn notify_stopped(&self) {
        let Some((notifier, timeout)) = self.notifier.as_ref() else {
            return;
        };
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime to deliver stop notice");
            return;
        };
        let notifier = Arc::clone(notifier);
        let timeout = *timeout;
        rt.spawn(async move {
            notify_best_effort(notifier.as_ref(), STOPPED_NOTICE, timeout).await;
        });
    }
}

impl std::fmt::Debug for RunStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.backends.iter().map(|b| b.name()).collect();
        f.debug_struct("RunStateStore")
            .field("backends", &names)
            .field("current", &self.snapshot())
            .finish()
    }
}
