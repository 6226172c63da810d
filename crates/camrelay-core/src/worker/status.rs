use std::sync::{
    Mutex,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};

use camrelay_model::{Target, WorkerPhase};

/// What the worker last reported about itself.
#[derive(Debug, Default)]
pub struct WorkerStatus {
    inner: Mutex<StatusInner>,
    active: AtomicUsize,
    cycles: AtomicU64,
}

#[derive(Debug, Default)]
struct StatusInner {
    phase: WorkerPhase,
    last_error: Option<String>,
    target: Option<Target>,
}

impl WorkerStatus {
    pub fn phase(&self) -> WorkerPhase {
        self.lock().phase
    }

    pub fn set_phase(&self, phase: WorkerPhase) {
        self.lock().phase = phase;
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub fn record_error(&self, error: impl Into<String>) {
        self.lock().last_error = Some(error.into());
    }

    /// Forgets the last error once a cycle has succeeded again.
    pub fn clear_error(&self) {
        self.lock().last_error = None;
    }

    pub fn target(&self) -> Option<Target> {
        self.lock().target.clone()
    }

    pub fn set_target(&self, target: Target) {
        self.lock().target = Some(target);
    }

    /// Number of worker instances currently executing.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Cycles started across all worker instances.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub(crate) fn bump_cycle(&self) -> u64 {
        self.cycles.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Marks a worker instance as executing until the guard drops.
    pub(crate) fn enter(&self) -> ActiveGuard<'_> {
        self.active.fetch_add(1, Ordering::AcqRel);
        ActiveGuard(&self.active)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StatusInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub(crate) struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
