use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::time::Instant;

/// Timestamp of the last sign of life from the worker or the command layer.
///
/// Successive touches always produce strictly increasing marks, even when the
/// clock has not moved.
#[derive(Debug, Clone)]
pub struct LivenessMark {
    last: Arc<Mutex<Instant>>,
    beats: Arc<AtomicU64>,
}

impl LivenessMark {
    pub fn new() -> Self {
        Self {
            last: Arc::new(Mutex::new(Instant::now())),
            beats: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records activity now and returns the new mark.
    pub fn touch(&self) -> Instant {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        *last = if now > *last {
            now
        } else {
            *last + Duration::from_nanos(1)
        };
        self.beats.fetch_add(1, Ordering::Relaxed);
        *last
    }

    pub fn last(&self) -> Instant {
        *self.last.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Time since the last touch.
    pub fn age(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last())
    }

    /// Number of touches since creation.
    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }
}

impl Default for LivenessMark {
    fn default() -> Self {
        Self::new()
    }
}
