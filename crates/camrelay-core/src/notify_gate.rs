use std::{sync::Mutex, time::Duration};

use tokio::time::Instant;

/// Admits at most one notification per window.
#[derive(Debug)]
pub struct NotifyGate {
    window: Duration,
    last: Mutex<Option<Instant>>,
}

impl NotifyGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: Mutex::new(None),
        }
    }

    /// Returns `true` and starts a new window if the previous one has elapsed.
    pub fn try_acquire(&self) -> bool {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        match *last {
            Some(at) if now.saturating_duration_since(at) < self.window => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Forgets the last admission.
    pub fn reset(&self) {
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
