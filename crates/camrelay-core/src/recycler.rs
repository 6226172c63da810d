use std::{
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::time::Instant;
use tracing::{info, warn};

use crate::{
    error::FetchError,
    ports::{Session, SessionFactory},
};

/// Why a session is being replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecycleReason {
    /// Session older than the configured maximum age.
    Age(Duration),
    /// Resident memory above the high-water mark.
    Memory(u64),
}

impl std::fmt::Display for RecycleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecycleReason::Age(age) => write!(f, "session age {}s", age.as_secs()),
            RecycleReason::Memory(bytes) => write!(f, "resident memory {} MiB", bytes / (1024 * 1024)),
        }
    }
}

/// Owner of the shared session handle.
///
/// A replacement is installed before the old handle is closed, so readers
/// always find a usable session.
pub struct ResourceRecycler {
    factory: Arc<dyn SessionFactory>,
    current: RwLock<Arc<dyn Session>>,
    recycled_at: Mutex<Instant>,
    in_flight: AtomicBool,
    generation: AtomicU64,
    max_age: Duration,
    high_water: u64,
}

impl ResourceRecycler {
    /// Opens the first session.
    pub async fn open(
        factory: Arc<dyn SessionFactory>,
        max_age: Duration,
        high_water: u64,
    ) -> Result<Self, FetchError> {
        let first = factory.open().await?;
        Ok(Self {
            factory,
            current: RwLock::new(first),
            recycled_at: Mutex::new(Instant::now()),
            in_flight: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            max_age,
            high_water,
        })
    }

    /// Session to use for the next request.
    pub fn session(&self) -> Arc<dyn Session> {
        Arc::clone(&self.current.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Number of completed recycles.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn age(&self) -> Duration {
        let at = *self.recycled_at.lock().unwrap_or_else(|e| e.into_inner());
        Instant::now().saturating_duration_since(at)
    }

    /// Decides whether the session should be replaced. Memory pressure wins over age.
    pub fn check(&self, resident: Option<u64>) -> Option<RecycleReason> {
        if let Some(bytes) = resident
            && bytes > self.high_water
        {
            return Some(RecycleReason::Memory(bytes));
        }
        let age = self.age();
        (age >= self.max_age).then_some(RecycleReason::Age(age))
    }

    /// Replaces the session.
    ///
    /// Returns `Ok(false)` when another recycle is already running. On open
    /// failure the current session stays installed.
    pub async fn maybe_recycle(&self, reason: RecycleReason) -> Result<bool, FetchError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        let _guard = InFlight(&self.in_flight);

        let fresh = match self.factory.open().await {
            Ok(session) => session,
            Err(e) => {
                warn!(%reason, error = %e, "session recycle failed, keeping current session");
                return Err(e);
            }
        };

        let old = {
            let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *current, fresh)
        };
        *self.recycled_at.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        old.close().await;
        info!(%reason, generation, "session recycled");
        Ok(true)
    }
}

impl std::fmt::Debug for ResourceRecycler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRecycler")
            .field("generation", &self.generation())
            .field("max_age", &self.max_age)
            .field("high_water", &self.high_water)
            .finish_non_exhaustive()
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
