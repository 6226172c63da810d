//! Hand-off of work from request handlers to the dedicated worker context.
//!
//! [`Scheduler`] is the cheap, cloneable submission side; [`Inbox`] runs inside
//! the worker context and spawns every submission there. Submitting never
//! blocks and returns a [`WorkHandle`] that can be observed or cancelled from
//! any thread.

mod handle;
pub use handle::{WorkHandle, WorkState};

mod inbox;
pub use inbox::Inbox;
pub(crate) use inbox::panic_message;

use std::{
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::error::{ScheduleError, WorkError};

type Job = Pin<Box<dyn Future<Output = Result<(), WorkError>> + Send>>;

pub(crate) struct Submission {
    pub(crate) id: u64,
    pub(crate) name: Arc<str>,
    pub(crate) token: CancellationToken,
    pub(crate) state: watch::Sender<WorkState>,
    pub(crate) job: Job,
}

/// Creates a connected scheduler/inbox pair.
pub fn channel() -> (Scheduler, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    let scheduler = Scheduler {
        tx,
        next_id: Arc::new(AtomicU64::new(1)),
    };
    (scheduler, Inbox::new(rx))
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    tx: mpsc::UnboundedSender<Submission>,
    next_id: Arc<AtomicU64>,
}

impl Scheduler {
    /// Queues work for the worker context.
    ///
    /// `work` receives the token that [`Scheduler::cancel`] trips.
    pub fn submit<F, Fut>(&self, name: &str, work: F) -> Result<WorkHandle, ScheduleError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), WorkError>> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name: Arc<str> = Arc::from(name);
        let token = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(WorkState::Queued);

        let submission = Submission {
            id,
            name: Arc::clone(&name),
            token: token.clone(),
            state: state_tx,
            job: Box::pin(work(token.clone())),
        };
        self.tx
            .send(submission)
            .map_err(|_| ScheduleError::Closed)?;

        Ok(WorkHandle::new(id, name, token, state_rx))
    }

    /// Requests cooperative cancellation of `handle`.
    pub fn cancel(&self, handle: &WorkHandle) {
        handle.cancel();
    }

    /// Returns `true` once the inbox has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl std::fmt::Debug for Submission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submission")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
