use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Lifecycle of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkState {
    Queued,
    Running,
    Finished,
    Cancelled,
    Failed(String),
}

impl WorkState {
    #[inline]
    pub fn is_done(&self) -> bool {
        matches!(
            self,
            WorkState::Finished | WorkState::Cancelled | WorkState::Failed(_)
        )
    }
}

/// Observer and cancel switch for submitted work. Cheap to clone.
#[derive(Debug, Clone)]
pub struct WorkHandle {
    id: u64,
    name: Arc<str>,
    token: CancellationToken,
    state: watch::Receiver<WorkState>,
}

impl WorkHandle {
    pub(crate) fn new(
        id: u64,
        name: Arc<str>,
        token: CancellationToken,
        state: watch::Receiver<WorkState>,
    ) -> Self {
        Self {
            id,
            name,
            token,
            state,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state. Work dropped before it ran reads as `Cancelled`.
    pub fn state(&self) -> WorkState {
        let state = self.state.borrow().clone();
        if !state.is_done() && self.state.has_changed().is_err() {
            return WorkState::Cancelled;
        }
        state
    }

    pub fn is_done(&self) -> bool {
        self.state().is_done()
    }

    pub fn cancel_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Not done and not asked to stop.
    pub fn is_live(&self) -> bool {
        !self.cancel_requested() && !self.is_done()
    }

    /// Failure reason, if the work failed.
    pub fn error(&self) -> Option<String> {
        match self.state() {
            WorkState::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Resolves once the work reached a terminal state.
    pub async fn finished(&self) {
        let mut rx = self.state.clone();
        let _ = rx.wait_for(WorkState::is_done).await;
    }
}
