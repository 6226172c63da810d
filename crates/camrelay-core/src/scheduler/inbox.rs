use std::any::Any;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::{
    error::WorkError,
    scheduler::{Submission, WorkState},
};

/// Receiving side of the scheduler. Runs inside the worker context.
#[derive(Debug)]
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<Submission>,
}

impl Inbox {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Submission>) -> Self {
        Self { rx }
    }

    /// Spawns every submission on the current runtime until `token` is cancelled.
    ///
    /// Submissions still queued at that point are marked `Cancelled`.
    pub async fn run(mut self, token: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                next = self.rx.recv() => match next {
                    Some(submission) => spawn_submission(submission),
                    None => break,
                },
            }
        }

        self.rx.close();
        while let Ok(submission) = self.rx.try_recv() {
            submission.token.cancel();
            submission.state.send_replace(WorkState::Cancelled);
            debug!(work = %submission.name, id = submission.id, "queued work dropped on shutdown");
        }
    }
}

fn spawn_submission(submission: Submission) {
    let Submission {
        id,
        name,
        token,
        state,
        job,
    } = submission;

    tokio::spawn(async move {
        if token.is_cancelled() {
            state.send_replace(WorkState::Cancelled);
            return;
        }
        state.send_replace(WorkState::Running);
        trace!(work = %name, id, "work started");

        // Inner task so a panic surfaces as a JoinError instead of unwinding here.
        let outcome = match tokio::spawn(job).await {
            Ok(Ok(())) => WorkState::Finished,
            Ok(Err(WorkError::Cancelled)) => WorkState::Cancelled,
            Ok(Err(WorkError::Failed(reason))) => {
                warn!(work = %name, id, %reason, "work failed");
                WorkState::Failed(reason)
            }
            Err(join) if join.is_panic() => {
                let reason = panic_message(join.into_panic());
                error!(work = %name, id, %reason, "work panicked");
                WorkState::Failed(format!("panicked: {reason}"))
            }
            Err(_) => WorkState::Cancelled,
        };
        trace!(work = %name, id, state = ?outcome, "work done");
        state.send_replace(outcome);
    });
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
