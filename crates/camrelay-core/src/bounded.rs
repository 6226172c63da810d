use std::{future::Future, time::Duration};

use tokio_util::sync::CancellationToken;

/// Why a bounded wait ended without the future completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Cancelled,
    TimedOut(Duration),
}

/// Runs `fut` until it completes, `limit` elapses or `token` is cancelled.
///
/// Cancellation is checked first, so an already cancelled token never polls `fut`.
pub async fn bounded<F>(token: &CancellationToken, limit: Duration, fut: F) -> Result<F::Output, Interrupt>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Interrupt::Cancelled),
        res = tokio::time::timeout(limit, fut) => res.map_err(|_| Interrupt::TimedOut(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn completes_in_time() {
        let token = CancellationToken::new();
        let out = bounded(&token, Duration::from_secs(1), async { 7 }).await;
        assert_eq!(out, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out() {
        let token = CancellationToken::new();
        let out = bounded(&token, Duration::from_secs(1), std::future::pending::<()>()).await;
        assert_eq!(out, Err(Interrupt::TimedOut(Duration::from_secs(1))));
    }

    #[tokio::test]
    async fn cancelled_token_wins() {
        let token = CancellationToken::new();
        token.cancel();
        let out = bounded(&token, Duration::from_secs(1), async { 1 }).await;
        assert_eq!(out, Err(Interrupt::Cancelled));
    }
}
