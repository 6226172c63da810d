use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::bounded::Interrupt;

/// Level-triggered "go ahead" flag the worker waits on before each cycle.
#[derive(Debug, Clone)]
pub struct RunSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl RunSignal {
    pub fn new(initial: bool) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self) {
        self.tx.send_replace(true);
    }

    pub fn clear(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Waits until the signal is set or `token` is cancelled.
    pub async fn wait(&self, token: &CancellationToken) -> Result<(), Interrupt> {
        let mut rx = self.tx.subscribe();
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(Interrupt::Cancelled),
            res = rx.wait_for(|set| *set) => {
                res.map(|_| ()).map_err(|_| Interrupt::Cancelled)
            }
        }
    }
}
