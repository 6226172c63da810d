use std::sync::Arc;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{context::RelayContext, ports::notify_best_effort, system};

/// Low-frequency "still alive" message, independent of the publish cycle.
pub struct HeartbeatEmitter {
    ctx: Arc<RelayContext>,
}

impl HeartbeatEmitter {
    pub fn new(ctx: Arc<RelayContext>) -> Self {
        Self { ctx }
    }

    /// Sends a heartbeat every `heartbeat_interval` until `token` is cancelled.
    /// The first one goes out one interval after start.
    pub async fn run(&self, token: CancellationToken) {
        let period = self.ctx.config().heartbeat_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(?period, "heartbeat started");

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => self.beat().await,
            }
        }
    }

    pub async fn beat(&self) {
        let text = self.message();
        let delivered =
            notify_best_effort(self.ctx.notifier().as_ref(), &text, self.ctx.config().call_timeout).await;
        debug!(delivered, "heartbeat sent");
    }

    pub fn message(&self) -> String {
        let health = self.ctx.health();
        format!(
            "camrelay heartbeat: host={} instance={} uptime={}s running={} phase={}",
            system::host_name(),
            system::instance_id(),
            system::uptime_seconds(),
            health.running,
            health.phase,
        )
    }
}
