use async_trait::async_trait;
use taskvisor::{Event, Subscribe};
use tracing::{debug, error, info, trace, warn};

use crate::subscriber::severity::{Severity, classify};

const QUEUE_CAPACITY: usize = 256;

/// `tracing` sink for supervisor events of the relay's background services.
#[derive(Debug, Default)]
pub struct EventLog;

impl EventLog {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for EventLog {
    async fn on_event(&self, event: &Event) {
        log_event(event);
    }

    fn name(&self) -> &'static str {
        "camrelay-event-log"
    }

    fn queue_capacity(&self) -> usize {
        QUEUE_CAPACITY
    }
}

/// Logs one event at the level [`classify`] assigns to it.
pub fn log_event(event: &Event) {
    let (severity, summary) = classify(event.kind);
    let service = event.task.as_deref().unwrap_or("-");
    let attempt = event.attempt.unwrap_or(0);
    let reason = event.reason.as_deref().unwrap_or("");

    match severity {
        Severity::Error => error!(service, attempt, reason, "{summary}"),
        Severity::Warn => warn!(service, attempt, reason, "{summary}"),
        Severity::Info => info!(service, attempt, "{summary}"),
        Severity::Debug => debug!(service, "{summary}"),
        Severity::Trace => trace!(service, kind = ?event.kind, "{summary}"),
    }
}
