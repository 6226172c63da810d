use taskvisor::EventKind;

/// Level at which a supervisor event is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Classifies a supervisor event for the relay's background services.
///
/// Service churn (start, stop, add, remove) is quiet; anything that means a
/// watchdog or heartbeat is not running as configured is loud.
pub fn classify(kind: EventKind) -> (Severity, &'static str) {
    match kind {
        EventKind::TaskStarting => (Severity::Info, "service starting"),
        EventKind::TaskStopped => (Severity::Debug, "service stopped"),
        EventKind::TaskFailed => (Severity::Error, "service failed"),
        EventKind::TimeoutHit => (Severity::Warn, "service attempt timed out"),
        EventKind::BackoffScheduled => (Severity::Warn, "service restart scheduled"),
        EventKind::ActorExhausted => (Severity::Error, "service gave up restarting"),
        EventKind::ActorDead => (Severity::Error, "service died"),
        EventKind::ShutdownRequested => (Severity::Info, "shutdown requested"),
        EventKind::AllStoppedWithinGrace => (Severity::Info, "services stopped within grace"),
        EventKind::GraceExceeded => (Severity::Warn, "services outlived the shutdown grace"),
        EventKind::SubscriberPanicked => (Severity::Error, "event subscriber panicked"),
        EventKind::SubscriberOverflow => (Severity::Warn, "event subscriber dropped events"),
        _ => (Severity::Trace, "supervisor event"),
    }
}
