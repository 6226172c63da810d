mod event_log;
pub use event_log::{EventLog, log_event};

mod severity;
pub use severity::{Severity, classify};
