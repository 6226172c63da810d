use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("unknown log format '{given}' (use text, json or journald)")]
    UnknownFormat { given: String },
    #[error("journald output needs Linux and the `journald` feature")]
    JournaldUnavailable,
    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled,
    #[error("bad filter directive '{directive}': {reason}")]
    Directive { directive: String, reason: String },
    #[error("logger install failed: {0}")]
    Install(String),
}
