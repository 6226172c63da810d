mod config;
mod error;
mod format;
mod log;

pub use config::LoggerConfig;
pub use error::LoggerError;
pub use format::LoggerFormat;

/// Installs the process-wide tracing subscriber. Only the first call wins.
pub fn install_logger(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    log::install(cfg)
}
