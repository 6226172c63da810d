use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, Layer, fmt, fmt::time::OffsetTime, layer::SubscriberExt, registry::LookupSpan,
    util::{SubscriberInitExt, TryInitError},
};

use crate::logger::{config::LoggerConfig, error::LoggerError, format::LoggerFormat};

/// Builds the filter and output layer for `cfg` and installs them globally.
pub(crate) fn install(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let registry = tracing_subscriber::registry().with(directive_filter(&cfg.level)?);
    let installed = match cfg.format {
        LoggerFormat::Text => registry.with(text_layer(cfg)).try_init(),
        LoggerFormat::Json => registry.with(json_layer(cfg)).try_init(),
        LoggerFormat::Journald => return journald(registry),
    };
    installed.map_err(install_error)
}

pub(crate) fn directive_filter(directive: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(directive).map_err(|e| LoggerError::Directive {
        directive: directive.to_string(),
        reason: e.to_string(),
    })
}

// Thread names tell the request runtime apart from the worker thread.
fn text_layer<S>(cfg: &LoggerConfig) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_ansi(cfg.use_color)
        .with_target(cfg.with_targets)
        .with_thread_names(true)
        .with_timer(local_timer())
}

fn json_layer<S>(cfg: &LoggerConfig) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .json()
        .with_current_span(false)
        .with_target(cfg.with_targets)
        .with_thread_names(true)
        .with_timer(local_timer())
}

// The local offset cannot be read once other threads exist; UTC then.
fn local_timer() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

fn install_error(e: TryInitError) -> LoggerError {
    let text = e.to_string();
    if text.contains("already") {
        LoggerError::AlreadyInstalled
    } else {
        LoggerError::Install(text)
    }
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn journald<S>(registry: S) -> Result<(), LoggerError>
where
    S: Subscriber + for<'a> LookupSpan<'a> + Send + Sync + 'static,
{
    let layer = tracing_journald::layer()
        .map_err(|e| LoggerError::Install(format!("journald socket: {e}")))?
        .with_syslog_identifier("camrelay".to_string());
    registry.with(layer).try_init().map_err(install_error)
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn journald<S>(_registry: S) -> Result<(), LoggerError> {
    Err(LoggerError::JournaldUnavailable)
}
