use std::time::Duration;

use camrelay_core::{FetchError, NotifyError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EndpointError {
    #[error("invalid webhook endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

pub(crate) fn fetch_error(e: reqwest::Error, timeout: Duration) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(timeout)
    } else {
        FetchError::Transport(e.to_string())
    }
}

pub(crate) fn notify_error(e: reqwest::Error, timeout: Duration) -> NotifyError {
    if e.is_timeout() {
        NotifyError::Timeout(timeout)
    } else {
        NotifyError::Transport(e.to_string())
    }
}
