use thiserror::Error;

/// Reasons a fetch URL supplied by an operator is refused.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("target url is empty")]
    Empty,
    #[error("target url must start with http:// or https:// (got '{0}')")]
    UnsupportedScheme(String),
    #[error("target url has no host: '{0}'")]
    MissingHost(String),
}
