use async_trait::async_trait;
use camrelay_model::{Command, CommandReply, HealthReport};

use crate::error::ApiError;

/// Relay control API handler.
///
/// Abstracts the backend so the HTTP layer can be mounted over the provided
/// [`ControllerAdapter`](crate::ControllerAdapter) or a custom handler
/// (auth, auditing, ...).
#[async_trait]
pub trait ApiHandler: Send + Sync + 'static {
    /// Delivers a control command and returns its reply.
    async fn command(&self, command: Command) -> Result<CommandReply, ApiError>;

    /// Current health snapshot.
    async fn health(&self) -> Result<HealthReport, ApiError>;
}
