use async_trait::async_trait;
use camrelay_core::Controller;
use camrelay_model::{Command, CommandReply, HealthReport};

use crate::error::ApiError;
use crate::handler::ApiHandler;

/// Bridges [`Controller`] to [`ApiHandler`].
pub struct ControllerAdapter {
    controller: Controller,
}

impl ControllerAdapter {
    pub fn new(controller: Controller) -> Self {
        Self { controller }
    }
}

#[async_trait]
impl ApiHandler for ControllerAdapter {
    async fn command(&self, command: Command) -> Result<CommandReply, ApiError> {
        if !self.controller.is_connected() {
            return Err(ApiError::Unavailable(format!(
                "{}: worker context is not running",
                command.name()
            )));
        }
        Ok(self.controller.dispatch(command).await)
    }

    async fn health(&self) -> Result<HealthReport, ApiError> {
        Ok(self.controller.health())
    }
}
