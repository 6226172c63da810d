use serde::{Deserialize, Serialize};

/// Control command delivered by the command channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Command {
    /// Persist `running = true` and make sure a worker exists.
    Start,
    /// Persist `running = false` and cancel the worker.
    Stop,
    /// Release a suspended worker, starting one if none is alive.
    Resume,
    /// Pin the fetch URL, bypassing the source resolver.
    SetTarget { url: String },
    /// Drop a pinned fetch URL.
    ResetTarget,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Resume => "resume",
            Command::SetTarget { .. } => "setTarget",
            Command::ResetTarget => "resetTarget",
        }
    }
}

/// Response to a [`Command`].
///
/// Commands are always answered; `accepted = false` carries the reason the
/// action was not applied instead of a raw fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandReply {
    pub accepted: bool,
    pub message: String,
}

impl CommandReply {
    pub fn accepted(message: impl Into<String>) -> Self {
        Self {
            accepted: true,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            message: message.into(),
        }
    }
}
