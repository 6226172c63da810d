//! Command hand-off from request handlers to the worker context.
//!
//! [`Controller`] lives on the request side and is cheap to clone.
//! [`CommandLoop`] runs in the worker context and applies commands one at a
//! time against the [`RelayContext`].

use std::{sync::Arc, time::Duration};

use camrelay_model::{Command, CommandReply, HealthReport};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::RelayContext;

struct Envelope {
    command: Command,
    reply: oneshot::Sender<CommandReply>,
}

/// Creates a connected controller/command-loop pair.
pub fn channel(ctx: Arc<RelayContext>, reply_timeout: Duration) -> (Controller, CommandLoop) {
    let (tx, rx) = mpsc::unbounded_channel();
    let controller = Controller {
        tx,
        ctx: Arc::clone(&ctx),
        reply_timeout,
    };
    (controller, CommandLoop { rx, ctx })
}

#[derive(Clone)]
pub struct Controller {
    tx: mpsc::UnboundedSender<Envelope>,
    ctx: Arc<RelayContext>,
    reply_timeout: Duration,
}

impl Controller {
    /// Sends `command` to the worker context and waits (bounded) for the reply.
    ///
    /// Never fails: an unreachable worker context or a slow reply is reported
    /// in the returned message.
    ///
    /// `setTarget` is checked for reachability here, before it is queued, so
    /// the loop only installs the override and never waits on the network.
    pub async fn dispatch(&self, command: Command) -> CommandReply {
        self.ctx.liveness().touch();
        let name = command.name();

        let command = match command {
            Command::SetTarget { url } => match self.ctx.check_target(&url, self.check_limit()).await {
                Ok(url) => Command::SetTarget { url },
                Err(rejection) => {
                    info!(command = name, message = %rejection.message, "command rejected before queueing");
                    return rejection;
                }
            },
            other => other,
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(Envelope {
                command,
                reply: reply_tx,
            })
            .is_err()
        {
            warn!(command = name, "command loop is gone");
            return CommandReply::rejected(format!("{name}: worker context is not running"));
        }

        match tokio::time::timeout(self.reply_timeout, reply_rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => CommandReply::rejected(format!("{name}: command dropped by worker context")),
            Err(_) => {
                debug!(command = name, timeout = ?self.reply_timeout, "command reply timed out");
                CommandReply::accepted(format!(
                    "{name}: queued; not confirmed within {}ms",
                    self.reply_timeout.as_millis()
                ))
            }
        }
    }

    pub fn health(&self) -> HealthReport {
        self.ctx.health()
    }

    /// Whether the worker context is still accepting commands.
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    fn check_limit(&self) -> Duration {
        self.ctx.config().call_timeout.min(self.reply_timeout)
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("reply_timeout", &self.reply_timeout)
            .finish_non_exhaustive()
    }
}

/// Worker-context side of the command channel.
pub struct CommandLoop {
    rx: mpsc::UnboundedReceiver<Envelope>,
    ctx: Arc<RelayContext>,
}

impl CommandLoop {
    pub async fn run(mut self, token: CancellationToken) {
        info!("command loop started");
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                next = self.rx.recv() => match next {
                    Some(Envelope { command, reply }) => {
                        let answer = self.ctx.apply(command).await;
                        if reply.send(answer).is_err() {
                            debug!("command caller went away before the reply");
                        }
                    }
                    None => break,
                },
            }
        }
        info!("command loop stopped");
    }
}
