//! Worker context: a dedicated OS thread with its own single-threaded
//! runtime hosting the scheduler inbox, the command loop, the watchdog and
//! the heartbeat.

use std::{sync::Arc, thread, time::Duration};

use anyhow::{Context, anyhow};
use camrelay_core::{
    Collaborators, Controller, HeartbeatEmitter, RelayConfig, RelayContext,
    RunStateStore, Watchdog, bounded, control, scheduler,
};
use camrelay_observe::EventLog;
use taskvisor::{
    BackoffPolicy, SupervisorConfig, RestartPolicy, Subscribe, Supervisor, TaskError,
    TaskFn, TaskRef, TaskSpec,
};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const THREAD_NAME: &str = "camrelay-worker";
const DRAIN_LIMIT: Duration = Duration::from_secs(2);

/// Everything the worker thread needs to build the relay context.
pub struct Startup {
    pub relay: RelayConfig,
    pub store: Arc<RunStateStore>,
    pub parts: Collaborators,
    pub reply_timeout: Duration,
}

/// Running worker thread plus the controller used by the request side.
pub struct WorkerThread {
    pub controller: Controller,
    handle: thread::JoinHandle<()>,
}

impl WorkerThread {
    /// Starts the worker thread and waits until its context is built.
    ///
    /// Cancelling `shutdown` stops every service on the thread. The thread
    /// cancels `shutdown` itself when its supervisor exits first.
    pub async fn start(startup: Startup, shutdown: CancellationToken) -> anyhow::Result<Self> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let token = shutdown.clone();

        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = ready_tx.send(Err(anyhow!(e).context("worker runtime")));
                        token.cancel();
                        return;
                    }
                };
                rt.block_on(drive(startup, ready_tx, token));
            })
            .context("spawn worker thread")?;

        match ready_rx.await {
            Ok(Ok(controller)) => Ok(Self { controller, handle }),
            Ok(Err(e)) => {
                let _ = join(handle).await;
                Err(e)
            }
            Err(_) => {
                let _ = join(handle).await;
                Err(anyhow!("worker thread exited before it was ready"))
            }
        }
    }

    /// Waits for the thread to finish.
    pub async fn join(self) -> anyhow::Result<()> {
        join(self.handle).await
    }
}

async fn join(handle: thread::JoinHandle<()>) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || handle.join())
        .await
        .context("join worker thread")?
        .map_err(|_| anyhow!("worker thread panicked"))
}

async fn drive(
    startup: Startup,
    ready: oneshot::Sender<anyhow::Result<Controller>>,
    shutdown: CancellationToken,
) {
    let (scheduler, inbox) = scheduler::channel();
    let local = CancellationToken::new();
    let inbox_task = tokio::spawn(inbox.run(local.clone()));

    let ctx = match RelayContext::new(startup.relay, startup.store, scheduler, startup.parts).await
    {
        Ok(ctx) => ctx,
        Err(e) => {
            let _ = ready.send(Err(anyhow!(e).context("relay context")));
            local.cancel();
            let _ = inbox_task.await;
            return;
        }
    };

    let (controller, commands) = control::channel(Arc::clone(&ctx), startup.reply_timeout);
    let commands_task = tokio::spawn(commands.run(local.clone()));
    if ready.send(Ok(controller)).is_err() {
        warn!("request side is gone; worker thread exits");
        shutdown.cancel();
    }

    info!(thread = THREAD_NAME, "worker context running");
    supervise(&ctx, &shutdown).await;

    shutdown.cancel();
    ctx.shutdown();
    if let Some(handle) = ctx.worker_handle() {
        let token = CancellationToken::new();
        if bounded(&token, DRAIN_LIMIT, handle.finished()).await.is_err() {
            warn!(limit = ?DRAIN_LIMIT, "worker did not stop in time");
        }
    }

    local.cancel();
    let _ = commands_task.await;
    let _ = inbox_task.await;
    info!("worker context stopped");
}

/// Runs the watchdog and heartbeat under a supervisor until `shutdown` is
/// cancelled or the supervisor sees a termination signal.
async fn supervise(ctx: &Arc<RelayContext>, shutdown: &CancellationToken) {
    let subscribers: Vec<Arc<dyn Subscribe>> = vec![Arc::new(EventLog::new())];
    let sup = Supervisor::builder(SupervisorConfig::default())
        .with_subscribers(subscribers)
        .build();

    let specs = vec![
        service(watchdog_task(Arc::clone(ctx), shutdown.clone())),
        service(heartbeat_task(Arc::clone(ctx), shutdown.clone())),
    ];

    match sup.run(specs).await {
        Ok(()) => debug!("supervisor finished"),
        Err(e) => error!(error = %e, "supervisor failed"),
    }
}

fn service(task: TaskRef) -> TaskSpec {
    TaskSpec::new(task, RestartPolicy::OnFailure, BackoffPolicy::default(), None)
}

fn watchdog_task(ctx: Arc<RelayContext>, shutdown: CancellationToken) -> TaskRef {
    let watchdog = Arc::new(Watchdog::new(ctx));
    TaskFn::arc("watchdog", move |cancel: CancellationToken| {
        let watchdog = Arc::clone(&watchdog);
        let shutdown = shutdown.clone();
        async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = watchdog.run(cancel) => {}
            }
            Ok::<(), TaskError>(())
        }
    })
}

fn heartbeat_task(ctx: Arc<RelayContext>, shutdown: CancellationToken) -> TaskRef {
    let heartbeat = Arc::new(HeartbeatEmitter::new(ctx));
    TaskFn::arc("heartbeat", move |cancel: CancellationToken| {
        let heartbeat = Arc::clone(&heartbeat);
        let shutdown = shutdown.clone();
        async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = heartbeat.run(cancel) => {}
            }
            Ok::<(), TaskError>(())
        }
    })
}
