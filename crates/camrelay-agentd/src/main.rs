mod runtime;
mod settings;

use std::sync::Arc;

use anyhow::Context;
use camrelay_api::{ControllerAdapter, HttpApi};
use camrelay_core::{
    Collaborators, FileBackend, FixedResolver, LogNotifier, Notifier, OverrideBackend, ProcMemory,
    RunStateStore, StateBackend, system,
};
use camrelay_http::{HttpConfig, ReqwestSessionFactory, WebhookNotifier};
use camrelay_observe::{LoggerConfig, install_logger};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    runtime::{Startup, WorkerThread},
    settings::Settings,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Settings + logger
    let settings = Settings::from_env()?;
    let log = LoggerConfig::from_parts(settings.log_format.as_deref(), settings.log_level.as_deref())?;
    install_logger(&log)?;
    system::init_uptime();
    info!(
        host = %system::host_name(),
        instance = system::instance_id(),
        platform = system::platform(),
        arch = system::arch(),
        "camrelay starting"
    );

    // 2) Notifier
    let http = HttpConfig {
        timeout: settings.relay.call_timeout,
        ..Default::default()
    };
    let notifier: Arc<dyn Notifier> = match settings.webhook.as_deref() {
        Some(endpoint) => Arc::new(WebhookNotifier::new(endpoint, &http)?),
        None => {
            warn!("CAMRELAY_WEBHOOK is not set; notifications go to the log only");
            Arc::new(LogNotifier)
        }
    };

    // 3) Persisted run intent
    let backends: Vec<Box<dyn StateBackend>> = vec![
        Box::new(OverrideBackend::from_env(&settings.run_override_var)),
        Box::new(FileBackend::new(&settings.state_file)),
    ];
    let store = RunStateStore::new(backends)
        .with_notifier(Arc::clone(&notifier), settings.relay.call_timeout);
    let running = store.load();
    info!(running, state_file = %settings.state_file.display(), "run intent loaded");

    // 4) Worker context
    let shutdown = CancellationToken::new();
    let startup = Startup {
        relay: settings.relay.clone(),
        store: Arc::new(store),
        parts: Collaborators {
            resolver: Arc::new(FixedResolver::new(
                settings.target_url.clone(),
                settings.target_label.clone(),
            )),
            notifier,
            sessions: Arc::new(ReqwestSessionFactory::new(http)),
            memory: Arc::new(ProcMemory),
        },
        reply_timeout: settings.reply_timeout,
    };
    let worker = WorkerThread::start(startup, shutdown.clone()).await?;

    // 5) Request surface
    let listener = tokio::net::TcpListener::bind(settings.listen)
        .await
        .with_context(|| format!("bind {}", settings.listen))?;
    info!(addr = %settings.listen, "http api listening");

    let app = HttpApi::new(Arc::new(ControllerAdapter::new(worker.controller.clone()))).router();
    let stop = shutdown.clone();
    let served = camrelay_api::axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = stop.cancelled() => {}
                _ = terminate() => info!("termination signal received"),
            }
        })
        .await;

    // 6) Teardown
    shutdown.cancel();
    worker.join().await?;
    served.context("http api")?;
    info!("camrelay stopped");
    Ok(())
}

async fn terminate() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
