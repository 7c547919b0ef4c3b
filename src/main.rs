//! Telepod entry point.
//!
//! Compares the image version of every running container with the version
//! recorded on the previous run and sends a Telegram message for each one
//! that changed.

use std::time::Duration;

use anyhow::Context;
use log::{debug, error, info, warn};
use tokio::signal;
use tokio::time::{sleep, timeout};

mod config;
mod error;
mod notify;
mod reconciler;
mod runtime;
mod store;
mod types;

use config::Config;
use notify::{Notifier, TelegramNotifier};
use reconciler::{PassSummary, Reconciler};
use runtime::{ContainerRuntime, DockerRuntime};
use store::{JsonVersionStore, VersionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging; quiet unless RUST_LOG says otherwise
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("error")).init();
    info!("telepod {}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let cfg = Config::load()?;
    info!("Loaded config: {:?}", cfg);

    // Container runtime
    let runtime = DockerRuntime::connect(cfg.docker_socket.as_deref(), cfg.version_label.clone())
        .context("error initializing container runtime")?;
    runtime
        .ping()
        .await
        .context("error initializing container runtime")?;

    // Versions database
    let state_path = match &cfg.state_path {
        Some(path) => path.clone(),
        None => JsonVersionStore::default_path()?,
    };
    let store = JsonVersionStore::load(state_path)
        .await
        .context("error initializing versions database")?;
    if store.is_empty() {
        info!(
            "Versions database {} is empty; running containers will be recorded without notifications",
            store.path().display()
        );
    } else {
        info!(
            "Versions database {} holds {} containers",
            store.path().display(),
            store.len()
        );
    }

    // Notifications
    let notifier = TelegramNotifier::new(
        &cfg.telegram_api_url,
        cfg.telegram_chat_id.clone(),
        cfg.telegram_bot_token.clone(),
        cfg.notify_timeout(),
    )
    .context("error initializing telegram notifier")?;

    let mut reconciler = Reconciler::new(runtime, store, notifier);

    let Some(interval) = cfg.poll_interval() else {
        return run_pass(&mut reconciler, cfg.pass_timeout())
            .await
            .map(|_| ())
            .map_err(|e| {
                error!("error running workflow: {:#}", e);
                e
            });
    };

    info!("Polling every {:?}", interval);
    loop {
        poll_once(&mut reconciler, cfg.pass_timeout()).await;

        tokio::select! {
            _ = sleep(interval) => {}
            res = signal::ctrl_c() => {
                match res {
                    Ok(()) => info!("Received Ctrl+C, shutting down..."),
                    Err(err) => error!("Unable to listen for shutdown signal: {}", err),
                }
                break;
            }
        }
    }

    info!("Shutdown complete.");
    Ok(())
}

/// One polling tick.  A failed pass is logged and its unflushed changes are
/// dropped, so the next tick detects (and notifies) them again.
async fn poll_once<R, S, N>(
    reconciler: &mut Reconciler<R, S, N>,
    deadline: Option<Duration>,
) -> Option<PassSummary>
where
    R: ContainerRuntime,
    S: VersionStore,
    N: Notifier,
{
    match run_pass(reconciler, deadline).await {
        Ok(summary) => Some(summary),
        Err(e) => {
            error!("error running workflow: {:#}", e);
            if let Err(e) = reconciler.discard_pending().await {
                error!("error reloading versions database: {:#}", anyhow::Error::new(e));
            }
            None
        }
    }
}

/// Runs one pass, abandoning it once `deadline` elapses.
async fn run_pass<R, S, N>(
    reconciler: &mut Reconciler<R, S, N>,
    deadline: Option<Duration>,
) -> anyhow::Result<PassSummary>
where
    R: ContainerRuntime,
    S: VersionStore,
    N: Notifier,
{
    let result = match deadline {
        Some(limit) => timeout(limit, reconciler.run_once())
            .await
            .map_err(|_| anyhow::anyhow!("reconciliation pass exceeded {:?}", limit))?,
        None => reconciler.run_once().await,
    };
    let summary = result.map_err(|e| {
        if let Some(name) = e.container() {
            warn!("Pass aborted at container {}; pending changes were not flushed", name);
        }
        e
    })?;

    if summary.updated > 0 {
        info!("Sent {} update notifications", summary.updated);
    }
    if summary.flushed {
        debug!("Versions database written");
    }
    Ok(summary)
}
