use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use crate::config::GlacierConfig;
use crate::metrics::GlacierMetrics;
use crate::mirror::MirrorEngine;
use crate::scheduler::{start_scheduler, CronSchedule};
use crate::server;

/// Run the daemon until SIGINT or SIGTERM.
pub async fn run(config: GlacierConfig) -> Result<()> {
    run_until(config, shutdown_signal()).await
}

/// Start the metrics endpoint, reconcile once, then run maintenance on the
/// configured schedule until `shutdown` resolves.
///
/// A failed startup reconciliation is returned as an error. Failures inside
/// scheduled cycles are logged and never stop the daemon.
pub async fn run_until<F>(config: GlacierConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let metrics = Arc::new(GlacierMetrics::with_process_metrics());
    let schedule = CronSchedule::parse(&config.cron)?;

    let metrics_addr = config.metrics_addr();
    let listener = TcpListener::bind(metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {metrics_addr}"))?;

    let (server_stop_tx, mut server_stop_rx) = watch::channel(false);
    let server_task = tokio::spawn(server::serve(listener, Arc::clone(&metrics), async move {
        let _ = server_stop_rx.changed().await;
    }));

    let engine = Arc::new(MirrorEngine::from_config(&config, metrics));
    info!(
        repo_root = %engine.repo_root().display(),
        repos = engine.repos().len(),
        cron = schedule.expression(),
        "git-glacier starting"
    );

    let report = engine.reconcile().await.context("startup reconciliation failed")?;
    if !report.clone_failed.is_empty() {
        info!(
            failed = report.clone_failed.len(),
            "some mirrors failed to clone and will be retried on next start"
        );
    }

    let scheduled = Arc::clone(&engine);
    let scheduler = start_scheduler(schedule, move || {
        let engine = Arc::clone(&scheduled);
        async move {
            engine.run_maintenance().await;
            Ok(())
        }
    });

    shutdown.await;
    info!("git-glacier shutting down");

    scheduler.shutdown().await;
    let _ = server_stop_tx.send(true);
    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => error!(error = %format!("{error:#}"), "metrics server failed"),
        Err(join_error) => error!(?join_error, "metrics server task panicked"),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(%error, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                error!(%error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
