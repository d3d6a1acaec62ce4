//! Pod Monitor - in-pod system metrics recorder
//!
//! Polls the first pod matching a name prefix, runs diagnostic commands
//! inside it and writes the collected snapshots to JSON batch files.

use anyhow::{Context, Result};
use clap::Parser;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use monitor_lib::{
    KubePodLocator, KubectlExecutor, MonitorLoopBuilder, SnapshotStore, StructuredLogger,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs go to stderr, the console summary owns stdout
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let cli = crate::config::Cli::parse();
    let settings = crate::config::MonitorSettings::load(&cli)?;
    info!(pod_prefix = %settings.pod_prefix, "Monitor configured");

    let client = kube_client(settings.kubeconfig.as_deref()).await?;

    let mut executor = KubectlExecutor::new(&settings.kubectl_path, settings.exec_timeout());
    if let Some(path) = &settings.kubeconfig {
        executor = executor.with_kubeconfig(path);
    }

    let monitor = MonitorLoopBuilder::new()
        .locator(Arc::new(KubePodLocator::new(client)))
        .executor(Arc::new(executor))
        .store(SnapshotStore::new(&settings.output_dir))
        .pod_prefix(&settings.pod_prefix)
        .interval(settings.interval())
        .flush_every(settings.flush_every)
        .top_processes(settings.top_processes)
        .build()?;

    let logger = StructuredLogger::new(&settings.pod_prefix);
    logger.log_startup(MONITOR_VERSION, settings.interval_secs, &settings.output_dir);

    let api_handle = settings.metrics_port.map(|port| {
        tokio::spawn(async move {
            if let Err(e) = api::serve(port).await {
                warn!(error = %e, port = port, "Metrics endpoint stopped");
            }
        })
    });

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        let signal = shutdown_signal().await;
        info!(signal = signal, "Shutdown requested");
        let _ = shutdown_tx.send(());
    });

    let history = monitor.run(shutdown_rx).await;

    if let Some(handle) = api_handle {
        handle.abort();
    }

    info!(snapshots = history.len(), "Shutting down");
    Ok(())
}

/// Build a cluster client: an explicit kubeconfig wins, otherwise in-cluster
/// credentials, otherwise the default kubeconfig location
async fn kube_client(kubeconfig: Option<&Path>) -> Result<Client> {
    let config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("Invalid kubeconfig")?
        }
        None => match kube::Config::incluster() {
            Ok(config) => config,
            Err(e) => {
                debug!(error = %e, "Not running in-cluster, falling back to kubeconfig");
                kube::Config::from_kubeconfig(&KubeConfigOptions::default())
                    .await
                    .context("No usable cluster credentials")?
            }
        },
    };

    Client::try_from(config).context("Failed to create Kubernetes client")
}

/// Resolve on SIGINT, or SIGTERM on unix
#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM");
            return ctrl_c().await;
        }
    };

    tokio::select! {
        name = ctrl_c() => name,
        _ = terminate.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    ctrl_c().await
}

async fn ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for SIGINT");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
