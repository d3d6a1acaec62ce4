//! Monitor loop
//!
//! Implements the polling loop: locate the target pod, collect a snapshot,
//! print a summary, persist a batch every `flush_every` snapshots, sleep for
//! the fixed interval. On shutdown the whole history is written once more.

use super::{CommandExecutor, MetricsCollector, DEFAULT_TOP_PROCESSES};
use crate::history::{MetricsHistory, DEFAULT_FLUSH_EVERY};
use crate::locator::PodLocator;
use crate::models::MetricsSnapshot;
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::store::{BatchKind, SnapshotStore};
use crate::summary::render_summary;
use anyhow::Result;
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::info;

/// Pod name prefix monitored when none is configured
pub const DEFAULT_POD_PREFIX: &str = "alpine-lab";

/// Configuration for the monitor loop
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Pods whose name starts with this prefix are candidates
    pub pod_prefix: String,
    /// Sleep between iterations (default: 30 seconds)
    pub interval: Duration,
    /// Snapshots per periodic batch (default: 5)
    pub flush_every: usize,
    /// Processes kept per snapshot (default: 5)
    pub top_processes: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            pod_prefix: DEFAULT_POD_PREFIX.to_string(),
            interval: Duration::from_secs(30),
            flush_every: DEFAULT_FLUSH_EVERY,
            top_processes: DEFAULT_TOP_PROCESSES,
        }
    }
}

/// What a single polling iteration did
#[derive(Debug, Clone, PartialEq)]
pub enum IterationOutcome {
    /// The cluster query failed; retried after the interval
    LookupFailed,
    /// No pod matched the prefix
    NoPod,
    /// A snapshot was collected from `pod`, and possibly a batch written
    Collected {
        pod: String,
        namespace: String,
        flushed: Option<PathBuf>,
    },
}

impl IterationOutcome {
    /// Console line for an iteration that found nothing to collect
    pub fn console_notice(&self, pod_prefix: &str) -> Option<String> {
        match self {
            IterationOutcome::LookupFailed | IterationOutcome::NoPod => {
                Some(format!("No {} pod found!", pod_prefix))
            }
            IterationOutcome::Collected { .. } => None,
        }
    }
}

/// Polls the target pod until shutdown is requested
pub struct MonitorLoop {
    locator: Arc<dyn PodLocator>,
    collector: MetricsCollector,
    store: SnapshotStore,
    config: MonitorConfig,
    history: MetricsHistory,
    logger: StructuredLogger,
    metrics: MonitorMetrics,
}

impl MonitorLoop {
    /// Create a new monitor loop with an empty history
    pub fn new(
        locator: Arc<dyn PodLocator>,
        executor: Arc<dyn CommandExecutor>,
        store: SnapshotStore,
        config: MonitorConfig,
    ) -> Self {
        let logger = StructuredLogger::new(&config.pod_prefix);

        Self {
            locator,
            collector: MetricsCollector::new(executor, config.top_processes)
                .with_logger(logger.clone()),
            store,
            history: MetricsHistory::new(config.flush_every),
            config,
            logger,
            metrics: MonitorMetrics::new(),
        }
    }

    pub fn history(&self) -> &MetricsHistory {
        &self.history
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Run until `shutdown` fires, then write the full history and return it
    ///
    /// Shutdown is only observed between iterations; an iteration in
    /// progress always runs to completion.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> MetricsHistory {
        info!(
            interval_secs = self.config.interval.as_secs(),
            pod_prefix = %self.config.pod_prefix,
            "Starting pod monitor loop"
        );

        loop {
            if shutdown_requested(&mut shutdown) {
                break;
            }

            self.tick().await;

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = shutdown.recv() => {
                    break;
                }
            }
        }

        self.shutdown("interrupted")
    }

    /// Perform one polling iteration
    pub async fn tick(&mut self) -> IterationOutcome {
        println!(
            "\n=== Collecting data at {} ===",
            Local::now().format("%Y-%m-%dT%H:%M:%S")
        );

        let pods = match self.locator.find_pods(&self.config.pod_prefix).await {
            Ok(pods) => pods,
            Err(e) => {
                self.metrics.inc_lookup_failures();
                self.logger.log_lookup_failed(&e.to_string());
                return self.nothing_collected(IterationOutcome::LookupFailed);
            }
        };

        let Some(pod) = pods.first() else {
            self.logger.log_no_pod();
            return self.nothing_collected(IterationOutcome::NoPod);
        };

        self.logger
            .log_pod_selected(&pod.name, &pod.namespace, pods.len());

        let snapshot = self.collector.collect(pod).await;
        self.metrics.inc_snapshots();

        for line in render_summary(pod, &snapshot) {
            println!("{}", line);
        }

        let flushed = match self.history.push(snapshot) {
            Some(batch) => persist(
                &self.store,
                &self.logger,
                &self.metrics,
                BatchKind::Periodic,
                batch,
            ),
            None => None,
        };
        self.metrics.set_history_size(self.history.len());

        IterationOutcome::Collected {
            pod: pod.name.clone(),
            namespace: pod.namespace.clone(),
            flushed,
        }
    }

    fn nothing_collected(&self, outcome: IterationOutcome) -> IterationOutcome {
        if let Some(line) = outcome.console_notice(&self.config.pod_prefix) {
            println!("{}", line);
        }
        outcome
    }

    /// Write the entire history as the final batch and hand it back
    pub fn shutdown(self, reason: &str) -> MetricsHistory {
        println!("\nMonitoring interrupted.");
        self.logger.log_shutdown(reason, self.history.len());

        persist(
            &self.store,
            &self.logger,
            &self.metrics,
            BatchKind::Final,
            self.history.as_slice(),
        );

        self.history
    }
}

/// Write a batch, logging instead of failing
fn persist(
    store: &SnapshotStore,
    logger: &StructuredLogger,
    metrics: &MonitorMetrics,
    kind: BatchKind,
    batch: &[MetricsSnapshot],
) -> Option<PathBuf> {
    match store.write_batch(kind, batch) {
        Ok(path) => {
            println!("Metrics saved to {}", path.display());
            metrics.inc_batches_written(kind.as_str());
            logger.log_batch_written(kind.as_str(), &path, batch.len());
            Some(path)
        }
        Err(e) => {
            metrics.inc_batch_errors();
            logger.log_batch_failed(kind.as_str(), &e.to_string(), batch.len());
            None
        }
    }
}

/// Non-blocking check for a pending shutdown; a closed channel counts as one
fn shutdown_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    !matches!(shutdown.try_recv(), Err(TryRecvError::Empty))
}

/// Builder for creating the monitor loop
pub struct MonitorLoopBuilder {
    locator: Option<Arc<dyn PodLocator>>,
    executor: Option<Arc<dyn CommandExecutor>>,
    store: Option<SnapshotStore>,
    config: MonitorConfig,
}

impl MonitorLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            locator: None,
            executor: None,
            store: None,
            config: MonitorConfig::default(),
        }
    }

    /// Set the pod locator
    pub fn locator(mut self, locator: Arc<dyn PodLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    /// Set the command executor used by the probes
    pub fn executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Set the snapshot store
    pub fn store(mut self, store: SnapshotStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the pod name prefix
    pub fn pod_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.pod_prefix = prefix.into();
        self
    }

    /// Set the polling interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set the periodic batch size
    pub fn flush_every(mut self, count: usize) -> Self {
        self.config.flush_every = count;
        self
    }

    /// Set the number of processes kept per snapshot
    pub fn top_processes(mut self, count: usize) -> Self {
        self.config.top_processes = count;
        self
    }

    /// Build the monitor loop
    pub fn build(self) -> Result<MonitorLoop> {
        let locator = self
            .locator
            .ok_or_else(|| anyhow::anyhow!("Locator is required"))?;
        let executor = self
            .executor
            .ok_or_else(|| anyhow::anyhow!("Executor is required"))?;
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("Snapshot store is required"))?;

        if self.config.interval.is_zero() {
            anyhow::bail!("Polling interval must be greater than zero");
        }
        if self.config.flush_every == 0 {
            anyhow::bail!("flush_every must be greater than zero");
        }

        Ok(MonitorLoop::new(locator, executor, store, self.config))
    }
}

impl Default for MonitorLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
