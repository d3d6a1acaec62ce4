//! Observability infrastructure for the pod monitor
//!
//! Provides:
//! - Prometheus metrics (collection latency, snapshots, probe and lookup failures, batches)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for one collection cycle (in seconds); five kubectl round trips
const COLLECTION_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    collection_latency_seconds: Histogram,
    snapshots_total: IntCounter,
    probe_failures_total: IntCounterVec,
    lookup_failures_total: IntCounter,
    batches_written_total: IntCounterVec,
    batch_errors_total: IntCounter,
    history_size: IntGauge,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            collection_latency_seconds: register_histogram!(
                "pod_monitor_collection_latency_seconds",
                "Time spent running all probes against the target pod",
                COLLECTION_BUCKETS.to_vec()
            )
            .expect("Failed to register collection_latency_seconds"),

            snapshots_total: register_int_counter!(
                "pod_monitor_snapshots_total",
                "Total number of snapshots collected"
            )
            .expect("Failed to register snapshots_total"),

            probe_failures_total: register_int_counter_vec!(
                "pod_monitor_probe_failures_total",
                "Probes that produced no output or unparseable output",
                &["probe"]
            )
            .expect("Failed to register probe_failures_total"),

            lookup_failures_total: register_int_counter!(
                "pod_monitor_lookup_failures_total",
                "Cluster pod queries that failed"
            )
            .expect("Failed to register lookup_failures_total"),

            batches_written_total: register_int_counter_vec!(
                "pod_monitor_batches_written_total",
                "Snapshot batches persisted to disk",
                &["kind"]
            )
            .expect("Failed to register batches_written_total"),

            batch_errors_total: register_int_counter!(
                "pod_monitor_batch_errors_total",
                "Snapshot batches that could not be written"
            )
            .expect("Failed to register batch_errors_total"),

            history_size: register_int_gauge!(
                "pod_monitor_history_size",
                "Number of snapshots held in memory"
            )
            .expect("Failed to register history_size"),
        }
    }
}

/// Monitor metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new)
    }

    pub fn observe_collection_latency(&self, duration_secs: f64) {
        self.inner().collection_latency_seconds.observe(duration_secs);
    }

    pub fn inc_snapshots(&self) {
        self.inner().snapshots_total.inc();
    }

    pub fn inc_probe_failures(&self, probe: &str) {
        self.inner()
            .probe_failures_total
            .with_label_values(&[probe])
            .inc();
    }

    pub fn inc_lookup_failures(&self) {
        self.inner().lookup_failures_total.inc();
    }

    pub fn inc_batches_written(&self, kind: &str) {
        self.inner()
            .batches_written_total
            .with_label_values(&[kind])
            .inc();
    }

    pub fn inc_batch_errors(&self) {
        self.inner().batch_errors_total.inc();
    }

    pub fn set_history_size(&self, size: usize) {
        self.inner().history_size.set(size as i64);
    }
}

/// Structured logger for monitor events
///
/// Provides consistent JSON-formatted logging for lookups, probes,
/// batch writes and lifecycle transitions.
#[derive(Clone)]
pub struct StructuredLogger {
    pod_prefix: String,
}

impl StructuredLogger {
    pub fn new(pod_prefix: impl Into<String>) -> Self {
        Self {
            pod_prefix: pod_prefix.into(),
        }
    }

    /// Log monitor startup
    pub fn log_startup(&self, version: &str, interval_secs: u64, output_dir: &Path) {
        info!(
            event = "monitor_started",
            pod_prefix = %self.pod_prefix,
            version = %version,
            interval_secs = interval_secs,
            output_dir = %output_dir.display(),
            "Pod monitor started"
        );
    }

    /// Log monitor shutdown
    pub fn log_shutdown(&self, reason: &str, snapshots: usize) {
        info!(
            event = "monitor_shutdown",
            pod_prefix = %self.pod_prefix,
            reason = %reason,
            snapshots = snapshots,
            "Pod monitor shutting down"
        );
    }

    /// Log that no pod matched the prefix
    pub fn log_no_pod(&self) {
        warn!(
            event = "pod_not_found",
            pod_prefix = %self.pod_prefix,
            "No pod matches the configured prefix"
        );
    }

    /// Log a failed cluster query
    pub fn log_lookup_failed(&self, error: &str) {
        warn!(
            event = "pod_lookup_failed",
            pod_prefix = %self.pod_prefix,
            error = %error,
            "Failed to query cluster for pods, retrying next interval"
        );
    }

    /// Log the pod chosen for this iteration
    pub fn log_pod_selected(&self, pod: &str, namespace: &str, candidates: usize) {
        info!(
            event = "pod_selected",
            pod_prefix = %self.pod_prefix,
            pod = %pod,
            namespace = %namespace,
            candidates = candidates,
            "Monitoring pod"
        );
    }

    /// Log a probe whose metric is unavailable this cycle
    pub fn log_probe_failed(&self, pod: &str, probe: &str, reason: &str) {
        warn!(
            event = "probe_failed",
            pod = %pod,
            probe = %probe,
            reason = %reason,
            "Metric unavailable this cycle"
        );
    }

    /// Log a persisted batch
    pub fn log_batch_written(&self, kind: &str, path: &Path, snapshots: usize) {
        info!(
            event = "batch_written",
            kind = %kind,
            path = %path.display(),
            snapshots = snapshots,
            "Metrics saved"
        );
    }

    /// Log a batch that could not be persisted
    pub fn log_batch_failed(&self, kind: &str, error: &str, snapshots: usize) {
        error!(
            event = "batch_failed",
            kind = %kind,
            error = %error,
            snapshots = snapshots,
            "Failed to save metrics, continuing"
        );
    }
}
