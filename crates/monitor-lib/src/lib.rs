//! Library for polling a workload pod and recording its system metrics
//!
//! This crate provides the core functionality for:
//! - Locating the target pod through the Kubernetes API
//! - Running diagnostic probes inside the pod and parsing their output
//! - The polling loop and its in-memory snapshot history
//! - Persisting snapshot batches as JSON files
//! - Console summaries, structured logging and Prometheus metrics

pub mod collector;
pub mod history;
pub mod locator;
pub mod models;
pub mod observability;
pub mod store;
pub mod summary;

pub use collector::{
    CommandExecutor, ExecTarget, IterationOutcome, KubectlExecutor, MetricsCollector,
    MonitorConfig, MonitorLoop, MonitorLoopBuilder,
};
pub use history::MetricsHistory;
pub use locator::{KubePodLocator, LocatorError, PodLocator};
pub use models::*;
pub use observability::{MonitorMetrics, StructuredLogger};
pub use store::{BatchKind, SnapshotStore, StoreError};
