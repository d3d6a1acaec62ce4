//! Metrics collection from a running pod
//!
//! This module runs diagnostic shell commands inside the target pod and
//! turns their output into a [`MetricsSnapshot`]. A probe that fails or
//! prints something unexpected only leaves its field empty; collection
//! always produces a snapshot.

mod exec;
mod r#loop;
pub mod parsers;


pub use exec::{normalize_output, CommandExecutor, ExecTarget, KubectlExecutor};
pub use parsers::{ParseError, ParseResult, ProcessTable};
pub use r#loop::{
    IterationOutcome, MonitorConfig, MonitorLoop, MonitorLoopBuilder, DEFAULT_POD_PREFIX,
};

use crate::models::{CpuMetrics, MetricsSnapshot, PodDescriptor};
use crate::observability::{MonitorMetrics, StructuredLogger};
use chrono::Utc;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

pub use async_trait::async_trait;

/// Default number of processes kept per snapshot
pub const DEFAULT_TOP_PROCESSES: usize = 5;

/// Probe names used in logs and metric labels
pub mod probes {
    pub const CPU_USAGE: &str = "cpu_usage";
    pub const LOAD_AVERAGE: &str = "load_average";
    pub const MEMORY: &str = "memory";
    pub const DISK: &str = "disk";
    pub const PROCESSES: &str = "processes";
}

/// Shell commands run inside the pod, one per probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeCommands {
    pub cpu_usage: String,
    pub load_average: String,
    pub memory: String,
    pub disk: String,
    pub processes: String,
}

impl ProbeCommands {
    /// Standard procps/coreutils commands, listing `top_processes` processes
    pub fn new(top_processes: usize) -> Self {
        Self {
            cpu_usage: "top -bn1 | grep 'Cpu(s)' | awk '{print $2 + $4}'".to_string(),
            load_average: "cat /proc/loadavg".to_string(),
            memory: "free -m | grep Mem:".to_string(),
            disk: "df -hP / | tail -1".to_string(),
            processes: format!(
                "ps aux --sort=-%cpu | head -{}",
                top_processes.saturating_add(1)
            ),
        }
    }
}

impl Default for ProbeCommands {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_PROCESSES)
    }
}

/// Runs the probes against one pod and assembles a snapshot
pub struct MetricsCollector {
    executor: Arc<dyn CommandExecutor>,
    commands: ProbeCommands,
    top_processes: usize,
    logger: StructuredLogger,
    metrics: MonitorMetrics,
}

impl MetricsCollector {
    pub fn new(executor: Arc<dyn CommandExecutor>, top_processes: usize) -> Self {
        Self {
            executor,
            commands: ProbeCommands::new(top_processes),
            top_processes,
            logger: StructuredLogger::new(""),
            metrics: MonitorMetrics::new(),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Collect one snapshot; never fails, missing metrics are left empty
    pub async fn collect(&self, pod: &PodDescriptor) -> MetricsSnapshot {
        let timestamp = Utc::now();
        let start = Instant::now();

        let mut target = ExecTarget::new(&pod.namespace, &pod.name);
        if let Some(container) = pod.primary_container() {
            target = target.with_container(container);
        }

        let mut cpu = CpuMetrics::default();

        if let Some(usage) = self
            .probe(&target, probes::CPU_USAGE, &self.commands.cpu_usage, parsers::parse_cpu_usage)
            .await
        {
            cpu.usage_percent = Some(usage);
        }

        if let Some(load) = self
            .probe(
                &target,
                probes::LOAD_AVERAGE,
                &self.commands.load_average,
                parsers::parse_load_average,
            )
            .await
        {
            cpu.load_1min = Some(load.one);
            cpu.load_5min = Some(load.five);
            cpu.load_15min = Some(load.fifteen);
        }

        let memory = self
            .probe(&target, probes::MEMORY, &self.commands.memory, parsers::parse_memory)
            .await;

        let disk = self
            .probe(&target, probes::DISK, &self.commands.disk, parsers::parse_disk)
            .await;

        let processes = match self
            .run(&target, probes::PROCESSES, &self.commands.processes)
            .await
        {
            Some(raw) => {
                let table = parsers::parse_processes(&raw, self.top_processes);
                for reason in &table.skipped {
                    debug!(pod = %pod.name, reason = %reason, "Skipped process row");
                }
                table.processes
            }
            None => Vec::new(),
        };

        self.metrics
            .observe_collection_latency(start.elapsed().as_secs_f64());

        MetricsSnapshot {
            timestamp,
            pod: pod.name.clone(),
            namespace: pod.namespace.clone(),
            cpu,
            memory,
            disk,
            processes,
        }
    }

    /// Run one probe and parse its output, logging why a metric is missing
    async fn probe<T>(
        &self,
        target: &ExecTarget,
        name: &str,
        command: &str,
        parse: impl FnOnce(&str) -> ParseResult<T>,
    ) -> Option<T> {
        let raw = self.run(target, name, command).await?;

        match parse(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                self.metrics.inc_probe_failures(name);
                self.logger.log_probe_failed(&target.pod, name, &e.to_string());
                None
            }
        }
    }

    async fn run(&self, target: &ExecTarget, name: &str, command: &str) -> Option<String> {
        let output = self.executor.exec(target, command).await;

        if output.is_none() {
            self.metrics.inc_probe_failures(name);
            self.logger.log_probe_failed(&target.pod, name, "no output");
        }

        output
    }
}
