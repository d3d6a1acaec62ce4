//! Monitor configuration
//!
//! Settings are layered: built-in defaults, an optional config file,
//! `POD_MONITOR_*` environment variables, then command-line flags.

use anyhow::{Context, Result};
use clap::Parser;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "POD_MONITOR";

/// Pod metrics monitor
#[derive(Parser, Debug, Default)]
#[command(name = "pod-monitor")]
#[command(author, version, about = "Polls a pod and records its system metrics", long_about = None)]
pub struct Cli {
    /// Config file (any format the config crate understands)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Monitor the first pod whose name starts with this prefix
    #[arg(long)]
    pub pod_prefix: Option<String>,

    /// Seconds between collections
    #[arg(long)]
    pub interval: Option<u64>,

    /// Directory receiving the JSON batches
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Snapshots per periodic batch
    #[arg(long)]
    pub flush_every: Option<u64>,

    /// Processes kept per snapshot
    #[arg(long)]
    pub top_processes: Option<u64>,

    /// Seconds before an in-pod command is killed
    #[arg(long)]
    pub exec_timeout: Option<u64>,

    /// Path to the kubectl binary
    #[arg(long)]
    pub kubectl: Option<PathBuf>,

    /// Single kubeconfig file for the API client and kubectl; when unset
    /// both fall back to their own lookup, including a `KUBECONFIG` list
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Serve /healthz and /metrics on this port
    #[arg(long)]
    pub metrics_port: Option<u16>,
}

/// Resolved monitor settings
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSettings {
    #[serde(default = "default_pod_prefix")]
    pub pod_prefix: String,

    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_flush_every")]
    pub flush_every: usize,

    #[serde(default = "default_top_processes")]
    pub top_processes: usize,

    #[serde(default = "default_exec_timeout")]
    pub exec_timeout_secs: u64,

    #[serde(default = "default_kubectl_path")]
    pub kubectl_path: PathBuf,

    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,

    /// Port for the health/metrics endpoint; disabled when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_pod_prefix() -> String {
    monitor_lib::collector::DEFAULT_POD_PREFIX.to_string()
}

fn default_interval() -> u64 {
    30
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_flush_every() -> usize {
    monitor_lib::history::DEFAULT_FLUSH_EVERY
}

fn default_top_processes() -> usize {
    monitor_lib::collector::DEFAULT_TOP_PROCESSES
}

fn default_exec_timeout() -> u64 {
    20
}

fn default_kubectl_path() -> PathBuf {
    PathBuf::from("kubectl")
}

impl MonitorSettings {
    /// Load settings from the process environment and the parsed flags
    pub fn load(cli: &Cli) -> Result<Self> {
        Self::from_sources(
            cli,
            Environment::with_prefix(ENV_PREFIX).try_parsing(true),
        )
    }

    /// Load settings from an explicit environment source
    pub fn from_sources(cli: &Cli, env: Environment) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = &cli.config {
            builder = builder.add_source(File::from(path.as_path()).required(true));
        }

        builder = apply_overrides(builder.add_source(env), cli)?;

        let settings: MonitorSettings = builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            anyhow::bail!("interval_secs must be greater than zero");
        }
        if self.flush_every == 0 {
            anyhow::bail!("flush_every must be greater than zero");
        }
        if self.exec_timeout_secs == 0 {
            anyhow::bail!("exec_timeout_secs must be greater than zero");
        }
        if self.pod_prefix.is_empty() {
            anyhow::bail!("pod_prefix must not be empty");
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }
}

fn apply_overrides(
    builder: ConfigBuilder<DefaultState>,
    cli: &Cli,
) -> Result<ConfigBuilder<DefaultState>> {
    let builder = builder
        .set_override_option("pod_prefix", cli.pod_prefix.clone())?
        .set_override_option("interval_secs", cli.interval)?
        .set_override_option("output_dir", path_value(&cli.output_dir))?
        .set_override_option("flush_every", cli.flush_every)?
        .set_override_option("top_processes", cli.top_processes)?
        .set_override_option("exec_timeout_secs", cli.exec_timeout)?
        .set_override_option("kubectl_path", path_value(&cli.kubectl))?
        .set_override_option("kubeconfig", path_value(&cli.kubeconfig))?
        .set_override_option("metrics_port", cli.metrics_port.map(u64::from))?;

    Ok(builder)
}

fn path_value(path: &Option<PathBuf>) -> Option<String> {
    path.as_ref().map(|p| p.to_string_lossy().into_owned())
}
