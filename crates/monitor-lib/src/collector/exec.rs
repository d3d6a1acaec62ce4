//! Remote command execution inside a pod
//!
//! Probes run through `kubectl exec`, one at a time. Any failure (spawn
//! error, non-zero exit, timeout, empty output) is reported as `None`.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Pod and container a command is executed in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecTarget {
    pub namespace: String,
    pub pod: String,
    pub container: Option<String>,
}

impl ExecTarget {
    pub fn new(namespace: impl Into<String>, pod: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            pod: pod.into(),
            container: None,
        }
    }

    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }
}

/// Trait for running a shell command inside a pod
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `command` with `sh -c` and return its trimmed stdout,
    /// or `None` if the command failed or printed nothing
    async fn exec(&self, target: &ExecTarget, command: &str) -> Option<String>;
}

/// Executor backed by the `kubectl` command-line tool
pub struct KubectlExecutor {
    kubectl: PathBuf,
    kubeconfig: Option<PathBuf>,
    timeout: Duration,
}

impl KubectlExecutor {
    pub fn new(kubectl: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            kubectl: kubectl.into(),
            kubeconfig: None,
            timeout,
        }
    }

    /// Pass an explicit kubeconfig to every invocation
    pub fn with_kubeconfig(mut self, kubeconfig: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(kubeconfig.into());
        self
    }

    /// Arguments passed to kubectl for one probe
    pub fn build_args(&self, target: &ExecTarget, command: &str) -> Vec<String> {
        let mut args = Vec::with_capacity(12);

        if let Some(kubeconfig) = &self.kubeconfig {
            args.push("--kubeconfig".to_string());
            args.push(kubeconfig.to_string_lossy().to_string());
        }

        args.push("exec".to_string());
        args.push("-n".to_string());
        args.push(target.namespace.clone());
        args.push(target.pod.clone());

        if let Some(container) = &target.container {
            args.push("-c".to_string());
            args.push(container.clone());
        }

        args.extend(["--", "sh", "-c", command].map(String::from));
        args
    }
}

#[async_trait]
impl CommandExecutor for KubectlExecutor {
    async fn exec(&self, target: &ExecTarget, command: &str) -> Option<String> {
        let child = Command::new(&self.kubectl)
            .args(self.build_args(target, command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!(
                    kubectl = %self.kubectl.display(),
                    error = %e,
                    "Failed to spawn kubectl"
                );
                return None;
            }
        };

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(pod = %target.pod, command = %command, error = %e, "kubectl exec failed");
                return None;
            }
            Err(_) => {
                warn!(
                    pod = %target.pod,
                    command = %command,
                    timeout_secs = self.timeout.as_secs(),
                    "kubectl exec timed out"
                );
                return None;
            }
        };

        if !output.status.success() {
            debug!(
                pod = %target.pod,
                command = %command,
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Command exited with failure"
            );
            return None;
        }

        normalize_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Trim trailing whitespace, mapping empty output to `None`
pub fn normalize_output(stdout: &str) -> Option<String> {
    let trimmed = stdout.trim_end();
    if trimmed.trim_start().is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args_with_container_and_kubeconfig() {
        let executor = KubectlExecutor::new("kubectl", Duration::from_secs(5))
            .with_kubeconfig("/home/dev/.kube/lab");
        let target = ExecTarget::new("lab", "alpine-lab-0").with_container("main");

        let args = executor.build_args(&target, "cat /proc/loadavg");

        assert_eq!(
            args,
            vec![
                "--kubeconfig",
                "/home/dev/.kube/lab",
                "exec",
                "-n",
                "lab",
                "alpine-lab-0",
                "-c",
                "main",
                "--",
                "sh",
                "-c",
                "cat /proc/loadavg",
            ]
        );
    }

    #[test]
    fn test_build_args_minimal() {
        let executor = KubectlExecutor::new("kubectl", Duration::from_secs(5));
        let args = executor.build_args(&ExecTarget::new("default", "web-1"), "free -m");

        assert_eq!(args[..4], ["exec", "-n", "default", "web-1"]);
        assert_eq!(args.last().map(String::as_str), Some("free -m"));
    }

    #[test]
    fn test_normalize_output() {
        assert_eq!(normalize_output("0.1 0.2 0.3\n"), Some("0.1 0.2 0.3".to_string()));
        assert_eq!(normalize_output("  indented  \n\n"), Some("  indented".to_string()));
        assert_eq!(normalize_output(" \n\t"), None);
        assert_eq!(normalize_output(""), None);
    }

    #[tokio::test]
    async fn test_missing_kubectl_yields_no_output() {
        let executor = KubectlExecutor::new(
            "/nonexistent/path/to/kubectl",
            Duration::from_secs(1),
        );
        let output = executor
            .exec(&ExecTarget::new("default", "nope"), "true")
            .await;

        assert!(output.is_none());
    }

    /// Write an executable shell script standing in for kubectl
    #[cfg(unix)]
    fn fake_kubectl(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        use std::io::Write as _;
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("kubectl");
        {
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "#!/bin/sh\n{}", body).unwrap();
            file.sync_all().unwrap();
        }
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_exec_returns_trimmed_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let executor = KubectlExecutor::new(
            fake_kubectl(&dir, "printf '0.1 0.2 0.3\\n\\n'"),
            Duration::from_secs(5),
        );

        let output = executor
            .exec(&ExecTarget::new("lab", "alpine-lab-0"), "cat /proc/loadavg")
            .await;

        assert_eq!(output.as_deref(), Some("0.1 0.2 0.3"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exec_passes_target_and_command() {
        let dir = tempfile::tempdir().unwrap();
        let executor = KubectlExecutor::new(
            fake_kubectl(&dir, "printf '%s\\n' \"$@\""),
            Duration::from_secs(5),
        );
        let target = ExecTarget::new("lab", "alpine-lab-0").with_container("main");

        let output = executor.exec(&target, "free -m").await.unwrap();
        let args: Vec<&str> = output.lines().collect();

        assert_eq!(
            args,
            vec!["exec", "-n", "lab", "alpine-lab-0", "-c", "main", "--", "sh", "-c", "free -m"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_yields_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let executor = KubectlExecutor::new(
            fake_kubectl(&dir, "echo partial\nexit 3"),
            Duration::from_secs(5),
        );

        let output = executor
            .exec(&ExecTarget::new("lab", "alpine-lab-0"), "free -m")
            .await;

        assert!(output.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_command() {
        let dir = tempfile::tempdir().unwrap();
        let executor = KubectlExecutor::new(
            fake_kubectl(&dir, "exec sleep 30"),
            Duration::from_secs(1),
        );

        let start = std::time::Instant::now();
        let output = executor
            .exec(&ExecTarget::new("lab", "alpine-lab-0"), "true")
            .await;

        assert!(output.is_none());
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
