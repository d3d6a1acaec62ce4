//! Persistence of snapshot batches as JSON files
//!
//! Each flush writes one pretty-printed JSON array to a file named after the
//! local wall-clock time, e.g. `metrics_20240301_120000.json`. Files are
//! written to a temporary sibling first and renamed into place.

use crate::models::MetricsSnapshot;
use chrono::{DateTime, Local};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Failure to persist a batch
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize snapshots: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// What triggered a flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    /// Every `flush_every` snapshots during polling
    Periodic,
    /// The full history, written on shutdown
    Final,
}

impl BatchKind {
    pub fn file_prefix(&self) -> &'static str {
        match self {
            BatchKind::Periodic => "metrics",
            BatchKind::Final => "all_metrics",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchKind::Periodic => "periodic",
            BatchKind::Final => "final",
        }
    }
}

/// Writes snapshot batches into a fixed output directory
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    output_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Write a batch stamped with the current local time
    pub fn write_batch(
        &self,
        kind: BatchKind,
        snapshots: &[MetricsSnapshot],
    ) -> Result<PathBuf, StoreError> {
        self.write_batch_at(kind, snapshots, Local::now())
    }

    /// Write a batch stamped with `at`
    pub fn write_batch_at(
        &self,
        kind: BatchKind,
        snapshots: &[MetricsSnapshot],
        at: DateTime<Local>,
    ) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.output_dir).map_err(|source| StoreError::Io {
            path: self.output_dir.clone(),
            source,
        })?;

        let body = serde_json::to_vec_pretty(snapshots)?;
        let path = self.unused_path(&batch_file_name(kind, at));
        let tmp_path = path.with_extension("json.tmp");

        write_synced(&tmp_path, &body).map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::Io {
                path: tmp_path.clone(),
                source,
            }
        })?;

        fs::rename(&tmp_path, &path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), snapshots = snapshots.len(), "Batch written");
        Ok(path)
    }

    /// Pick a file name that does not exist yet, appending `_N` on collision
    fn unused_path(&self, file_name: &str) -> PathBuf {
        let candidate = self.output_dir.join(file_name);
        if !candidate.exists() {
            return candidate;
        }

        let stem = file_name.trim_end_matches(".json");
        (1..)
            .map(|n| self.output_dir.join(format!("{}_{}.json", stem, n)))
            .find(|p| !p.exists())
            .unwrap_or(candidate)
    }
}

/// File name for a batch, e.g. `all_metrics_20240301_120000.json`
pub fn batch_file_name(kind: BatchKind, at: DateTime<Local>) -> String {
    format!("{}_{}.json", kind.file_prefix(), at.format("%Y%m%d_%H%M%S"))
}

fn write_synced(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(body)?;
    writer.flush()?;
    writer.get_ref().sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CpuMetrics, MemoryMetrics};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn snapshot(cpu: f64) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            pod: "alpine-lab-0".to_string(),
            namespace: "default".to_string(),
            cpu: CpuMetrics {
                usage_percent: Some(cpu),
                load_1min: Some(0.5),
                ..Default::default()
            },
            memory: Some(MemoryMetrics {
                total_mb: 2000,
                used_mb: 1500,
                free_mb: 500,
                usage_percent: 75.0,
            }),
            disk: None,
            processes: vec![],
        }
    }

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 1, 9, 5, 7).unwrap()
    }

    #[test]
    fn test_batch_file_name() {
        assert_eq!(
            batch_file_name(BatchKind::Periodic, fixed_time()),
            "metrics_20240301_090507.json"
        );
        assert_eq!(
            batch_file_name(BatchKind::Final, fixed_time()),
            "all_metrics_20240301_090507.json"
        );
    }

    #[test]
    fn test_write_batch_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        let batch = vec![snapshot(1.0), snapshot(2.0), snapshot(3.0)];

        let path = store
            .write_batch_at(BatchKind::Periodic, &batch, fixed_time())
            .unwrap();

        assert_eq!(path, dir.path().join("metrics_20240301_090507.json"));
        let content = fs::read_to_string(&path).unwrap();
        let parsed: Vec<MetricsSnapshot> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, batch);

        // No temporary file left behind
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_write_batch_json_shape() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());

        let path = store
            .write_batch_at(BatchKind::Final, &[snapshot(4.0)], fixed_time())
            .unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();

        let first = &value.as_array().unwrap()[0];
        assert_eq!(first["cpu"]["usage_percent"], 4.0);
        assert_eq!(first["memory"]["total_mb"], 2000);
        assert_eq!(first["disk"], serde_json::json!({}));
        assert!(first["processes"].is_array());
    }

    #[test]
    fn test_write_batch_same_second_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());

        let first = store
            .write_batch_at(BatchKind::Periodic, &[snapshot(1.0)], fixed_time())
            .unwrap();
        let second = store
            .write_batch_at(BatchKind::Periodic, &[snapshot(2.0)], fixed_time())
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(second, dir.path().join("metrics_20240301_090507_1.json"));
    }

    #[test]
    fn test_write_batch_creates_output_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = SnapshotStore::new(&nested);

        let path = store.write_batch(BatchKind::Final, &[]).unwrap();

        assert!(path.starts_with(&nested));
        assert_eq!(fs::read_to_string(path).unwrap().trim(), "[]");
    }

    #[test]
    fn test_write_batch_unwritable_dir_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "x").unwrap();
        let store = SnapshotStore::new(&blocker);

        let err = store
            .write_batch(BatchKind::Periodic, &[snapshot(1.0)])
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }
}
