//! In-memory snapshot history owned by the monitor loop

use crate::models::MetricsSnapshot;

/// Default number of snapshots written per periodic batch
pub const DEFAULT_FLUSH_EVERY: usize = 5;

/// Append-only, chronological list of collected snapshots
///
/// Knows when a periodic batch is due: every time its length reaches a
/// positive multiple of `flush_every`.
#[derive(Debug, Clone)]
pub struct MetricsHistory {
    snapshots: Vec<MetricsSnapshot>,
    flush_every: usize,
}

impl MetricsHistory {
    pub fn new(flush_every: usize) -> Self {
        Self {
            snapshots: Vec::new(),
            flush_every: flush_every.max(1),
        }
    }

    /// Append a snapshot, returning the batch to persist if one is now due
    pub fn push(&mut self, snapshot: MetricsSnapshot) -> Option<&[MetricsSnapshot]> {
        self.snapshots.push(snapshot);

        if self.snapshots.len() % self.flush_every == 0 {
            let start = self.snapshots.len() - self.flush_every;
            Some(&self.snapshots[start..])
        } else {
            None
        }
    }

    pub fn as_slice(&self) -> &[MetricsSnapshot] {
        &self.snapshots
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn flush_every(&self) -> usize {
        self.flush_every
    }
}

impl Default for MetricsHistory {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_EVERY)
    }
}
