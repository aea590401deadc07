//! Progress store -- durable, idempotent record of harvested items.
//!
//! The store owns the only in-memory [`ProgressSnapshot`] and is shared by all
//! workers behind an `Arc`. Every mutation takes the snapshot lock once, so
//! concurrent updates are never lost. [`ProgressStore::flush`] copies a consistent
//! snapshot under the lock and writes it with an atomic temp-file-then-rename, so
//! the progress file on disk is always a complete, parseable document.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::{FailureReason, Result};
use crate::types::{Outcome, ProgressSnapshot, RunStats};
use crate::utils::atomic_write;

/// Shared progress state backed by a JSON file
pub struct ProgressStore {
    path: PathBuf,
    snapshot: Mutex<ProgressSnapshot>,
    /// Serialises flushes so two writers never race on the same target
    flush_lock: Mutex<()>,
}

impl ProgressStore {
    /// Load the snapshot at `path`, or start a fresh one if the file does not exist.
    ///
    /// A file that exists but cannot be parsed is an error: silently starting over
    /// would re-harvest everything already completed.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let snapshot = match tokio::fs::read(&path).await {
            Ok(raw) => {
                let snapshot: ProgressSnapshot = serde_json::from_slice(&raw).map_err(|e| {
                    tracing::error!(path = %path.display(), error = %e, "progress file is corrupt");
                    e
                })?;
                tracing::info!(
                    path = %path.display(),
                    completed = snapshot.completed_item_ids.len(),
                    failed = snapshot.failed_items.len(),
                    "loaded existing progress"
                );
                snapshot
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no progress file, starting fresh");
                ProgressSnapshot::fresh()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self::from_snapshot(path, snapshot))
    }

    /// Wrap an in-memory snapshot that will be flushed to `path`
    pub fn from_snapshot(path: impl Into<PathBuf>, snapshot: ProgressSnapshot) -> Self {
        Self {
            path: path.into(),
            snapshot: Mutex::new(snapshot),
            flush_lock: Mutex::new(()),
        }
    }

    /// Location of the progress file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `item_id` has been completed in this or an earlier run
    pub async fn is_completed(&self, item_id: &str) -> bool {
        self.snapshot.lock().await.is_completed(item_id)
    }

    /// Mark `item_id` completed and count a success
    pub async fn record_success(&self, item_id: &str) {
        let mut snap = self.snapshot.lock().await;
        if !snap.mark_success(item_id) {
            tracing::debug!(item_id, "item was already marked completed");
        }
        snap.count_outcome(&Outcome::Success);
    }

    /// Record a failure for `item_id` and count it
    pub async fn record_failure(&self, item_id: &str, reason: FailureReason) {
        let mut snap = self.snapshot.lock().await;
        if !snap.mark_failure(item_id, reason) {
            tracing::warn!(item_id, %reason, "ignoring failure for an item already completed");
        }
        snap.count_outcome(&Outcome::Failed(reason));
    }

    /// Count an item that was not processed (already done or skipped)
    pub async fn record_skipped(&self, outcome: Outcome) {
        self.snapshot.lock().await.count_outcome(&outcome);
    }

    /// Apply any outcome for `item_id`
    pub async fn record_outcome(&self, item_id: &str, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.record_success(item_id).await,
            Outcome::Failed(reason) => self.record_failure(item_id, reason).await,
            Outcome::AlreadyDone | Outcome::Skipped => self.record_skipped(outcome).await,
        }
    }

    /// Zero the run counters, keeping the completed and failed sets
    pub async fn reset_run_stats(&self) {
        self.snapshot.lock().await.stats = RunStats::default();
    }

    /// Current run counters
    pub async fn stats(&self) -> RunStats {
        self.snapshot.lock().await.stats
    }

    /// Consistent copy of the whole snapshot
    pub async fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot.lock().await.clone()
    }

    /// Atomically write the current snapshot, stamped with the current time
    pub async fn flush(&self) -> Result<()> {
        let _flush_guard = self.flush_lock.lock().await;

        let copy = {
            let mut snap = self.snapshot.lock().await;
            snap.last_updated = Some(Utc::now());
            snap.clone()
        };

        let json = serde_json::to_vec_pretty(&copy)?;
        atomic_write(&self.path, &json).await?;

        tracing::debug!(
            path = %self.path.display(),
            completed = copy.completed_item_ids.len(),
            failed = copy.failed_items.len(),
            "progress flushed"
        );
        Ok(())
    }
}
