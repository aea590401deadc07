//! Core types and events for catalog-harvester

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::error::FailureReason;

/// One unit of work: an item inside a category
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Task {
    /// Category ("letter") the item was discovered under
    pub category: String,
    /// Item identifier, unique within the category
    pub item_id: String,
}

impl Task {
    /// Create a new task
    pub fn new(category: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            item_id: item_id.into(),
        }
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.category, self.item_id)
    }
}

/// Parsed metadata and payload reference for one item
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Item identifier
    pub item_id: String,
    /// Absolute URL of the binary payload
    pub payload_url: String,
    /// Human-readable description, if the page has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Related item identifiers, in page order
    #[serde(default)]
    pub related_ids: Vec<String>,
    /// Categories the item belongs to, in page order
    #[serde(default)]
    pub categories: Vec<String>,
    /// When the record was extracted
    pub discovered_at: DateTime<Utc>,
}

/// Metadata artifact persisted for every successfully harvested item
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetadataArtifact {
    /// Category the item was harvested under
    pub category: String,
    /// The extracted record
    #[serde(flatten)]
    pub record: Record,
    /// Object store key, when the payload was uploaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_key: Option<String>,
    /// Local payload path, when the payload was saved locally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    /// Payload size in bytes
    pub payload_size: u64,
    /// Lowercase hex SHA-256 of the payload
    pub payload_sha256: String,
}

/// Result of processing one task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    /// Payload and metadata persisted
    Success,
    /// Item was completed in an earlier run; nothing fetched
    AlreadyDone,
    /// Item not processed because the run is shutting down
    Skipped,
    /// Item failed for the given reason
    Failed(FailureReason),
}

impl Outcome {
    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::AlreadyDone => "already_done",
            Outcome::Skipped => "skipped",
            Outcome::Failed(reason) => reason.as_str(),
        }
    }
}

/// A failed item as recorded in the progress snapshot
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailedItem {
    /// Item identifier
    pub item_id: String,
    /// Why it failed
    pub reason: FailureReason,
    /// When the failure was recorded
    pub timestamp: DateTime<Utc>,
}

/// Aggregate counters for the current run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Tasks that produced an outcome
    pub total: u64,
    /// Tasks that ended in `Success`
    pub successful: u64,
    /// Tasks that ended in `Failed`
    pub failed: u64,
    /// Tasks that ended in `AlreadyDone` or `Skipped`
    pub skipped: u64,
}

/// Durable point-in-time progress state
///
/// Invariants maintained by the mutation methods:
/// - `completed_item_ids` never shrinks
/// - an id is in at most one of `completed_item_ids` / `failed_items`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// When this progress file was first created
    pub started_at: DateTime<Utc>,
    /// Last flush time
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    /// Items harvested successfully, in any run
    #[serde(default)]
    pub completed_item_ids: BTreeSet<String>,
    /// Items whose latest attempt failed
    #[serde(default)]
    pub failed_items: Vec<FailedItem>,
    /// Counters for the most recent run
    #[serde(default)]
    pub stats: RunStats,
}

impl ProgressSnapshot {
    /// An empty snapshot started now
    pub fn fresh() -> Self {
        Self {
            started_at: Utc::now(),
            last_updated: None,
            completed_item_ids: BTreeSet::new(),
            failed_items: Vec::new(),
            stats: RunStats::default(),
        }
    }

    /// Whether `item_id` was completed in this or an earlier run
    pub fn is_completed(&self, item_id: &str) -> bool {
        self.completed_item_ids.contains(item_id)
    }

    /// Mark `item_id` completed, clearing any earlier failure.
    ///
    /// Returns `false` if the item was already completed.
    pub fn mark_success(&mut self, item_id: &str) -> bool {
        self.failed_items.retain(|f| f.item_id != item_id);
        self.completed_item_ids.insert(item_id.to_string())
    }

    /// Record a failure for `item_id`, replacing any earlier failure entry.
    ///
    /// Returns `false` (and changes nothing) if the item is already completed.
    pub fn mark_failure(&mut self, item_id: &str, reason: FailureReason) -> bool {
        if self.completed_item_ids.contains(item_id) {
            return false;
        }
        self.failed_items.retain(|f| f.item_id != item_id);
        self.failed_items.push(FailedItem {
            item_id: item_id.to_string(),
            reason,
            timestamp: Utc::now(),
        });
        true
    }

    /// Fold one outcome into the run counters
    pub fn count_outcome(&mut self, outcome: &Outcome) {
        self.stats.total += 1;
        match outcome {
            Outcome::Success => self.stats.successful += 1,
            Outcome::AlreadyDone | Outcome::Skipped => self.stats.skipped += 1,
            Outcome::Failed(_) => self.stats.failed += 1,
        }
    }
}

/// Summary returned by a finished run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestSummary {
    /// Tasks that produced an outcome
    pub total: u64,
    /// Successful tasks
    pub successful: u64,
    /// Failed tasks
    pub failed: u64,
    /// Already-done and skipped tasks
    pub skipped: u64,
    /// Whether the run was cut short by a shutdown request
    pub interrupted: bool,
}

impl HarvestSummary {
    /// Build a summary from run counters
    pub fn from_stats(stats: RunStats, interrupted: bool) -> Self {
        Self {
            total: stats.total,
            successful: stats.successful,
            failed: stats.failed,
            skipped: stats.skipped,
            interrupted,
        }
    }
}

/// Events emitted during a harvest run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Task discovery finished
    DiscoveryComplete {
        /// Number of tasks that will be enqueued
        tasks: usize,
    },

    /// A worker started draining the queue
    WorkerStarted {
        /// Worker index
        worker_id: usize,
    },

    /// A task produced an outcome
    ItemFinished {
        /// Worker that processed the task
        worker_id: usize,
        /// The task
        task: Task,
        /// What happened
        outcome: Outcome,
    },

    /// A checkpoint ran
    Checkpoint {
        /// Commit message used
        message: String,
        /// Whether a commit was created
        committed: bool,
        /// Whether the push succeeded
        pushed: bool,
    },

    /// A worker observed its stop sentinel
    WorkerFinished {
        /// Worker index
        worker_id: usize,
        /// Successful items processed by this worker
        processed: u64,
    },

    /// The run finished (normally or after interruption)
    Finished {
        /// Final counters
        summary: HarvestSummary,
    },
}
