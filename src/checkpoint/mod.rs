//! Checkpoint replication of progress and metadata
//!
//! A checkpoint stages the metadata tree and the progress file, commits them if
//! anything changed, and pushes the commit to a mirror. Push failures are logged
//! and reported in the [`CheckpointOutcome`], never raised: local state stays
//! authoritative and the next checkpoint pushes again.

mod git;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::CheckpointConfig;

pub use git::GitReplicator;

/// What a checkpoint did
#[must_use]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckpointOutcome {
    /// Staged state matched the last commit; nothing was committed
    NothingToCommit,
    /// A commit was created
    Committed {
        /// Whether the push to the mirror succeeded
        pushed: bool,
    },
}

/// Durable replication of harvest state
#[async_trait]
pub trait Replicator: Send + Sync {
    /// Stage, commit (if changed) and push, using `message` as the commit message
    async fn checkpoint(&self, message: &str) -> crate::Result<CheckpointOutcome>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Replicator that never does anything; used when replication is disabled
/// or unavailable
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpReplicator;

#[async_trait]
impl Replicator for NoOpReplicator {
    async fn checkpoint(&self, message: &str) -> crate::Result<CheckpointOutcome> {
        tracing::debug!(message, "replication disabled, checkpoint skipped");
        Ok(CheckpointOutcome::NothingToCommit)
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Pick a replicator for `config`, replicating `paths`.
///
/// Falls back to [`NoOpReplicator`] when replication is disabled, `git` is not
/// installed, or `repo_dir` is not inside a git work tree.
pub async fn replicator_from_config(
    config: &CheckpointConfig,
    paths: Vec<PathBuf>,
) -> Arc<dyn Replicator> {
    if !config.enabled {
        tracing::info!("git checkpoints disabled by configuration");
        return Arc::new(NoOpReplicator);
    }

    let Some(replicator) = GitReplicator::from_path(config, paths) else {
        tracing::warn!("git binary not found in PATH, checkpoints disabled");
        return Arc::new(NoOpReplicator);
    };

    if !replicator.is_repository().await {
        tracing::warn!(
            repo_dir = %config.repo_dir.display(),
            "not a git repository, checkpoints disabled"
        );
        return Arc::new(NoOpReplicator);
    }

    Arc::new(replicator)
}
