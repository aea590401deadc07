//! Run coordination: discovery, worker pool, final flush and checkpoint.

use std::sync::Arc;

use super::Harvester;
use super::queue::{QueueItem, TaskQueue};
use super::worker::run_worker;
use crate::discovery::TaskEnumerator;
use crate::error::{Error, Result};
use crate::types::{Event, HarvestSummary};

impl Harvester {
    /// Run one harvest to completion
    ///
    /// 1. Resets the run counters (completed and failed items are kept)
    /// 2. Enumerates tasks for every configured category
    /// 3. Drains them with `num_workers` concurrent workers
    /// 4. Flushes progress and runs a final checkpoint
    ///
    /// If the cancellation token fires, in-flight items finish, the rest are
    /// counted as skipped, and step 4 still runs; the summary is then marked
    /// `interrupted`.
    ///
    /// # Errors
    ///
    /// [`Error::NoTasks`] when discovery produced nothing (and was not
    /// interrupted); an I/O or serialization error if the final flush fails.
    pub async fn run(&self) -> Result<HarvestSummary> {
        let ctx = &self.ctx;
        let num_workers = ctx.config.num_workers.max(1);

        ctx.progress.reset_run_stats().await;

        let tasks = TaskEnumerator::new(&ctx.config, ctx.fetcher.as_ref(), ctx.extractor.as_ref())
            .enumerate(&ctx.cancel_token)
            .await;

        if tasks.is_empty() {
            if ctx.cancel_token.is_cancelled() {
                tracing::warn!("interrupted before any task was discovered");
                return self.finish().await;
            }
            tracing::error!(categories = ?ctx.config.categories, "no tasks discovered");
            if let Err(e) = ctx.progress.flush().await {
                tracing::error!(error = %e, "failed to save progress");
            }
            return Err(Error::NoTasks);
        }

        ctx.emit_event(Event::DiscoveryComplete { tasks: tasks.len() });

        let queue = Arc::new(TaskQueue::new());
        queue
            .extend(
                tasks
                    .into_iter()
                    .map(QueueItem::Task)
                    .chain(std::iter::repeat_n(QueueItem::Stop, num_workers)),
            )
            .await;
        tracing::info!(queued = queue.len().await, workers = num_workers, "starting workers");

        let handles: Vec<_> = (0..num_workers)
            .map(|worker_id| tokio::spawn(run_worker(ctx.clone(), queue.clone(), worker_id)))
            .collect();

        for (worker_id, handle) in handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                tracing::error!(worker_id, error = %e, "worker task aborted");
            }
        }

        self.finish().await
    }

    /// Final flush, final checkpoint and summary
    async fn finish(&self) -> Result<HarvestSummary> {
        let ctx = &self.ctx;
        let stats = ctx.progress.stats().await;

        let message = format!(
            "Final: {} items completed, {} failed",
            stats.successful, stats.failed
        );
        ctx.checkpoint(&message).await?;

        let summary = HarvestSummary::from_stats(stats, ctx.cancel_token.is_cancelled());
        tracing::info!(
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed,
            skipped = summary.skipped,
            interrupted = summary.interrupted,
            "harvest complete"
        );
        ctx.emit_event(Event::Finished { summary });

        Ok(summary)
    }
}
