//! Worker loop and the per-item harvesting pipeline.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;

use super::HarvestContext;
use super::queue::{QueueItem, TaskQueue};
use crate::error::{FailureReason, Result};
use crate::retry::retry_fetch;
use crate::types::{Event, MetadataArtifact, Outcome, Task};
use crate::utils::sha256_hex;

/// Where a payload ended up
#[derive(Debug, Default)]
struct StoredPayload {
    object_key: Option<String>,
    local_path: Option<PathBuf>,
}

/// Drain `queue` until a stop sentinel is popped.
///
/// Returns the number of items this worker harvested successfully. After
/// cancellation every remaining task is counted as skipped without touching
/// the network.
pub(super) async fn run_worker(ctx: Arc<HarvestContext>, queue: Arc<TaskQueue>, worker_id: usize) -> u64 {
    tracing::info!(worker_id, "worker started");
    ctx.emit_event(Event::WorkerStarted { worker_id });

    let every = ctx.config.commit_every_n_successes.max(1);
    let mut successes: u64 = 0;

    loop {
        let Some(item) = queue.pop(ctx.config.timeouts.queue_pop_timeout).await else {
            tracing::trace!(worker_id, "queue empty, waiting");
            continue;
        };

        let task = match item {
            QueueItem::Stop => break,
            QueueItem::Task(task) => task,
        };

        let outcome = if ctx.cancel_token.is_cancelled() {
            Outcome::Skipped
        } else {
            process_guarded(&ctx, &task, worker_id).await
        };

        ctx.progress.record_outcome(&task.item_id, outcome).await;
        log_outcome(worker_id, &task, outcome);
        ctx.emit_event(Event::ItemFinished {
            worker_id,
            task: task.clone(),
            outcome,
        });

        if outcome == Outcome::Success {
            successes += 1;
            if successes % every == 0 {
                let message = format!(
                    "Progress: {} - {} items from worker {}",
                    task.category, successes, worker_id
                );
                if let Err(e) = ctx.checkpoint(&message).await {
                    tracing::error!(worker_id, error = %e, "progress flush failed");
                }
            }
        }
    }

    tracing::info!(worker_id, processed = successes, "worker finished");
    ctx.emit_event(Event::WorkerFinished {
        worker_id,
        processed: successes,
    });
    successes
}

/// Run the pipeline, turning errors and panics into `Failed(internal_error)`
async fn process_guarded(ctx: &HarvestContext, task: &Task, worker_id: usize) -> Outcome {
    match AssertUnwindSafe(process_item(ctx, task)).catch_unwind().await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            tracing::error!(worker_id, category = %task.category, item_id = %task.item_id, error = %e, "unexpected error processing item");
            Outcome::Failed(FailureReason::Internal)
        }
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(worker_id, category = %task.category, item_id = %task.item_id, panic = %detail, "item pipeline panicked");
            Outcome::Failed(FailureReason::Internal)
        }
    }
}

/// Fetch, extract, store and record a single item
async fn process_item(ctx: &HarvestContext, task: &Task) -> Result<Outcome> {
    if ctx.progress.is_completed(&task.item_id).await {
        return Ok(Outcome::AlreadyDone);
    }

    let config = &ctx.config;
    let page_url = config.item_url(&task.item_id);
    let page = match retry_fetch(
        ctx.fetcher.as_ref(),
        &config.retry,
        &page_url,
        config.timeouts.page_timeout,
    )
    .await
    {
        Ok(page) => page,
        Err(e) => {
            tracing::warn!(item_id = %task.item_id, url = %page_url, error = %e, "item page unavailable");
            return Ok(Outcome::Failed(FailureReason::FailedToFetchPage));
        }
    };

    let Some(record) = ctx.extractor.extract(&page, &task.item_id) else {
        tracing::warn!(item_id = %task.item_id, url = %page_url, "no payload reference on item page");
        return Ok(Outcome::Failed(FailureReason::NoVideoFound));
    };

    let payload = match retry_fetch(
        ctx.fetcher.as_ref(),
        &config.retry,
        &record.payload_url,
        config.timeouts.payload_timeout,
    )
    .await
    {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(item_id = %task.item_id, url = %record.payload_url, error = %e, "payload download failed");
            return Ok(Outcome::Failed(FailureReason::FailedToDownloadVideo));
        }
    };

    let stored = match persist_payload(ctx, task, &payload).await {
        Ok(stored) => stored,
        Err(e) => {
            tracing::warn!(item_id = %task.item_id, error = %e, "payload could not be stored");
            return Ok(Outcome::Failed(FailureReason::FailedToUpload));
        }
    };

    let artifact = MetadataArtifact {
        category: task.category.clone(),
        payload_size: payload.len() as u64,
        payload_sha256: sha256_hex(&payload),
        record,
        object_key: stored.object_key,
        local_path: stored.local_path,
    };
    let path = ctx.local.write_metadata(&artifact).await?;
    tracing::debug!(item_id = %task.item_id, path = %path.display(), "metadata written");

    Ok(Outcome::Success)
}

/// Write the payload to the configured sinks.
///
/// The object store is mandatory when enabled; the local copy is then best
/// effort. With no object store the local copy is mandatory.
async fn persist_payload(ctx: &HarvestContext, task: &Task, bytes: &[u8]) -> Result<StoredPayload> {
    let mut stored = StoredPayload::default();

    if let Some(store) = &ctx.object_store {
        let key = ctx.config.payload_key(&task.category, &task.item_id);
        store.put_object(&key, bytes).await?;
        stored.object_key = Some(key);
    }

    if ctx.config.storage.save_locally {
        match ctx
            .local
            .write_payload(&task.category, &task.item_id, bytes)
            .await
        {
            Ok(path) => stored.local_path = Some(path),
            Err(e) if stored.object_key.is_some() => {
                tracing::warn!(item_id = %task.item_id, error = %e, "local payload copy failed, keeping uploaded copy");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(stored)
}

fn log_outcome(worker_id: usize, task: &Task, outcome: Outcome) {
    match outcome {
        Outcome::Success => {
            tracing::info!(worker_id, category = %task.category, item_id = %task.item_id, "item harvested");
        }
        Outcome::Failed(reason) => {
            tracing::warn!(worker_id, category = %task.category, item_id = %task.item_id, %reason, "item failed");
        }
        Outcome::AlreadyDone | Outcome::Skipped => {
            tracing::debug!(worker_id, category = %task.category, item_id = %task.item_id, outcome = outcome.label(), "item not processed");
        }
    }
}
