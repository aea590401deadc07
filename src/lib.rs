//! # catalog-harvester
//!
//! Resumable, concurrent harvester for paginated media catalogs.
//!
//! A run walks every configured category's listing pages, turns the linked items
//! into tasks, and drains them with a pool of workers. Each worker fetches the
//! item page, extracts a [`Record`](types::Record), downloads the payload, stores
//! it (object store and/or local disk) and writes a metadata artifact. Progress is
//! kept in a single JSON snapshot so an interrupted run resumes where it stopped,
//! and is periodically committed and pushed to a git mirror.
//!
//! ## Quick Start
//!
//! ```no_run
//! use catalog_harvester::{Config, Harvester, run_with_shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(std::path::Path::new("config.json"))?;
//!     let harvester = Harvester::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = harvester.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = run_with_shutdown(&harvester).await?;
//!     println!("{} harvested, {} failed", summary.successful, summary.failed);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Git checkpoints of progress and metadata
pub mod checkpoint;
/// Configuration types
pub mod config;
/// Category listing traversal
pub mod discovery;
/// Error types
pub mod error;
/// Record extraction from HTML pages
pub mod extract;
/// HTTP page and payload fetching
pub mod fetch;
/// Worker pool and run orchestration
pub mod harvester;
/// Durable progress snapshot
pub mod progress;
/// Retry logic with linear backoff
pub mod retry;
/// Payload and metadata sinks
pub mod storage;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use checkpoint::{CheckpointOutcome, GitReplicator, NoOpReplicator, Replicator};
pub use config::Config;
pub use error::{Error, FailureReason, Result};
pub use extract::{Extractor, HtmlExtractor};
pub use fetch::{Fetcher, HttpFetcher};
pub use harvester::{Harvester, HarvesterBuilder};
pub use progress::ProgressStore;
pub use storage::{HttpObjectStore, LocalStore, ObjectStore};
pub use types::{Event, HarvestSummary, Outcome, Record, Task};

/// Run a harvest, cancelling it gracefully on a termination signal.
///
/// On the first signal workers finish their in-flight item, skip the rest of the
/// queue, and the run still flushes progress and performs its final checkpoint.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(harvester: &Harvester) -> Result<HarvestSummary> {
    let token = harvester.cancel_token();
    let signal_task = tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_signal() => {
                tracing::warn!("finishing in-flight items, remaining tasks will be skipped");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    });

    let result = harvester.run().await;
    signal_task.abort();
    result
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
