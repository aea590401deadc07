//! Harvest orchestration split into focused submodules.
//!
//! - [`queue`] - FIFO task queue with stop sentinels
//! - [`worker`] - per-item pipeline and the worker loop
//! - [`lifecycle`] - discovery, worker spawning, final flush and checkpoint

mod lifecycle;
mod queue;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::{CheckpointOutcome, Replicator, replicator_from_config};
use crate::config::Config;
use crate::error::Result;
use crate::extract::{Extractor, HtmlExtractor};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::progress::ProgressStore;
use crate::storage::{HttpObjectStore, LocalStore, ObjectStore};
use crate::types::Event;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Everything a worker needs, built once per harvester and shared by `Arc`
pub(crate) struct HarvestContext {
    pub(crate) config: Arc<Config>,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) extractor: Arc<dyn Extractor>,
    /// Present exactly when `upload_to_object_store` is enabled
    pub(crate) object_store: Option<Arc<dyn ObjectStore>>,
    pub(crate) local: LocalStore,
    pub(crate) progress: Arc<ProgressStore>,
    pub(crate) replicator: Arc<dyn Replicator>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) cancel_token: CancellationToken,
}

impl HarvestContext {
    pub(crate) fn emit_event(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }

    /// Flush progress, then replicate it.
    ///
    /// Only a failed flush is returned; replication failures are logged and the
    /// next checkpoint tries again.
    pub(crate) async fn checkpoint(&self, message: &str) -> Result<()> {
        self.progress.flush().await?;

        let (committed, pushed) = match self.replicator.checkpoint(message).await {
            Ok(CheckpointOutcome::Committed { pushed }) => (true, pushed),
            Ok(CheckpointOutcome::NothingToCommit) => (false, false),
            Err(e) => {
                tracing::error!(
                    replicator = self.replicator.name(),
                    message,
                    error = %e,
                    "checkpoint failed"
                );
                (false, false)
            }
        };

        self.emit_event(Event::Checkpoint {
            message: message.to_string(),
            committed,
            pushed,
        });
        Ok(())
    }
}

/// Resumable, concurrent catalog harvester
///
/// Cloning is cheap; all clones share the same progress store, event channel and
/// cancellation token.
#[derive(Clone)]
pub struct Harvester {
    pub(crate) ctx: Arc<HarvestContext>,
}

impl Harvester {
    /// Wire up the production collaborators for `config`.
    ///
    /// Loads (or creates) the progress file, prepares the local directories and
    /// picks a replicator. A corrupt progress file is an error.
    pub async fn new(config: Config) -> Result<Self> {
        HarvesterBuilder::new(config).build().await
    }

    /// Start building a harvester with custom collaborators
    pub fn builder(config: Config) -> HarvesterBuilder {
        HarvesterBuilder::new(config)
    }

    /// Subscribe to harvest events
    ///
    /// Slow subscribers may miss events (`RecvError::Lagged`); the harvest never
    /// waits on them.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.ctx.event_tx.subscribe()
    }

    /// Token that requests a graceful stop when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.ctx.cancel_token.clone()
    }

    /// Request a graceful stop: in-flight items finish, queued ones are skipped
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested");
        self.ctx.cancel_token.cancel();
    }

    /// The shared progress store
    pub fn progress(&self) -> &ProgressStore {
        &self.ctx.progress
    }

    /// The configuration this harvester runs with
    pub fn config(&self) -> &Config {
        &self.ctx.config
    }
}

/// Builder for [`Harvester`]; unset collaborators get their production defaults
pub struct HarvesterBuilder {
    config: Config,
    fetcher: Option<Arc<dyn Fetcher>>,
    extractor: Option<Arc<dyn Extractor>>,
    object_store: Option<Arc<dyn ObjectStore>>,
    replicator: Option<Arc<dyn Replicator>>,
    progress: Option<ProgressStore>,
    cancel_token: Option<CancellationToken>,
}

impl HarvesterBuilder {
    /// Builder with every collaborator defaulted
    pub fn new(config: Config) -> Self {
        Self {
            config,
            fetcher: None,
            extractor: None,
            object_store: None,
            replicator: None,
            progress: None,
            cancel_token: None,
        }
    }

    /// Use a custom page/payload fetcher
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Use a custom page extractor
    pub fn extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Use a custom object store; ignored unless `upload_to_object_store` is set
    pub fn object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    /// Use a custom replicator instead of detecting git
    pub fn replicator(mut self, replicator: Arc<dyn Replicator>) -> Self {
        self.replicator = Some(replicator);
        self
    }

    /// Use an already-loaded progress store
    pub fn progress(mut self, progress: ProgressStore) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Share an external cancellation token
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    /// Build the harvester
    pub async fn build(self) -> Result<Harvester> {
        let config = self.config;

        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(f) => f,
            None => Arc::new(HttpFetcher::new(&config.site.user_agent)?),
        };

        let extractor: Arc<dyn Extractor> = match self.extractor {
            Some(e) => e,
            None => Arc::new(HtmlExtractor::new(&config.extraction, &config.base_url)?),
        };

        let object_store: Option<Arc<dyn ObjectStore>> = if config.storage.upload_to_object_store {
            match self.object_store {
                Some(s) => Some(s),
                None => Some(Arc::new(HttpObjectStore::new(
                    config.storage.object_store.clone(),
                )?)),
            }
        } else {
            None
        };

        let local = LocalStore::new(&config.paths, &config.storage.payload_extension);
        local.prepare(config.storage.save_locally).await?;

        let progress = match self.progress {
            Some(p) => p,
            None => ProgressStore::load(&config.paths.progress_file).await?,
        };

        let replicator = match self.replicator {
            Some(r) => r,
            None => {
                replicator_from_config(
                    &config.checkpoint,
                    vec![
                        config.paths.metadata_dir.clone(),
                        config.paths.progress_file.clone(),
                    ],
                )
                .await
            }
        };

        tracing::info!(
            workers = config.num_workers,
            categories = ?config.categories,
            object_store = object_store.as_ref().map(|s| s.name()),
            save_locally = config.storage.save_locally,
            replicator = replicator.name(),
            "harvester ready"
        );

        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Harvester {
            ctx: Arc::new(HarvestContext {
                config: Arc::new(config),
                fetcher,
                extractor,
                object_store,
                local,
                progress: Arc::new(progress),
                replicator,
                event_tx,
                cancel_token: self.cancel_token.unwrap_or_default(),
            }),
        })
    }
}
