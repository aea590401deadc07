//! Task discovery -- walks each category's paginated listing and emits tasks.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::extract::Extractor;
use crate::fetch::Fetcher;
use crate::retry::retry_fetch;
use crate::types::Task;

/// Builds the master task list from the configured categories
pub struct TaskEnumerator<'a> {
    config: &'a Config,
    fetcher: &'a dyn Fetcher,
    extractor: &'a dyn Extractor,
}

impl<'a> TaskEnumerator<'a> {
    /// Create an enumerator over the given collaborators
    pub fn new(config: &'a Config, fetcher: &'a dyn Fetcher, extractor: &'a dyn Extractor) -> Self {
        Self {
            config,
            fetcher,
            extractor,
        }
    }

    /// Enumerate every category in order.
    ///
    /// A category whose first listing page cannot be fetched is skipped; a later
    /// page that fails contributes no tasks. Duplicate `(category, item_id)` pairs
    /// are dropped, keeping the first occurrence. Returns early with what has been
    /// found so far if `cancel` fires.
    pub async fn enumerate(&self, cancel: &CancellationToken) -> Vec<Task> {
        tracing::info!(categories = self.config.categories.len(), "building task list");

        let mut tasks = Vec::new();
        let mut seen = HashSet::new();

        for category in &self.config.categories {
            if cancel.is_cancelled() {
                tracing::warn!("discovery interrupted");
                break;
            }
            for task in self.enumerate_category(category, cancel).await {
                if seen.insert(task.clone()) {
                    tasks.push(task);
                }
            }
        }

        tracing::info!(total_tasks = tasks.len(), "task list built");
        tasks
    }

    /// Enumerate a single category
    pub async fn enumerate_category(&self, category: &str, cancel: &CancellationToken) -> Vec<Task> {
        tracing::info!(category, "scanning category");

        let first_url = self.config.listing_url(category, 1);
        let first_page = match self.fetch_page(&first_url).await {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(category, url = %first_url, error = %e, "failed to fetch category, skipping");
                return Vec::new();
            }
        };

        let max_page = self.extractor.max_page_index(&first_page);
        tracing::info!(category, pages = max_page, "category pagination");

        let mut tasks = Vec::new();
        self.collect_links(category, 1, &first_page, &mut tasks);

        for page in 2..=max_page {
            if cancel.is_cancelled() {
                tracing::warn!(category, page, "discovery interrupted mid-category");
                break;
            }
            let url = self.config.listing_url(category, page);
            match self.fetch_page(&url).await {
                Ok(body) => self.collect_links(category, page, &body, &mut tasks),
                Err(e) => {
                    tracing::warn!(category, page, url = %url, error = %e, "listing page failed, continuing");
                }
            }
        }

        tasks
    }

    fn collect_links(&self, category: &str, page: u32, body: &[u8], tasks: &mut Vec<Task>) {
        let links = self.extractor.enumerate_links(body);
        tracing::debug!(category, page, items = links.len(), "listing page parsed");
        tasks.extend(links.into_iter().map(|id| Task::new(category, id)));
    }

    async fn fetch_page(&self, url: &str) -> crate::Result<Vec<u8>> {
        retry_fetch(
            self.fetcher,
            &self.config.retry,
            url,
            self.config.timeouts.page_timeout,
        )
        .await
    }
}
