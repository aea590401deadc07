//! HTTP fetching of listing pages, item pages and payloads.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Abstraction over a single network fetch, enabling testability.
///
/// One call is one attempt; retries are layered on top by
/// [`retry_fetch`](crate::retry::retry_fetch).
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url` and return the body of a 2xx response
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>>;
}

/// Production [`Fetcher`] backed by a shared `reqwest::Client`
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher that sends `user_agent` with every request
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an existing client (shared connection pool)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        let response = self.client.get(url).timeout(timeout).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        tracing::debug!(url, bytes = body.len(), "fetched");
        Ok(body.to_vec())
    }
}
