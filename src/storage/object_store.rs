//! Object store uploads over plain HTTP PUT.

use async_trait::async_trait;

use crate::config::ObjectStoreConfig;
use crate::error::{Error, Result};

/// Remote key/value sink for payload bytes
///
/// Writes to distinct keys may run concurrently; the pipeline never writes the
/// same key from two workers.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`, overwriting any existing object
    async fn put_object(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// [`ObjectStore`] that PUTs each object to an S3-compatible URL
///
/// Requests are not signed; authentication, if any, goes in the configured
/// `Authorization` header (e.g. a gateway token or a bucket policy allowing
/// writes from the harvesting host).
pub struct HttpObjectStore {
    client: reqwest::Client,
    config: ObjectStoreConfig,
}

impl HttpObjectStore {
    /// Create a store for the configured bucket
    pub fn new(config: ObjectStoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, config })
    }

    /// Share an existing client
    pub fn with_client(client: reqwest::Client, config: ObjectStoreConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put_object(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let url = self.config.object_url(key);

        let mut request = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, &self.config.content_type)
            .body(bytes.to_vec())
            .timeout(self.config.timeout);

        if let Some(auth) = &self.config.auth_header {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Storage(format!("upload of '{key}' failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Storage(format!(
                "upload of '{key}' returned status {status}: {body}"
            )));
        }

        tracing::info!(key, bucket = %self.config.bucket, bytes = bytes.len(), "uploaded to object store");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http-object-store"
    }
}
