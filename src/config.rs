//! Configuration types for catalog-harvester
//!
//! The configuration is a single JSON document loaded once at startup and never
//! mutated afterwards. Sub-configs are flattened so the on-disk format stays a
//! flat object for the commonly tuned keys (`num_workers`, `retry_attempts`, ...),
//! while the less frequently touched groups (`paths`, `checkpoint`, `extraction`,
//! `object_store`) are nested objects.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for a harvest run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Root URL of the catalog site (e.g. "https://catalog.example.com")
    pub base_url: String,

    /// Categories ("letters") to enumerate, in order
    #[serde(default)]
    pub categories: Vec<String>,

    /// Number of concurrent workers (default: 4)
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,

    /// Each worker checkpoints after every N of its own successes (default: 50)
    #[serde(default = "default_commit_every")]
    pub commit_every_n_successes: u64,

    /// Retry and politeness settings
    #[serde(flatten)]
    pub retry: RetryConfig,

    /// Network and queue timeouts
    #[serde(flatten)]
    pub timeouts: TimeoutConfig,

    /// URL layout of the remote catalog
    #[serde(flatten)]
    pub site: SiteConfig,

    /// Payload sinks
    #[serde(flatten)]
    pub storage: StorageConfig,

    /// Local file layout
    #[serde(default)]
    pub paths: PathsConfig,

    /// Git replication of the metadata tree and progress file
    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    /// Selectors used by the default HTML extractor
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            categories: Vec::new(),
            num_workers: default_num_workers(),
            commit_every_n_successes: default_commit_every(),
            retry: RetryConfig::default(),
            timeouts: TimeoutConfig::default(),
            site: SiteConfig::default(),
            storage: StorageConfig::default(),
            paths: PathsConfig::default(),
            checkpoint: CheckpointConfig::default(),
            extraction: ExtractionConfig::default(),
        }
    }
}

/// Retry configuration for page and payload fetches
///
/// Backoff is linear: the wait after failed attempt `n` is `retry_delay * n`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts per fetch, including the first (default: 3)
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Base backoff delay in seconds (default: 2.0)
    #[serde(default = "default_retry_delay", with = "duration_secs_serde")]
    pub retry_delay: Duration,

    /// Politeness delay in seconds applied before every attempt (default: 1.0)
    #[serde(default = "default_request_delay", with = "duration_secs_serde")]
    pub request_delay: Duration,

    /// Randomise each backoff by a factor in [1, 2] (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_delay: default_retry_delay(),
            request_delay: default_request_delay(),
            jitter: false,
        }
    }
}

/// Timeouts for network requests and queue polling
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Per-request timeout for listing and item pages (default: 30s)
    #[serde(default = "default_page_timeout", with = "duration_secs_serde")]
    pub page_timeout: Duration,

    /// Per-request timeout for payload downloads (default: 60s)
    #[serde(default = "default_payload_timeout", with = "duration_secs_serde")]
    pub payload_timeout: Duration,

    /// How long a worker blocks on an empty queue before re-checking (default: 5s)
    #[serde(default = "default_queue_pop_timeout", with = "duration_secs_serde")]
    pub queue_pop_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            page_timeout: default_page_timeout(),
            payload_timeout: default_payload_timeout(),
            queue_pop_timeout: default_queue_pop_timeout(),
        }
    }
}

/// URL layout of the remote catalog
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Path segment of listing pages: `<base>/<listing_path>/<category>[/<page>]`
    #[serde(default = "default_listing_path")]
    pub listing_path: String,

    /// Path segment of item pages: `<base>/<item_path>/<item_id>`
    #[serde(default = "default_item_path")]
    pub item_path: String,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            listing_path: default_listing_path(),
            item_path: default_item_path(),
            user_agent: default_user_agent(),
        }
    }
}

/// Payload sink selection
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Upload payloads to the object store (default: true)
    #[serde(default = "default_true")]
    pub upload_to_object_store: bool,

    /// Write payloads under `paths.payload_dir` (default: false)
    #[serde(default)]
    pub save_locally: bool,

    /// File extension for stored payloads, without the dot (default: "mp4")
    #[serde(default = "default_payload_extension")]
    pub payload_extension: String,

    /// Object store target
    #[serde(default)]
    pub object_store: ObjectStoreConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_to_object_store: true,
            save_locally: false,
            payload_extension: default_payload_extension(),
            object_store: ObjectStoreConfig::default(),
        }
    }
}

/// Object store (S3-compatible bucket) target
///
/// Uploads are plain PUTs; no SigV4 signing happens here. AWS S3 itself rejects
/// unsigned writes, so against AWS either point `endpoint` at a signing gateway
/// or proxy, or supply an `auth_header` that proxy accepts. Without either the
/// PUT only succeeds on a bucket whose policy allows anonymous writes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// Bucket region (default: "us-east-1")
    #[serde(default = "default_region")]
    pub region: String,

    /// Bucket name
    #[serde(default)]
    pub bucket: String,

    /// Custom endpoint (MinIO, a signing gateway); objects go to
    /// `<endpoint>/<bucket>/<key>` when set, otherwise straight to the AWS
    /// virtual-hosted URL derived from bucket and region
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Optional Authorization header value sent verbatim with each upload.
    /// Not an AWS credential: S3 needs per-request signatures.
    #[serde(default)]
    pub auth_header: Option<String>,

    /// Content-Type of uploaded payloads (default: "video/mp4")
    #[serde(default = "default_content_type")]
    pub content_type: String,

    /// Upload timeout in seconds (default: 120)
    #[serde(default = "default_upload_timeout", with = "duration_secs_serde")]
    pub timeout: Duration,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            bucket: String::new(),
            endpoint: None,
            auth_header: None,
            content_type: default_content_type(),
            timeout: default_upload_timeout(),
        }
    }
}

impl ObjectStoreConfig {
    /// Whether uploads would go unsigned and unauthenticated straight to AWS
    pub fn is_unsigned_aws(&self) -> bool {
        self.endpoint.is_none() && self.auth_header.is_none()
    }

    /// Full URL an object with `key` is PUT to
    ///
    /// Each `/`-separated segment is percent-encoded, so the stored key is `key`
    /// byte for byte.
    pub fn object_url(&self, key: &str) -> String {
        let segments: Vec<_> = key
            .trim_start_matches('/')
            .split('/')
            .map(urlencoding::encode)
            .collect();
        let key = segments.join("/");
        match &self.endpoint {
            Some(endpoint) => format!(
                "{}/{}/{}",
                endpoint.trim_end_matches('/'),
                self.bucket,
                key
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            ),
        }
    }
}

/// Local file layout
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Metadata artifacts: `<metadata_dir>/<category>/<item_id>.json` (default: "metadata")
    #[serde(default = "default_metadata_dir")]
    pub metadata_dir: PathBuf,

    /// Local payload copies (default: "videos")
    #[serde(default = "default_payload_dir")]
    pub payload_dir: PathBuf,

    /// Progress snapshot file (default: "progress.json")
    #[serde(default = "default_progress_file")]
    pub progress_file: PathBuf,

    /// Directory for run log files; `None` disables file logging (default: "logs")
    #[serde(default = "default_log_dir")]
    pub log_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            metadata_dir: default_metadata_dir(),
            payload_dir: default_payload_dir(),
            progress_file: default_progress_file(),
            log_dir: default_log_dir(),
        }
    }
}

/// Git replication settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Enable git commits and pushes (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Working tree of the mirror repository (default: ".")
    #[serde(default = "default_repo_dir")]
    pub repo_dir: PathBuf,

    /// Remote to push to (default: "origin")
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Branch to push; the current branch when unset
    #[serde(default)]
    pub branch: Option<String>,

    /// Commit author name override
    #[serde(default)]
    pub author_name: Option<String>,

    /// Commit author email override
    #[serde(default)]
    pub author_email: Option<String>,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            repo_dir: default_repo_dir(),
            remote: default_remote(),
            branch: None,
            author_name: None,
            author_email: None,
        }
    }
}

/// CSS selectors for [`HtmlExtractor`](crate::extract::HtmlExtractor)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Links whose href starts with this prefix are item links (default: "/sign/")
    #[serde(default = "default_item_link_prefix")]
    pub item_link_prefix: String,

    /// Anchors inside the pagination control (default: "ul.pagination a[href]")
    #[serde(default = "default_pagination_selector")]
    pub pagination_selector: String,

    /// Meta tags holding the payload URL in their `content`, tried in order
    #[serde(default = "default_payload_meta")]
    pub payload_meta: Vec<String>,

    /// Element holding the item description (meta `content` or element text)
    #[serde(default = "default_description_selector")]
    pub description_selector: String,

    /// Anchors naming related items
    #[serde(default = "default_related_selector")]
    pub related_selector: String,

    /// Anchors naming the item's categories
    #[serde(default = "default_categories_selector")]
    pub categories_selector: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            item_link_prefix: default_item_link_prefix(),
            pagination_selector: default_pagination_selector(),
            payload_meta: default_payload_meta(),
            description_selector: default_description_selector(),
            related_selector: default_related_selector(),
            categories_selector: default_categories_selector(),
        }
    }
}

impl Config {
    /// Read, parse and validate a JSON configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read config file '{}': {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("failed to parse config file '{}': {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the configured categories (lower-cased), as `--categories` does
    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories.into_iter().map(|c| c.to_lowercase()).collect();
        self
    }

    /// Check invariants that serde defaults cannot express
    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.base_url)
            .map_err(|e| Error::config("base_url", format!("invalid base_url: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::config(
                "base_url",
                format!("base_url must be http or https, got '{}'", parsed.scheme()),
            ));
        }
        if self.num_workers == 0 {
            return Err(Error::config("num_workers", "num_workers must be at least 1"));
        }
        if self.commit_every_n_successes == 0 {
            return Err(Error::config(
                "commit_every_n_successes",
                "commit_every_n_successes must be at least 1",
            ));
        }
        if self.storage.upload_to_object_store && self.storage.object_store.bucket.is_empty() {
            return Err(Error::config(
                "object_store.bucket",
                "object_store.bucket is required when upload_to_object_store is enabled",
            ));
        }
        if !self.storage.upload_to_object_store && !self.storage.save_locally {
            tracing::warn!("no payload sink enabled; only metadata will be persisted");
        }
        if self.storage.upload_to_object_store && self.storage.object_store.is_unsigned_aws() {
            tracing::warn!(
                bucket = %self.storage.object_store.bucket,
                "uploads go unsigned to AWS S3 and will be rejected unless the bucket allows anonymous writes; set object_store.endpoint to a signing gateway"
            );
        }
        Ok(())
    }

    /// Listing page URL; page 1 is the bare category URL
    pub fn listing_url(&self, category: &str, page: u32) -> String {
        let base = format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.site.listing_path.trim_matches('/'),
            category
        );
        if page <= 1 {
            base
        } else {
            format!("{base}/{page}")
        }
    }

    /// Item page URL
    pub fn item_url(&self, item_id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.site.item_path.trim_matches('/'),
            item_id
        )
    }

    /// Object key / relative path of a stored payload: `<category>/<item_id>.<ext>`
    pub fn payload_key(&self, category: &str, item_id: &str) -> String {
        format!(
            "{}/{}.{}",
            crate::utils::safe_path_component(category),
            crate::utils::safe_path_component(item_id),
            self.storage.payload_extension
        )
    }
}

fn default_num_workers() -> usize {
    4
}

fn default_commit_every() -> u64 {
    50
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_request_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_page_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_payload_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_queue_pop_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_upload_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_true() -> bool {
    true
}

fn default_listing_path() -> String {
    "dictionary".to_string()
}

fn default_item_path() -> String {
    "sign".to_string()
}

fn default_user_agent() -> String {
    concat!("catalog-harvester/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_payload_extension() -> String {
    "mp4".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_content_type() -> String {
    "video/mp4".to_string()
}

fn default_metadata_dir() -> PathBuf {
    PathBuf::from("metadata")
}

fn default_payload_dir() -> PathBuf {
    PathBuf::from("videos")
}

fn default_progress_file() -> PathBuf {
    PathBuf::from("progress.json")
}

fn default_log_dir() -> Option<PathBuf> {
    Some(PathBuf::from("logs"))
}

fn default_repo_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_item_link_prefix() -> String {
    "/sign/".to_string()
}

fn default_pagination_selector() -> String {
    "ul.pagination a[href]".to_string()
}

fn default_payload_meta() -> Vec<String> {
    vec![
        r#"meta[property="og:video"]"#.to_string(),
        r#"meta[name="twitter:player:stream"]"#.to_string(),
    ]
}

fn default_description_selector() -> String {
    r#"meta[property="og:description"]"#.to_string()
}

fn default_related_selector() -> String {
    ".related a".to_string()
}

fn default_categories_selector() -> String {
    ".categories a".to_string()
}

// Duration serialization helper: fractional seconds
mod duration_secs_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
