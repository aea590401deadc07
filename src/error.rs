//! Error types for catalog-harvester
//!
//! Two layers of failure exist in a harvest run:
//! - [`Error`] is the crate-wide error type returned by fallible operations
//!   (configuration loading, network calls, storage writes, git commands).
//! - [`FailureReason`] is the fixed per-item taxonomy recorded in the progress
//!   snapshot when a single task fails. It never aborts a run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for catalog-harvester operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for catalog-harvester
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "base_url")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level network error (connect, timeout, body read)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Remote server answered with a non-success status
    #[error("HTTP {status} for {url}")]
    HttpStatus {
        /// URL that was requested
        url: String,
        /// Status code returned by the server
        status: u16,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A URL could not be parsed or joined
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A storage sink rejected a write
    #[error("storage error: {0}")]
    Storage(String),

    /// External tool execution failed (git)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Discovery produced no tasks at all
    #[error("no tasks discovered")]
    NoTasks,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Why a single task failed.
///
/// Serialized in snake_case; these strings appear verbatim in the progress file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Item page unreachable after all retries
    FailedToFetchPage,
    /// Item page parsed but has no payload reference
    NoVideoFound,
    /// Payload unreachable after all retries
    FailedToDownloadVideo,
    /// The mandatory storage sink rejected the payload
    FailedToUpload,
    /// Unexpected error inside the item pipeline
    #[serde(rename = "internal_error")]
    Internal,
}

impl FailureReason {
    /// Stable string form used in logs and the progress file
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::FailedToFetchPage => "failed_to_fetch_page",
            FailureReason::NoVideoFound => "no_video_found",
            FailureReason::FailedToDownloadVideo => "failed_to_download_video",
            FailureReason::FailedToUpload => "failed_to_upload",
            FailureReason::Internal => "internal_error",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
