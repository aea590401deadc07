//! Retry logic with linear backoff
//!
//! Every remote fetch in a harvest run goes through [`fetch_with_retry`]:
//!
//! - a constant politeness delay (`request_delay`) is slept before **every** attempt
//! - after failed attempt `n` the loop waits `retry_delay * n` before attempt `n + 1`
//! - at most `retry_attempts` attempts are made; the last error is returned
//!
//! # Example
//!
//! ```no_run
//! use catalog_harvester::config::RetryConfig;
//! use catalog_harvester::retry::{IsRetryable, fetch_with_retry};
//!
//! #[derive(Debug)]
//! struct Flaky;
//!
//! impl std::fmt::Display for Flaky {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "flaky")
//!     }
//! }
//!
//! impl IsRetryable for Flaky {
//!     fn is_retryable(&self) -> bool {
//!         true
//!     }
//! }
//!
//! # async fn example() -> Result<(), Flaky> {
//! let config = RetryConfig::default();
//! let body = fetch_with_retry(&config, "https://example.com", || async {
//!     Ok::<_, Flaky>(b"page".to_vec())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use crate::fetch::Fetcher;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, non-2xx responses, connection resets) return `true`.
/// Failures that cannot change between attempts (malformed URL, bad config) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Every transport failure is worth another try except a request that
            // could not even be built
            Error::Network(e) => !e.is_builder(),
            // Any non-2xx status, including 404, is retried
            Error::HttpStatus { .. } => true,
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Storage(_) => true,
            Error::Config { .. } => false,
            Error::Serialization(_) => false,
            Error::InvalidUrl(_) => false,
            Error::ExternalTool(_) => false,
            Error::NoTasks => false,
            Error::Other(_) => false,
        }
    }
}

/// Execute an async operation with linear backoff retry logic
///
/// # Arguments
///
/// * `config` - Retry configuration (attempts, base delay, politeness delay, jitter)
/// * `target` - What is being fetched, for log context (usually the URL)
/// * `operation` - Async closure that returns `Result<T, E>` where `E` implements [`IsRetryable`]
///
/// # Returns
///
/// The first successful result, or the last error once all attempts are used up or
/// a non-retryable error is seen. `retry_attempts == 0` is treated as a single attempt.
pub async fn fetch_with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    target: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = config.retry_attempts.max(1);
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        if !config.request_delay.is_zero() {
            tokio::time::sleep(config.request_delay).await;
        }

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(target_url = target, attempts = attempt, "fetch succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = backoff_delay(config, attempt);
                tracing::warn!(
                    target_url = target,
                    error = %e,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "fetch attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!(
                        target_url = target,
                        error = %e,
                        attempts = attempt,
                        "fetch failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::warn!(
                        target_url = target,
                        error = %e,
                        attempt,
                        "fetch failed with non-retryable error"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Fetch `url` through `fetcher` with the configured retry policy
pub async fn retry_fetch(
    fetcher: &dyn Fetcher,
    config: &RetryConfig,
    url: &str,
    timeout: Duration,
) -> crate::Result<Vec<u8>> {
    fetch_with_retry(config, url, || fetcher.fetch(url, timeout)).await
}

/// Wait after failed attempt `attempt` (1-based): `retry_delay * attempt`, optionally jittered
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let base = config.retry_delay.saturating_mul(attempt);
    if config.jitter { add_jitter(base) } else { base }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
