//! Retry logic with exponential backoff
//!
//! Opening an archive stream on a release CDN occasionally fails with a
//! timeout or a 5xx. Those failures are retried with exponential backoff and
//! optional jitter; everything else fails immediately.
//!
//! # Example
//!
//! ```no_run
//! use pbs_resolver::retry::{IsRetryable, with_retry};
//! use pbs_resolver::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{self:?}")
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! let result = with_retry(&config, || async {
//!     // Your operation here
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::FetchError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection resets, server busy) return `true`.
/// Permanent failures (not found, corrupt archive, bad JSON) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport(e) => e.is_timeout() || e.is_connect(),
            FetchError::Status(status) => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            // The archive itself is broken or incomplete; fetching it again won't help
            FetchError::Decompression(_)
            | FetchError::ArchiveRead(_)
            | FetchError::MetadataNotFound(_)
            | FetchError::Decode(_)
            | FetchError::Cancelled
            | FetchError::Task(_) => false,
        }
    }
}

/// Delays to wait before each retry of one operation
///
/// Yields `max_attempts` delays, starting at `initial_delay` and growing by
/// `backoff_multiplier` up to `max_delay`. Jitter, if enabled, is applied to
/// each yielded delay but does not feed into the next one.
#[derive(Debug)]
struct Backoff<'a> {
    config: &'a RetryConfig,
    base: Duration,
    remaining: u32,
}

impl<'a> Backoff<'a> {
    fn new(config: &'a RetryConfig) -> Self {
        Self {
            config,
            base: config.initial_delay.min(config.max_delay),
            remaining: config.max_attempts,
        }
    }
}

impl Iterator for Backoff<'_> {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        self.remaining = self.remaining.checked_sub(1)?;
        let delay = self.base;
        self.base = Duration::try_from_secs_f64(delay.as_secs_f64() * self.config.backoff_multiplier)
            .map_or(self.config.max_delay, |grown| grown.min(self.config.max_delay));
        Some(if self.config.jitter {
            add_jitter(delay)
        } else {
            delay
        })
    }
}

/// Run `operation`, retrying retryable failures with exponential backoff
///
/// Returns the first success, the first non-retryable error, or the last
/// error once `config.max_attempts` retries have been spent.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut delays = Backoff::new(config);
    let mut attempt: u32 = 1;

    loop {
        let error = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if !error.is_retryable() {
            tracing::debug!(error = %error, attempt, "Operation failed with non-retryable error");
            return Err(error);
        }
        let Some(delay) = delays.next() else {
            tracing::debug!(error = %error, attempts = attempt, "Retry attempts exhausted");
            return Err(error);
        };

        tracing::warn!(
            error = %error,
            attempt,
            max_attempts = config.max_attempts,
            ?delay,
            "Operation failed, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Stretch `delay` by a random factor in `[1, 2]`
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(1.0..=2.0);
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(delay)
}
