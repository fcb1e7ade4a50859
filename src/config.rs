//! Configuration types for pbs-resolver

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// GitHub API endpoint of the latest python-build-standalone release
pub const LATEST_RELEASE_URL: &str =
    "https://api.github.com/repos/indygreg/python-build-standalone/releases/latest";

/// Main configuration for [`Resolver`](crate::Resolver)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Maximum number of archives read concurrently (default: available parallelism)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Abort the whole run if it takes longer than this (None = no deadline)
    #[serde(default, with = "seconds::option")]
    pub deadline: Option<Duration>,

    /// Release listing endpoint used by [`Resolver::resolve_latest`](crate::Resolver::resolve_latest)
    #[serde(default = "default_release_url")]
    pub release_url: String,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Retry policy for opening archive streams
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            deadline: None,
            release_url: default_release_url(),
            http: HttpConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl ResolverConfig {
    /// Check settings that cannot be expressed in the type system
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::Config {
                message: "concurrency must be at least 1".to_string(),
                key: Some("concurrency".to_string()),
            });
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::Config {
                message: format!(
                    "backoff multiplier must be >= 1.0, got {}",
                    self.retry.backoff_multiplier
                ),
                key: Some("retry.backoff_multiplier".to_string()),
            });
        }
        if self.deadline == Some(Duration::ZERO) {
            return Err(Error::Config {
                message: "deadline must be greater than zero".to_string(),
                key: Some("deadline".to_string()),
            });
        }
        Ok(())
    }
}

/// HTTP client configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header sent with every request (GitHub rejects requests without one)
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// TCP connect timeout (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "seconds")]
    pub connect_timeout: Duration,

    /// Total per-request timeout including the body (None = unlimited)
    ///
    /// Full archives are large; only set this when a slow mirror should be
    /// treated as a failure.
    #[serde(default, with = "seconds::option")]
    pub request_timeout: Option<Duration>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            connect_timeout: default_connect_timeout(),
            request_timeout: None,
        }
    }
}

impl HttpConfig {
    /// Build a [`reqwest::Client`] from these settings
    pub fn build_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .user_agent(self.user_agent.as_str())
            .connect_timeout(self.connect_timeout);
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        builder.build().map_err(|e| Error::Config {
            message: format!("failed to create HTTP client: {e}"),
            key: Some("http".to_string()),
        })
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "seconds")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "seconds")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }
}

// Default value functions
fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_release_url() -> String {
    LATEST_RELEASE_URL.to_string()
}

fn default_user_agent() -> String {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

/// Durations are written as (possibly fractional) seconds
mod seconds {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    fn from_secs<E: serde::de::Error>(secs: f64) -> Result<Duration, E> {
        Duration::try_from_secs_f64(secs)
            .map_err(|e| E::custom(format!("invalid duration {secs}s: {e}")))
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        value.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        from_secs(f64::deserialize(deserializer)?)
    }

    /// `null` or absent means unset
    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            value.map(|d| d.as_secs_f64()).serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Option::<f64>::deserialize(deserializer)?
                .map(from_secs)
                .transpose()
        }
    }
}
