//! Error types for pbs-resolver
//!
//! Every failure in classification, matching or fetching is fatal to a whole
//! [`Resolver::resolve`](crate::Resolver::resolve) call. The variants carry the
//! offending identifier (artifact name, group key or URL) together with the
//! underlying cause so a single error is enough to diagnose the run.

use std::time::Duration;
use thiserror::Error;

use crate::types::GroupKey;

/// Result type alias for pbs-resolver operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pbs-resolver
#[derive(Debug, Error)]
pub enum Error {
    /// An artifact name matched neither the full nor the install-only pattern,
    /// or carried an unknown optimization config token
    #[error("failed to parse artifact {name}: {reason}")]
    Parse {
        /// The artifact name that could not be parsed
        name: String,
        /// Why parsing failed
        reason: String,
    },

    /// Ranking could not be computed (empty candidate list or a record without a config)
    #[error("cannot rank build configs: {reason}")]
    ConfigOrdering {
        /// Why ranking failed
        reason: String,
    },

    /// An install-only build has no full build sharing its group key
    #[error("no full build found for {key}")]
    GroupMissing {
        /// The group key that has no full builds
        key: GroupKey,
    },

    /// A request to the release host failed, either for the release listing
    /// or while reading an archive's metadata
    #[error("request to {url} failed: {source}")]
    Fetch {
        /// The listing or archive URL that was being read
        url: String,
        /// The underlying failure
        #[source]
        source: FetchError,
    },

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "concurrency")
        key: Option<String>,
    },

    /// The caller cancelled the run before it completed
    #[error("resolution cancelled")]
    Cancelled,

    /// The configured deadline elapsed before the run completed
    #[error("resolution did not finish within {0:?}")]
    DeadlineExceeded(Duration),

    /// A pipeline task panicked or was aborted
    #[error("pipeline task failed: {0}")]
    Task(String),
}

/// Failures while streaming a single archive and extracting its metadata entry
#[derive(Debug, Error)]
pub enum FetchError {
    /// The HTTP request could not be sent or the body stream broke
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("unexpected HTTP status {0}")]
    Status(reqwest::StatusCode),

    /// The stream could not be wrapped in a decompressor
    #[error("decompression error: {0}")]
    Decompression(String),

    /// Reading the next archive entry failed
    #[error("archive read error: {0}")]
    ArchiveRead(#[source] std::io::Error),

    /// The archive ended without containing the metadata entry
    #[error("archive does not contain {0}")]
    MetadataNotFound(&'static str),

    /// The metadata entry is not valid JSON for the expected schema
    #[error("failed to decode metadata: {0}")]
    Decode(#[from] serde_json::Error),

    /// The fetch was abandoned because the run was cancelled
    #[error("fetch cancelled")]
    Cancelled,

    /// The blocking reader task panicked or was cancelled
    #[error("reader task failed: {0}")]
    Task(String),
}

impl Error {
    /// Wrap a [`FetchError`] with the URL it happened on
    pub fn fetch(url: impl Into<String>, source: FetchError) -> Self {
        Error::Fetch {
            url: url.into(),
            source,
        }
    }

    /// Machine-readable error code, stable across releases
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Parse { .. } => "parse_error",
            Error::ConfigOrdering { .. } => "config_ordering_error",
            Error::GroupMissing { .. } => "group_missing",
            Error::Fetch { source, .. } => source.error_code(),
            Error::Config { .. } => "config_error",
            Error::Cancelled => "cancelled",
            Error::DeadlineExceeded(_) => "deadline_exceeded",
            Error::Task(_) => "task_error",
        }
    }
}

impl FetchError {
    /// Machine-readable error code, stable across releases
    pub fn error_code(&self) -> &'static str {
        match self {
            FetchError::Transport(_) | FetchError::Status(_) => "transport_error",
            FetchError::Decompression(_) => "decompression_error",
            FetchError::ArchiveRead(_) => "archive_read_error",
            FetchError::MetadataNotFound(_) => "metadata_not_found",
            FetchError::Decode(_) => "decode_error",
            FetchError::Cancelled => "cancelled",
            FetchError::Task(_) => "task_error",
        }
    }
}
