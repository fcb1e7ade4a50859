//! # pbs-resolver
//!
//! Resolve python-build-standalone install-only builds to the most optimized
//! full build of the same interpreter, version, release and target, and attach
//! the `python/PYTHON.json` metadata read from inside that full build.
//!
//! ## How it works
//!
//! 1. Artifact names are parsed into [`BuildRecord`]s ([`parser`])
//! 2. Full builds are grouped by [`GroupKey`] and ranked by optimization
//!    profile, `pgo+lto` first ([`ranker`])
//! 3. For each install-only build, the best full build's archive is streamed
//!    and decompressed until the metadata entry is reached ([`fetcher`])
//! 4. A bounded worker pool does step 3 concurrently; the first error aborts
//!    the whole run ([`pipeline`])
//!
//! Only the archive prefix up to the metadata entry is downloaded.
//!
//! ## Quick Start
//!
//! ```no_run
//! use pbs_resolver::{Resolver, ResolverConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ResolverConfig {
//!         concurrency: 8,
//!         ..Default::default()
//!     };
//!
//!     let resolver = Resolver::new(config)?;
//!     let mut resolved = resolver.resolve_latest().await?;
//!     resolved.sort_by_key(|record| record.key());
//!
//!     for record in resolved {
//!         println!(
//!             "{} best={} crt={:?}",
//!             record.key(),
//!             record.best_match.source_url,
//!             record.c_runtime()
//!         );
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Streaming metadata extraction from full build archives
pub mod fetcher;
/// Artifact name parsing
pub mod parser;
/// Concurrent resolution pipeline
pub mod pipeline;
/// Best-match selection among full builds
pub mod ranker;
/// Release listing retrieval
pub mod release;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types
pub mod types;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use config::{HttpConfig, ResolverConfig, RetryConfig};
pub use error::{Error, FetchError, Result};
pub use fetcher::{HttpMetadataFetcher, MetadataSource, read_metadata_entry};
pub use pipeline::Resolver;
pub use release::fetch_release;
pub use types::{
    BuildGroups, BuildRecord, ConfigProfile, Flavor, GroupKey, MetadataDocument, Release,
    ReleaseAsset, ResolvedRecord,
};
