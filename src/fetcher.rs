//! Streaming extraction of `python/PYTHON.json` from a remote full build archive.
//!
//! The archive body is never buffered whole: the HTTP byte stream is bridged
//! into a blocking reader, decompressed on the fly and walked entry by entry
//! until the metadata entry is found. Reading stops at that entry, so only
//! the prefix of the archive up to it is downloaded.

use std::io::{BufReader, Cursor, Read};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use futures::{StreamExt, TryStreamExt};
use tokio_util::io::{StreamReader, SyncIoBridge};
use tokio_util::sync::CancellationToken;

use crate::config::{ResolverConfig, RetryConfig};
use crate::error::FetchError;
use crate::retry::with_retry;
use crate::types::MetadataDocument;

/// Path of the metadata entry inside a full build archive
pub const METADATA_ENTRY: &str = "python/PYTHON.json";

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Abstraction over metadata retrieval, enabling testability.
#[async_trait::async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetch and decode the metadata document of the archive at `url`
    ///
    /// Implementations must return promptly once `cancel` fires, releasing
    /// any connection or reader they hold before returning.
    async fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<MetadataDocument, FetchError>;
}

/// Production [`MetadataSource`] that streams archives over HTTP.
#[derive(Clone, Debug)]
pub struct HttpMetadataFetcher {
    client: reqwest::Client,
    retry: RetryConfig,
}

impl HttpMetadataFetcher {
    /// Create a fetcher from an existing client and retry policy
    pub fn new(client: reqwest::Client, retry: RetryConfig) -> Self {
        Self { client, retry }
    }

    /// Create a fetcher with a client built from `config.http`
    pub fn from_config(config: &ResolverConfig) -> crate::error::Result<Self> {
        Ok(Self::new(config.http.build_client()?, config.retry.clone()))
    }

    /// Send the GET request, retrying transient failures
    async fn open(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        with_retry(&self.retry, || async {
            let response = self.client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status));
            }
            Ok::<_, FetchError>(response)
        })
        .await
    }
}

#[async_trait::async_trait]
impl MetadataSource for HttpMetadataFetcher {
    /// Stream the archive at `url` into a blocking reader.
    ///
    /// The body stream ends as soon as `cancel` fires, which unblocks the
    /// reader; the reader task is always awaited, so the body and decoder
    /// are dropped before this returns. A transport error in the middle of
    /// the body is reported as [`FetchError::Transport`] however deeply the
    /// decoders wrapped it.
    async fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<MetadataDocument, FetchError> {
        tracing::debug!(url = %url, "Opening archive stream");
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            response = self.open(url) => response?,
        };

        let broken = BrokenStream::default();
        let body = response
            .bytes_stream()
            .map_err({
                let broken = broken.clone();
                move |e| broken.record(e)
            })
            .take_until(cancel.clone().cancelled_owned());
        let reader = SyncIoBridge::new(StreamReader::new(Box::pin(body)));

        let outcome = tokio::task::spawn_blocking(move || read_metadata_entry(reader))
            .await
            .map_err(|e| FetchError::Task(e.to_string()))?;

        outcome.map_err(|e| {
            if cancel.is_cancelled() {
                tracing::debug!(url = %url, error = %e, "Archive stream abandoned");
                FetchError::Cancelled
            } else if let Some(transport) = broken.take() {
                FetchError::Transport(transport)
            } else {
                e
            }
        })
    }
}

/// First transport error seen on a body stream.
///
/// The decoders only see an opaque `io::Error`; the original error is kept
/// here so it can be reported once the reader gives up.
#[derive(Clone, Default)]
struct BrokenStream(Arc<Mutex<Option<reqwest::Error>>>);

impl BrokenStream {
    fn record(&self, e: reqwest::Error) -> std::io::Error {
        let io = std::io::Error::other(e.to_string());
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(e);
        io
    }

    fn take(&self) -> Option<reqwest::Error> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// Archive compression, detected from the leading magic bytes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Compression {
    Zstd,
    Gzip,
}

impl Compression {
    fn detect(magic: &[u8; 4]) -> Option<Self> {
        if *magic == ZSTD_MAGIC {
            Some(Compression::Zstd)
        } else if magic.starts_with(&GZIP_MAGIC) {
            Some(Compression::Gzip)
        } else {
            None
        }
    }
}

/// Read the metadata entry from a compressed tar stream
///
/// Supports zstd and gzip compression. Entries are read in order and reading
/// stops at the first entry whose path is [`METADATA_ENTRY`].
///
/// # Errors
///
/// - [`FetchError::Decompression`] if the stream is not zstd or gzip
/// - [`FetchError::ArchiveRead`] if an entry cannot be read
/// - [`FetchError::MetadataNotFound`] if no entry matches
/// - [`FetchError::Decode`] if the entry is not a valid metadata document
pub fn read_metadata_entry<R: Read>(mut reader: R) -> Result<MetadataDocument, FetchError> {
    let mut magic = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .map_err(|e| FetchError::Decompression(format!("cannot read compression header: {e}")))?;

    let compression = Compression::detect(&magic).ok_or_else(|| {
        FetchError::Decompression(format!("unrecognized compression signature {magic:02x?}"))
    })?;
    tracing::trace!(?compression, "Detected archive compression");

    let reader = BufReader::new(Cursor::new(magic).chain(reader));
    match compression {
        Compression::Zstd => {
            let decoder = zstd::stream::read::Decoder::with_buffer(reader)
                .map_err(|e| FetchError::Decompression(e.to_string()))?;
            find_metadata_entry(decoder)
        }
        Compression::Gzip => find_metadata_entry(flate2::bufread::GzDecoder::new(reader)),
    }
}

/// Walk a decompressed tar stream until the metadata entry is found
fn find_metadata_entry<R: Read>(decompressed: R) -> Result<MetadataDocument, FetchError> {
    let mut archive = tar::Archive::new(decompressed);
    let entries = archive.entries().map_err(FetchError::ArchiveRead)?;

    for (scanned, entry) in entries.enumerate() {
        let entry = entry.map_err(FetchError::ArchiveRead)?;
        let is_metadata = entry.path().map_err(FetchError::ArchiveRead)? == Path::new(METADATA_ENTRY);

        if is_metadata {
            tracing::debug!(entries_scanned = scanned + 1, "Found metadata entry");
            return serde_json::from_reader(entry).map_err(|e| {
                if e.is_io() {
                    FetchError::ArchiveRead(std::io::Error::other(e))
                } else {
                    FetchError::Decode(e)
                }
            });
        }
    }

    Err(FetchError::MetadataNotFound(METADATA_ENTRY))
}
