//! Resolution pipeline: classify, match, fetch concurrently, collect.
//!
//! One producer task walks the install-only builds in classification order,
//! matches each to the best full build of its group and hands the pair to a
//! fixed pool of workers. Workers fetch the full build's metadata and emit
//! [`ResolvedRecord`]s, which the calling task collects.
//!
//! The first error anywhere cancels the shared token. Every task races its
//! channel operations against that token and every fetch is handed it, so
//! the run winds down without accepting new work and the caller gets that
//! first error back.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ResolverConfig;
use crate::error::{Error, Result};
use crate::fetcher::{HttpMetadataFetcher, MetadataSource};
use crate::parser;
use crate::ranker;
use crate::release::fetch_release;
use crate::types::{BuildGroups, BuildRecord, ReleaseAsset, ResolvedRecord};

/// Resolves install-only builds against their best full build's metadata
///
/// # Example
///
/// ```no_run
/// use pbs_resolver::{Resolver, ResolverConfig};
///
/// # async fn example() -> pbs_resolver::Result<()> {
/// let resolver = Resolver::new(ResolverConfig::default())?;
/// let mut resolved = resolver.resolve_latest().await?;
/// resolved.sort_by_key(|record| record.key());
///
/// for record in &resolved {
///     println!("{} -> {:?}", record.key(), record.c_runtime());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Resolver {
    config: ResolverConfig,
    client: reqwest::Client,
    source: Arc<dyn MetadataSource>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    /// Create a resolver that fetches archives over HTTP
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: ResolverConfig) -> Result<Self> {
        config.validate()?;
        let client = config.http.build_client()?;
        let source = Arc::new(HttpMetadataFetcher::new(
            client.clone(),
            config.retry.clone(),
        ));
        Ok(Self {
            config,
            client,
            source,
        })
    }

    /// Create a resolver with a custom metadata source
    pub fn with_source(config: ResolverConfig, source: Arc<dyn MetadataSource>) -> Result<Self> {
        config.validate()?;
        let client = config.http.build_client()?;
        Ok(Self {
            config,
            client,
            source,
        })
    }

    /// The configuration this resolver was built with
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Fetch the configured release listing and resolve it
    ///
    /// Uses `config.release_url` and `config.concurrency`. The deadline, if
    /// any, covers the listing request as well as the resolution.
    pub async fn resolve_latest(&self) -> Result<Vec<ResolvedRecord>> {
        let deadline = self.config.deadline.and_then(RunDeadline::start);
        let listing = fetch_release(&self.client, &self.config.release_url);

        let release = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline.at, listing)
                .await
                .map_err(|_| {
                    tracing::warn!(
                        deadline = ?deadline.budget,
                        url = %self.config.release_url,
                        "Deadline reached while fetching release listing"
                    );
                    deadline.exceeded()
                })??,
            None => listing.await?,
        };
        tracing::info!(
            tag = release.tag_name.as_deref().unwrap_or("unknown"),
            assets = release.assets.len(),
            "Fetched release listing"
        );

        self.run(
            &release.assets,
            self.config.concurrency,
            CancellationToken::new(),
            deadline,
        )
        .await
    }

    /// Resolve every install-only build in `assets`
    ///
    /// At most `concurrency` archives are read at the same time. The order of
    /// the returned records is unspecified; sort by [`ResolvedRecord::key`]
    /// for a stable order.
    ///
    /// # Errors
    ///
    /// Fails on the first error observed anywhere in the run:
    /// - [`Error::Config`] if `concurrency` is zero
    /// - [`Error::Parse`] if an archive name cannot be parsed (before any fetch)
    /// - [`Error::GroupMissing`] if an install-only build has no full build
    /// - [`Error::Fetch`] if reading a full build's metadata fails
    /// - [`Error::DeadlineExceeded`] if `config.deadline` elapses
    pub async fn resolve(
        &self,
        assets: &[ReleaseAsset],
        concurrency: usize,
    ) -> Result<Vec<ResolvedRecord>> {
        self.resolve_with_cancel(assets, concurrency, CancellationToken::new())
            .await
    }

    /// Like [`resolve`](Self::resolve), stopping early when `cancel` fires
    ///
    /// Returns [`Error::Cancelled`] if `cancel` was cancelled before the run
    /// completed and no other error had been observed.
    pub async fn resolve_with_cancel(
        &self,
        assets: &[ReleaseAsset],
        concurrency: usize,
        cancel: CancellationToken,
    ) -> Result<Vec<ResolvedRecord>> {
        let deadline = self.config.deadline.and_then(RunDeadline::start);
        self.run(assets, concurrency, cancel, deadline).await
    }

    async fn run(
        &self,
        assets: &[ReleaseAsset],
        concurrency: usize,
        cancel: CancellationToken,
        deadline: Option<RunDeadline>,
    ) -> Result<Vec<ResolvedRecord>> {
        if concurrency == 0 {
            return Err(Error::Config {
                message: "concurrency must be at least 1".to_string(),
                key: Some("concurrency".to_string()),
            });
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let Classified {
            groups,
            install_only,
        } = classify(assets)?;

        let workers = concurrency.min(install_only.len());
        if workers == 0 {
            tracing::debug!("No install-only builds to resolve");
            return Ok(Vec::new());
        }

        tracing::info!(
            install_only = install_only.len(),
            groups = groups.len(),
            workers = workers,
            "Resolving builds"
        );

        let abort = Arc::new(AbortSignal::new(cancel.child_token()));
        let deadline_task =
            deadline.map(|deadline| spawn_deadline_watcher(deadline, Arc::clone(&abort)));

        let (job_tx, job_rx) = mpsc::channel::<Job>(1);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<ResolvedRecord>(1);

        let mut handles = Vec::with_capacity(workers + 1);
        handles.push(spawn_producer(groups, install_only, job_tx, Arc::clone(&abort)));
        for worker_id in 0..workers {
            handles.push(spawn_worker(WorkerParams {
                worker_id,
                jobs: Arc::clone(&job_rx),
                results: result_tx.clone(),
                source: Arc::clone(&self.source),
                abort: Arc::clone(&abort),
            }));
        }
        drop(job_rx);
        drop(result_tx);

        let mut resolved = Vec::new();
        while let Some(record) = result_rx.recv().await {
            tracing::debug!(key = %record.key(), "Resolved build");
            resolved.push(record);
        }

        if let Some(task) = deadline_task {
            task.abort();
        }

        for handle in handles {
            if let Err(e) = handle.await {
                abort.fail(Error::Task(e.to_string())).await;
            }
        }

        if let Some(error) = abort.take_error().await {
            tracing::warn!(
                error = %error,
                code = error.error_code(),
                discarded = resolved.len(),
                "Resolution aborted"
            );
            return Err(error);
        }
        if cancel.is_cancelled() {
            tracing::info!(discarded = resolved.len(), "Resolution cancelled");
            return Err(Error::Cancelled);
        }

        tracing::info!(resolved = resolved.len(), "Resolution complete");
        Ok(resolved)
    }
}

/// Point in time at which a run is aborted
#[derive(Clone, Copy, Debug)]
struct RunDeadline {
    at: Instant,
    /// The configured allowance, reported in the error
    budget: Duration,
}

impl RunDeadline {
    /// Start the clock now; `None` if the budget is too large to represent
    fn start(budget: Duration) -> Option<Self> {
        let at = Instant::now().checked_add(budget)?;
        Some(Self { at, budget })
    }

    fn exceeded(&self) -> Error {
        Error::DeadlineExceeded(self.budget)
    }
}

/// Output of the classification step
#[derive(Debug)]
struct Classified {
    groups: BuildGroups,
    install_only: Vec<BuildRecord>,
}

/// Parse every distribution archive and split full builds from install-only ones
fn classify(assets: &[ReleaseAsset]) -> Result<Classified> {
    let mut groups = BuildGroups::new();
    let mut install_only = Vec::new();

    for asset in assets {
        if !parser::is_distribution_archive(&asset.name) {
            tracing::debug!(name = %asset.name, "Skipping non-archive asset");
            continue;
        }
        let record = parser::parse(asset)?;
        if record.is_full() {
            groups.insert(record)?;
        } else {
            install_only.push(record);
        }
    }

    Ok(Classified {
        groups,
        install_only,
    })
}

/// A matched pair waiting for its metadata
#[derive(Debug)]
struct Job {
    install_only: BuildRecord,
    best_match: BuildRecord,
}

/// First-error-wins abort shared by every task of one run
struct AbortSignal {
    token: CancellationToken,
    first_error: Mutex<Option<Error>>,
}

impl AbortSignal {
    fn new(token: CancellationToken) -> Self {
        Self {
            token,
            first_error: Mutex::new(None),
        }
    }

    /// Record `error` and cancel the run, unless it is already winding down
    async fn fail(&self, error: Error) {
        let mut slot = self.first_error.lock().await;
        if slot.is_some() || self.token.is_cancelled() {
            tracing::debug!(error = %error, "Dropping error after abort");
            return;
        }
        tracing::error!(error = %error, "Aborting resolution");
        *slot = Some(error);
        self.token.cancel();
    }

    async fn take_error(&self) -> Option<Error> {
        self.first_error.lock().await.take()
    }
}

/// Spawn the producer that matches install-only builds in order.
///
/// Matching is lazy: a missing group stops the producer before any later
/// record is matched or sent.
fn spawn_producer(
    groups: BuildGroups,
    install_only: Vec<BuildRecord>,
    jobs: mpsc::Sender<Job>,
    abort: Arc<AbortSignal>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        for record in install_only {
            let key = record.key();
            let Some(group) = groups.get(&key) else {
                abort.fail(Error::GroupMissing { key }).await;
                return;
            };
            let best_match = match ranker::best(group) {
                Ok(best) => best.clone(),
                Err(e) => {
                    abort.fail(e).await;
                    return;
                }
            };

            tracing::trace!(
                key = %key,
                config = %best_match.config().map(|c| c.as_str()).unwrap_or_default(),
                candidates = group.len(),
                "Matched install-only build"
            );

            let job = Job {
                install_only: record,
                best_match,
            };
            tokio::select! {
                biased;
                _ = abort.token.cancelled() => return,
                sent = jobs.send(job) => {
                    if sent.is_err() {
                        return;
                    }
                }
            }
        }
    })
}

/// Parameters for spawning a metadata worker
struct WorkerParams {
    worker_id: usize,
    /// Receiver shared by all workers
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    results: mpsc::Sender<ResolvedRecord>,
    source: Arc<dyn MetadataSource>,
    abort: Arc<AbortSignal>,
}

/// Spawn a worker that fetches metadata for jobs until the queue closes.
fn spawn_worker(params: WorkerParams) -> tokio::task::JoinHandle<()> {
    let WorkerParams {
        worker_id,
        jobs,
        results,
        source,
        abort,
    } = params;

    tokio::spawn(async move {
        loop {
            let job = {
                let mut jobs = jobs.lock().await;
                tokio::select! {
                    biased;
                    _ = abort.token.cancelled() => None,
                    job = jobs.recv() => job,
                }
            };
            let Some(Job {
                install_only,
                best_match,
            }) = job
            else {
                break;
            };

            let url = best_match.source_url.as_str();
            tracing::debug!(
                worker_id,
                key = %install_only.key(),
                url = %url,
                "Fetching metadata"
            );

            // Awaited to completion so the source has released its stream
            // before this worker exits
            let metadata = match source.fetch(url, &abort.token).await {
                Ok(metadata) => metadata,
                Err(_) if abort.token.is_cancelled() => break,
                Err(e) => {
                    abort.fail(Error::fetch(url, e)).await;
                    break;
                }
            };

            let record = ResolvedRecord {
                install_only,
                best_match,
                metadata,
            };
            tokio::select! {
                biased;
                _ = abort.token.cancelled() => break,
                sent = results.send(record) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::trace!(worker_id, "Worker finished");
    })
}

/// Spawn a watcher that aborts the run once `deadline` passes.
///
/// Exits quietly if the run is cancelled first.
fn spawn_deadline_watcher(
    deadline: RunDeadline,
    abort: Arc<AbortSignal>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline.at) => {
                tracing::warn!(
                    deadline = ?deadline.budget,
                    "Deadline reached, aborting resolution"
                );
                abort.fail(deadline.exceeded()).await;
            }
            _ = abort.token.cancelled() => {}
        }
    })
}
