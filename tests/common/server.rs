//! Mock release host serving a listing and archive bodies

use pbs_resolver::{ReleaseAsset, ResolverConfig, RetryConfig};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A wiremock server standing in for the GitHub API and the release CDN
pub struct ReleaseHost {
    pub server: MockServer,
    assets: Vec<ReleaseAsset>,
}

impl ReleaseHost {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
            assets: Vec::new(),
        }
    }

    /// URL of the release listing
    pub fn release_url(&self) -> String {
        format!("{}/repos/pbs/releases/latest", self.server.uri())
    }

    fn asset_url(&self, name: &str) -> String {
        format!("{}/download/{}", self.server.uri(), name)
    }

    /// Publish an artifact whose body is `body`, expecting `fetches` downloads
    pub async fn publish(&mut self, name: &str, body: Vec<u8>, fetches: u64) -> ReleaseAsset {
        Mock::given(method("GET"))
            .and(path(format!("/download/{name}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .expect(fetches)
            .mount(&self.server)
            .await;
        self.list(name)
    }

    /// Publish an artifact that answers with `status`
    pub async fn publish_status(&mut self, name: &str, status: u16) -> ReleaseAsset {
        Mock::given(method("GET"))
            .and(path(format!("/download/{name}")))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
        self.list(name)
    }

    /// List an artifact without serving a body
    pub fn list(&mut self, name: &str) -> ReleaseAsset {
        let asset = ReleaseAsset::new(name, self.asset_url(name));
        self.assets.push(asset.clone());
        asset
    }

    /// Serve the release listing with every asset listed so far
    pub async fn mount_release(&self) {
        let assets: Vec<_> = self
            .assets
            .iter()
            .map(|asset| {
                serde_json::json!({
                    "name": asset.name,
                    "browser_download_url": asset.browser_download_url,
                    "state": "uploaded",
                })
            })
            .collect();

        Mock::given(method("GET"))
            .and(path("/repos/pbs/releases/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tag_name": "20230826",
                "assets": assets,
            })))
            .mount(&self.server)
            .await;
    }

    /// Assets listed so far
    pub fn assets(&self) -> &[ReleaseAsset] {
        &self.assets
    }

    /// Resolver config pointing at this host, with fast retries
    pub fn config(&self, concurrency: usize) -> ResolverConfig {
        ResolverConfig {
            concurrency,
            release_url: self.release_url(),
            retry: RetryConfig {
                max_attempts: 2,
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(50),
                backoff_multiplier: 2.0,
                jitter: false,
            },
            ..Default::default()
        }
    }
}

/// A bare HTTP server that streams a zstd tar archive which never ends.
///
/// The archive's first entry claims to be 64 GiB and is sent as zeros in
/// small blocks, so a reader looking for the metadata entry keeps reading
/// until the client closes the connection.
pub struct EndlessArchive {
    url: String,
    served: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl EndlessArchive {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let url = format!(
            "http://{}/download/endless-full.tar.zst",
            listener.local_addr().expect("local addr")
        );
        let served = Arc::new(AtomicU64::new(0));
        let closed = Arc::new(AtomicBool::new(false));

        let (served_by_server, closed_by_server) = (Arc::clone(&served), Arc::clone(&closed));
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;

            let head = "HTTP/1.1 200 OK\r\ncontent-type: application/octet-stream\r\nconnection: close\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_ok() {
                let mut encoder =
                    zstd::stream::write::Encoder::new(Vec::new(), 1).expect("zstd encoder");
                let mut header = tar::Header::new_gnu();
                header
                    .set_path("python/install/lib/libpython3.11.a")
                    .expect("tar path");
                header.set_size(64_u64 << 30);
                header.set_mode(0o644);
                header.set_cksum();
                encoder.write_all(header.as_bytes()).expect("tar header");

                let block = vec![0u8; 16 * 1024];
                loop {
                    encoder.flush().expect("zstd flush");
                    let pending = std::mem::take(encoder.get_mut());
                    if socket.write_all(&pending).await.is_err() {
                        break;
                    }
                    served_by_server.fetch_add(pending.len() as u64, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    encoder.write_all(&block).expect("zstd write");
                }
            }
            closed_by_server.store(true, Ordering::SeqCst);
        });

        Self {
            url,
            served,
            closed,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Compressed bytes written to the client so far
    pub fn served(&self) -> u64 {
        self.served.load(Ordering::SeqCst)
    }

    /// Wait until a write fails because the client hung up
    pub async fn wait_closed(&self) {
        while !self.closed.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
