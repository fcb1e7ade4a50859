//! Release listing retrieval from the GitHub releases API

use crate::config::LATEST_RELEASE_URL;
use crate::error::{Error, FetchError, Result};
use crate::types::Release;

impl Release {
    /// Endpoint of the latest python-build-standalone release
    pub fn latest_url() -> &'static str {
        LATEST_RELEASE_URL
    }
}

/// Download and decode a release listing
///
/// `url` must point at a GitHub release object (or anything with the same
/// `{"tag_name": ..., "assets": [{"name", "browser_download_url"}]}` shape).
///
/// # Errors
///
/// Returns [`Error::Fetch`] on transport failures, a non-success status or
/// a body that does not decode as a release.
pub async fn fetch_release(client: &reqwest::Client, url: &str) -> Result<Release> {
    tracing::debug!(url = %url, "Fetching release listing");

    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, "application/vnd.github+json")
        .send()
        .await
        .map_err(|e| Error::fetch(url, FetchError::Transport(e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::fetch(url, FetchError::Status(status)));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| Error::fetch(url, FetchError::Transport(e)))?;

    serde_json::from_slice(&body).map_err(|e| Error::fetch(url, FetchError::Decode(e)))
}
