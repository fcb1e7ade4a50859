//! Artifact name parsing
//!
//! python-build-standalone publishes two archive flavors per build:
//!
//! ```text
//! cpython-3.11.4+20230826-x86_64-unknown-linux-gnu-pgo+lto-full.tar.zst
//! cpython-3.11.4+20230826-x86_64-unknown-linux-gnu-install_only.tar.gz
//! ```
//!
//! [`parse`] turns such a name into a [`BuildRecord`]. Names that are not
//! distribution archives at all should be filtered out first with
//! [`is_distribution_archive`]; anything that passes that filter and still does
//! not match is a parse error.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::types::{BuildRecord, ConfigProfile, Flavor, ReleaseAsset};

/// Archive suffixes considered distribution archives
pub const ARCHIVE_SUFFIXES: [&str; 2] = [".tar.zst", ".tar.gz"];

static FULL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<implementation>\w+)-(?P<version>.*)\+(?P<tag>\d{8})-(?P<triple>(?:-?[a-zA-Z0-9_])+)-(?P<config>[a-z0-9+]+)-full\.tar\.zst$",
    )
    .unwrap_or_else(|e| unreachable!("full build pattern is valid: {e}"))
});

static INSTALL_ONLY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<implementation>\w+)-(?P<version>.*)\+(?P<tag>\d{8})-(?P<triple>(?:-?[a-zA-Z0-9_])+)-install_only\.tar\.gz$",
    )
    .unwrap_or_else(|e| unreachable!("install-only pattern is valid: {e}"))
});

/// Check whether an artifact name ends in one of the distribution archive suffixes
///
/// # Examples
///
/// ```
/// use pbs_resolver::parser::is_distribution_archive;
///
/// assert!(is_distribution_archive("cpython-3.12.0+20231002-aarch64-apple-darwin-install_only.tar.gz"));
/// assert!(!is_distribution_archive("SHA256SUMS"));
/// ```
#[must_use]
pub fn is_distribution_archive(name: &str) -> bool {
    ARCHIVE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Parse a release asset into a [`BuildRecord`]
///
/// The full-build pattern is tried first, then the install-only pattern.
///
/// # Errors
///
/// Returns [`Error::Parse`] when the name matches neither pattern or when the
/// config token of a full build is not a known [`ConfigProfile`].
///
/// # Examples
///
/// ```
/// use pbs_resolver::parser::parse;
/// use pbs_resolver::types::{ConfigProfile, Flavor, ReleaseAsset};
///
/// let asset = ReleaseAsset::new(
///     "cpython-3.11.4+20230826-x86_64-unknown-linux-gnu-pgo+lto-full.tar.zst",
///     "https://example.com/full.tar.zst",
/// );
/// let record = parse(&asset).unwrap();
/// assert_eq!(record.python_version, "3.11.4");
/// assert_eq!(record.flavor, Flavor::Full(ConfigProfile::PgoLto));
/// ```
pub fn parse(asset: &ReleaseAsset) -> Result<BuildRecord> {
    parse_name(&asset.name, &asset.browser_download_url)
}

/// Parse an artifact name, attaching `url` as the record's source URL
pub fn parse_name(name: &str, url: &str) -> Result<BuildRecord> {
    let (caps, flavor) = if let Some(caps) = FULL_RE.captures(name) {
        let token = &caps["config"];
        let config: ConfigProfile = token.parse().map_err(|e| Error::Parse {
            name: name.to_string(),
            reason: format!("{e}"),
        })?;
        (caps, Flavor::Full(config))
    } else if let Some(caps) = INSTALL_ONLY_RE.captures(name) {
        (caps, Flavor::InstallOnly)
    } else {
        return Err(Error::Parse {
            name: name.to_string(),
            reason: "unrecognized artifact name".to_string(),
        });
    };

    Ok(BuildRecord {
        implementation: caps["implementation"].to_string(),
        python_version: caps["version"].to_string(),
        release_tag: caps["tag"].to_string(),
        target_triple: caps["triple"].to_string(),
        flavor,
        source_url: url.to_string(),
    })
}
