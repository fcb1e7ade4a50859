//! Core types for pbs-resolver

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A published release artifact: its file name and where to download it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    /// Artifact file name (e.g. `cpython-3.11.4+20230826-x86_64-unknown-linux-gnu-install_only.tar.gz`)
    pub name: String,
    /// Direct download URL of the artifact
    pub browser_download_url: String,
}

impl ReleaseAsset {
    /// Create an asset from a name and URL
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            browser_download_url: url.into(),
        }
    }
}

/// A release: the list of artifacts published under one tag
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Release {
    /// Release tag, when the listing provides one
    #[serde(default)]
    pub tag_name: Option<String>,
    /// All published artifacts
    pub assets: Vec<ReleaseAsset>,
}

/// Optimization profile of a full build, ordered from most to least optimized
///
/// The derived `Ord` is the ranking: `PgoLto < Pgo < Lto < NoOpt < Empty < Debug`.
/// Variant order is significant; do not reorder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConfigProfile {
    /// Profile-guided and link-time optimized (`pgo+lto`)
    #[serde(rename = "pgo+lto")]
    PgoLto,
    /// Profile-guided optimized (`pgo`)
    #[serde(rename = "pgo")]
    Pgo,
    /// Link-time optimized (`lto`)
    #[serde(rename = "lto")]
    Lto,
    /// No optimization (`noopt`)
    #[serde(rename = "noopt")]
    NoOpt,
    /// No config token at all
    #[serde(rename = "")]
    Empty,
    /// Debug build (`debug`)
    #[serde(rename = "debug")]
    Debug,
}

impl ConfigProfile {
    /// The literal token used in artifact names
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigProfile::PgoLto => "pgo+lto",
            ConfigProfile::Pgo => "pgo",
            ConfigProfile::Lto => "lto",
            ConfigProfile::NoOpt => "noopt",
            ConfigProfile::Empty => "",
            ConfigProfile::Debug => "debug",
        }
    }
}

impl fmt::Display for ConfigProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a config token is not one of the known literals
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownConfig(pub String);

impl fmt::Display for UnknownConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown config: {:?}", self.0)
    }
}

impl std::error::Error for UnknownConfig {}

impl FromStr for ConfigProfile {
    type Err = UnknownConfig;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pgo+lto" => Ok(ConfigProfile::PgoLto),
            "pgo" => Ok(ConfigProfile::Pgo),
            "lto" => Ok(ConfigProfile::Lto),
            "noopt" => Ok(ConfigProfile::NoOpt),
            "" => Ok(ConfigProfile::Empty),
            "debug" => Ok(ConfigProfile::Debug),
            other => Err(UnknownConfig(other.to_string())),
        }
    }
}

/// Packaging flavor of a build
///
/// Full builds carry their optimization profile; install-only builds have none.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flavor {
    /// Full distribution archive (`*-<config>-full.tar.zst`)
    Full(ConfigProfile),
    /// Install-only archive (`*-install_only.tar.gz`)
    InstallOnly,
}

/// Identity shared by a full build and the install-only build it pairs with
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    /// Interpreter implementation (e.g. `cpython`)
    pub implementation: String,
    /// Python version (e.g. `3.11.4`)
    pub python_version: String,
    /// Release tag, an 8-digit date (e.g. `20230826`)
    pub release_tag: String,
    /// Target triple (e.g. `x86_64-unknown-linux-gnu`)
    pub target_triple: String,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}+{}-{}",
            self.implementation, self.python_version, self.release_tag, self.target_triple
        )
    }
}

/// A build parsed from an artifact name
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    /// Interpreter implementation (e.g. `cpython`)
    pub implementation: String,
    /// Python version (e.g. `3.11.4`)
    pub python_version: String,
    /// Release tag, an 8-digit date
    pub release_tag: String,
    /// Target triple
    pub target_triple: String,
    /// Packaging flavor (and config for full builds)
    pub flavor: Flavor,
    /// Download URL of the artifact
    pub source_url: String,
}

impl BuildRecord {
    /// The group key of this build
    pub fn key(&self) -> GroupKey {
        GroupKey {
            implementation: self.implementation.clone(),
            python_version: self.python_version.clone(),
            release_tag: self.release_tag.clone(),
            target_triple: self.target_triple.clone(),
        }
    }

    /// Optimization profile, present only for full builds
    pub fn config(&self) -> Option<ConfigProfile> {
        match self.flavor {
            Flavor::Full(config) => Some(config),
            Flavor::InstallOnly => None,
        }
    }

    /// Whether this is a full build
    pub fn is_full(&self) -> bool {
        matches!(self.flavor, Flavor::Full(_))
    }
}

/// Full builds grouped by [`GroupKey`], each group in insertion order
///
/// Groups are only created on insert, so every group is non-empty.
#[derive(Clone, Debug, Default)]
pub struct BuildGroups {
    groups: HashMap<GroupKey, Vec<BuildRecord>>,
}

impl BuildGroups {
    /// Create an empty set of groups
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a full build to its group
    ///
    /// Install-only records are rejected: only full builds are ranked.
    pub fn insert(&mut self, record: BuildRecord) -> crate::error::Result<()> {
        if !record.is_full() {
            return Err(Error::ConfigOrdering {
                reason: format!("install-only build {} cannot join a group", record.key()),
            });
        }
        self.groups.entry(record.key()).or_default().push(record);
        Ok(())
    }

    /// The full builds sharing `key`, if any
    pub fn get(&self, key: &GroupKey) -> Option<&[BuildRecord]> {
        self.groups
            .get(key)
            .map(Vec::as_slice)
            .filter(|group| !group.is_empty())
    }

    /// Number of groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether no full build has been inserted
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Decoded `python/PYTHON.json` from a full build archive
///
/// Only the fields the resolver interprets are typed; everything else in the
/// document is kept in [`extra`](Self::extra).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataDocument {
    /// Minimum macOS deployment target (darwin builds)
    #[serde(default)]
    pub apple_sdk_deployment_target: Option<String>,
    /// C runtime features (e.g. `glibc-max-symbol-version:2.17`)
    #[serde(default)]
    pub crt_features: Option<Vec<String>>,
    /// Remaining keys of the document
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// An install-only build enriched with its best full build and that build's metadata
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRecord {
    /// The install-only build being resolved
    pub install_only: BuildRecord,
    /// The most optimized full build of the same group
    pub best_match: BuildRecord,
    /// Metadata read from the best match's archive
    pub metadata: MetadataDocument,
}

const GLIBC_FEATURE_PREFIX: &str = "glibc-max-symbol-version:";

impl ResolvedRecord {
    /// The group key shared by the install-only build and its best match
    pub fn key(&self) -> GroupKey {
        self.install_only.key()
    }

    /// Optimization profile of the best match
    pub fn config(&self) -> Option<ConfigProfile> {
        self.best_match.config()
    }

    /// Architecture part of the target triple (e.g. `aarch64`)
    pub fn arch(&self) -> &str {
        self.install_only
            .target_triple
            .split('-')
            .next()
            .unwrap_or_default()
    }

    /// C runtime summary of the build
    ///
    /// - linux/gnu: `glibc:<max symbol version>`
    /// - other linux: `musl`
    /// - darwin: `apple-sdk-deployment-target:<target>`
    /// - anything else: the raw crt features
    pub fn c_runtime(&self) -> Vec<String> {
        let triple = self.install_only.target_triple.as_str();
        let features = self.metadata.crt_features.as_deref().unwrap_or_default();

        if triple.contains("linux") {
            if triple.contains("gnu") {
                return features
                    .iter()
                    .find_map(|f| f.strip_prefix(GLIBC_FEATURE_PREFIX))
                    .map(|version| vec![format!("glibc:{version}")])
                    .unwrap_or_default();
            }
            return vec!["musl".to_string()];
        }

        if triple.contains("darwin") {
            return self
                .metadata
                .apple_sdk_deployment_target
                .as_ref()
                .map(|target| vec![format!("apple-sdk-deployment-target:{target}")])
                .unwrap_or_default();
        }

        features.to_vec()
    }
}
