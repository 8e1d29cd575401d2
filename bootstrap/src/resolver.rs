//! Install version resolution.
//!
//! The version to install comes from, in order of precedence:
//!
//! 1. an explicit `--pikesquares-version`;
//! 2. `[GLOBAL] pikesquares_version` in `pikesquares.toml`;
//! 3. the tag of the latest GitHub release.
//!
//! Development versions skip the tag table entirely. Release versions are
//! looked up in the bundled table; an unknown tag simply has no commit.

use crate::error::{BootstrapError, Result};
use crate::fetch::Fetcher;
use crate::release_tags::{GitSha, RELEASE_TAG_PREFIX, ReleaseTags};
use crate::version::ProductVersion;
use log::{debug, info};
use std::fmt;

/// Endpoint describing the latest published release.
pub const LATEST_RELEASE_URL: &str = "https://github.com/eloquentbits/pikesquares/releases/latest";

/// Outcome of version resolution, threaded through the rest of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveInfo {
    /// The version to install.
    pub stable_version: ProductVersion,
    /// Commit the release tag points at, when known.
    pub sha_version: Option<GitSha>,
}

impl ResolveInfo {
    /// Return true when the resolved version is a development build.
    #[must_use]
    pub fn is_development(&self) -> bool {
        self.stable_version.is_development()
    }
}

/// Where the resolved version came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSource {
    /// `--pikesquares-version` on the command line.
    Explicit,
    /// `pikesquares.toml`.
    ConfigFile,
    /// The latest GitHub release.
    LatestRelease,
}

impl fmt::Display for VersionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Explicit => "command line",
            Self::ConfigFile => "config file",
            Self::LatestRelease => "latest release",
        })
    }
}

/// Strip `prefix` from a release tag and parse the remainder.
///
/// # Errors
///
/// Returns [`BootstrapError::Resolution`] carrying the raw tag when the prefix
/// is missing, nothing follows it, or the remainder is not a valid version.
///
/// # Examples
///
/// ```
/// use pikesquares_bootstrap::resolver::parse_release_tag;
///
/// let version = parse_release_tag("release_2.3.1", "release_").expect("valid tag");
/// assert_eq!(version.to_string(), "2.3.1");
/// assert!(parse_release_tag("v2.3.1", "release_").is_err());
/// ```
pub fn parse_release_tag(tag: &str, prefix: &str) -> Result<ProductVersion> {
    let resolution_err = |reason: String| BootstrapError::Resolution {
        reason,
        raw: tag.to_owned(),
    };
    let remainder = tag
        .strip_prefix(prefix)
        .ok_or_else(|| resolution_err(format!("expected the \"{prefix}\" prefix")))?;
    if remainder.is_empty() {
        return Err(resolution_err(format!("no version follows \"{prefix}\"")));
    }
    ProductVersion::parse(remainder).map_err(|e| resolution_err(e.to_string()))
}

/// Build a [`ResolveInfo`] for a version given up front.
#[must_use]
pub fn determine_tag_version(version: ProductVersion, tags: &ReleaseTags) -> ResolveInfo {
    let sha_version = if version.is_development() {
        None
    } else {
        tags.commit_for(&version).cloned()
    };
    if sha_version.is_none() && !version.is_development() {
        debug!("no commit recorded for {version}");
    }
    ResolveInfo {
        stable_version: version,
        sha_version,
    }
}

/// Ask the release endpoint for the latest stable version.
///
/// # Errors
///
/// Returns [`BootstrapError::Fetch`] when the request fails, and
/// [`BootstrapError::Resolution`] when the response has no usable
/// `tag_name`. There is no fallback.
pub fn determine_latest_stable_version(fetcher: &dyn Fetcher) -> Result<ResolveInfo> {
    info!("Fetching latest stable PikeSquares version since none is configured");
    let metadata = fetcher.fetch_json(LATEST_RELEASE_URL)?;
    let tag = metadata
        .get("tag_name")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| BootstrapError::Resolution {
            reason: format!("expected a string \"tag_name\" in {LATEST_RELEASE_URL}"),
            raw: metadata.to_string(),
        })?;
    let stable_version = parse_release_tag(tag, RELEASE_TAG_PREFIX)?;
    Ok(ResolveInfo {
        stable_version,
        sha_version: None,
    })
}

/// Resolve the version to install.
///
/// # Errors
///
/// Returns an error when a supplied version is malformed or the remote lookup
/// fails.
pub fn resolve(
    explicit: Option<&str>,
    configured: Option<&str>,
    fetcher: &dyn Fetcher,
    tags: &ReleaseTags,
) -> Result<(ResolveInfo, VersionSource)> {
    let (resolved, source) = match (explicit, configured) {
        (Some(raw), _) => (
            determine_tag_version(ProductVersion::parse(raw)?, tags),
            VersionSource::Explicit,
        ),
        (None, Some(raw)) => (
            determine_tag_version(ProductVersion::parse(raw)?, tags),
            VersionSource::ConfigFile,
        ),
        (None, None) => (
            determine_latest_stable_version(fetcher)?,
            VersionSource::LatestRelease,
        ),
    };
    info!(
        "Resolved PikeSquares {} from {source}",
        resolved.stable_version
    );
    Ok((resolved, source))
}
