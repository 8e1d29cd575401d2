//! Product version newtype.
//!
//! Accepts PEP 440 versions: an optional epoch, dotted release components,
//! then optional pre-release, post-release, development and local segments.
//! The alternate spellings (`0.4.0dev1`, `0.4.0-dev`, `1.0-beta`, `1.0-1`)
//! parse to the same version as their normalised forms. The input is kept
//! verbatim for display, which makes parsing and printing round-trip exactly.

use regex::{Captures, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// The substring that marks a non-release, locally built version.
pub const DEVELOPMENT_MARKER: &str = "dev";

const VERSION_PATTERN: &str = r"^v?
    (?:(?P<epoch>[0-9]+)!)?
    (?P<release>[0-9]+(?:\.[0-9]+)*)
    (?:[-_.]?(?P<pre_l>alpha|a|beta|b|preview|pre|c|rc)[-_.]?(?P<pre_n>[0-9]+)?)?
    (?:-(?P<post_n1>[0-9]+)|[-_.]?(?P<post_l>post|rev|r)[-_.]?(?P<post_n2>[0-9]+)?)?
    (?:[-_.]?(?P<dev_l>dev)[-_.]?(?P<dev_n>[0-9]+)?)?
    (?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?
$";

#[expect(clippy::expect_used, reason = "the pattern is a constant")]
static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(VERSION_PATTERN)
        .case_insensitive(true)
        .ignore_whitespace(true)
        .build()
        .expect("valid version pattern")
});

/// Errors raised while parsing a [`ProductVersion`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version \"{value}\": {reason}")]
pub struct VersionError {
    /// The rejected input.
    pub value: String,
    /// Which rule the input violated.
    pub reason: String,
}

/// Pre-release phase, ordered `a < b < rc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PreReleaseKind {
    /// Alpha (`a`, `alpha`).
    Alpha,
    /// Beta (`b`, `beta`).
    Beta,
    /// Release candidate (`rc`, `c`, `pre`, `preview`).
    ReleaseCandidate,
}

/// One dot-separated piece of a local version label.
///
/// Alphanumeric pieces sort before numeric ones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum LocalSegment {
    Text(String),
    Number(u64),
}

/// A validated PikeSquares version such as `0.3.1`, `1.0rc2` or `0.4.0.dev3`.
///
/// # Examples
///
/// ```
/// use pikesquares_bootstrap::version::ProductVersion;
///
/// let dev: ProductVersion = "0.4.0.dev3".parse().expect("valid version");
/// let release: ProductVersion = "0.4.0".parse().expect("valid version");
/// assert!(dev.is_development());
/// assert!(dev < release);
/// assert_eq!(dev.to_string(), "0.4.0.dev3");
///
/// let spelled: ProductVersion = "0.4.0-DEV3".parse().expect("valid version");
/// assert_eq!(spelled, dev);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProductVersion {
    raw: String,
    epoch: u64,
    release: Vec<u64>,
    pre: Option<(PreReleaseKind, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Option<Vec<LocalSegment>>,
}

impl ProductVersion {
    /// Parse and validate a version string.
    ///
    /// Surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError`] when the input is not a PEP 440 version.
    pub fn parse(value: &str) -> Result<Self, VersionError> {
        let raw = value.trim();
        let caps = VERSION_RE
            .captures(raw)
            .ok_or_else(|| invalid(value, "not a PEP 440 version"))?;

        let number = |name: &str| -> Result<Option<u64>, VersionError> {
            caps.name(name)
                .map(|m| parse_number(m.as_str(), value))
                .transpose()
        };

        let release = caps
            .name("release")
            .map_or("", |m| m.as_str())
            .split('.')
            .map(|component| parse_number(component, value))
            .collect::<Result<Vec<_>, _>>()?;
        let pre = match caps.name("pre_l") {
            Some(label) => {
                let kind = pre_release_kind(label.as_str());
                Some((kind, number("pre_n")?.unwrap_or(0)))
            }
            None => None,
        };
        let post = match (number("post_n1")?, has(&caps, "post_l")) {
            (Some(n), _) => Some(n),
            (None, true) => Some(number("post_n2")?.unwrap_or(0)),
            (None, false) => None,
        };
        let dev = if has(&caps, "dev_l") {
            Some(number("dev_n")?.unwrap_or(0))
        } else {
            None
        };
        let local = caps.name("local").map(|m| parse_local(m.as_str()));

        Ok(Self {
            raw: raw.to_owned(),
            epoch: number("epoch")?.unwrap_or(0),
            release,
            pre,
            post,
            dev,
            local,
        })
    }

    /// Return the version exactly as it was written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Return true when this is a development build.
    ///
    /// Besides a `dev` segment, the marker anywhere in the input (for example
    /// in a local label such as `1.0+dev.build`) counts.
    #[must_use]
    pub fn is_development(&self) -> bool {
        self.dev.is_some() || self.raw.contains(DEVELOPMENT_MARKER)
    }

    /// Return the numeric release components.
    #[must_use]
    pub fn release(&self) -> &[u64] {
        &self.release
    }

    fn release_component(&self, index: usize) -> u64 {
        self.release.get(index).copied().unwrap_or(0)
    }

    /// Rank of the phase within one release number: dev-only builds first,
    /// then pre-releases, then the final release.
    fn phase(&self) -> (u8, Option<(PreReleaseKind, u64)>) {
        match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => (0, None),
            (Some(pre), _, _) => (1, Some(pre)),
            (None, _, _) => (2, None),
        }
    }
}

impl PartialEq for ProductVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ProductVersion {}

impl PartialOrd for ProductVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ProductVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let width = self.release.len().max(other.release.len());
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| {
                (0..width)
                    .map(|i| self.release_component(i).cmp(&other.release_component(i)))
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| self.phase().cmp(&other.phase()))
            .then_with(|| self.post.cmp(&other.post))
            .then_with(|| match (self.dev, other.dev) {
                (Some(a), Some(b)) => a.cmp(&b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
            .then_with(|| self.local.cmp(&other.local))
    }
}

impl FromStr for ProductVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ProductVersion {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ProductVersion> for String {
    fn from(version: ProductVersion) -> Self {
        version.raw
    }
}

impl fmt::Display for ProductVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn invalid(value: &str, reason: impl Into<String>) -> VersionError {
    VersionError {
        value: value.to_owned(),
        reason: reason.into(),
    }
}

fn has(caps: &Captures<'_>, name: &str) -> bool {
    caps.name(name).is_some()
}

fn pre_release_kind(label: &str) -> PreReleaseKind {
    match label.to_ascii_lowercase().as_str() {
        "a" | "alpha" => PreReleaseKind::Alpha,
        "b" | "beta" => PreReleaseKind::Beta,
        _ => PreReleaseKind::ReleaseCandidate,
    }
}

fn parse_local(label: &str) -> Vec<LocalSegment> {
    label
        .split(['.', '-', '_'])
        .map(|piece| match piece.parse() {
            Ok(n) => LocalSegment::Number(n),
            Err(_) => LocalSegment::Text(piece.to_ascii_lowercase()),
        })
        .collect()
}

fn parse_number(digits: &str, value: &str) -> Result<u64, VersionError> {
    digits
        .parse()
        .map_err(|e| invalid(value, format!("\"{digits}\": {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn v(value: &str) -> ProductVersion {
        ProductVersion::parse(value).expect("valid version")
    }

    #[rstest]
    #[case::plain("2.3.1")]
    #[case::single("7")]
    #[case::dev("0.4.0.dev3")]
    #[case::rc("1.0rc2")]
    #[case::post_dev("1.0.post1.dev2")]
    fn display_round_trips_input(#[case] input: &str) {
        assert_eq!(v(input).to_string(), input);
    }

    #[rstest]
    #[case::empty("")]
    #[case::trailing_dot("1.2.")]
    #[case::letters_in_release("2.3.x")]
    #[case::foreign_tag_prefix("release_2.3.1")]
    #[case::dev_before_post("1.0.dev1.post1")]
    #[case::unknown_segment("1.0-gamma")]
    #[case::empty_local("1.0+")]
    fn rejects_malformed_versions(#[case] input: &str) {
        assert!(ProductVersion::parse(input).is_err(), "{input} accepted");
    }

    #[rstest]
    #[case::implicit_dev_number("0.4.0.dev", "0.4.0.dev0")]
    #[case::dev_without_separator("0.4.0dev1", "0.4.0.dev1")]
    #[case::dev_after_dash("0.4.0-dev1", "0.4.0.dev1")]
    #[case::dev_after_underscore("0.4.0_dev1", "0.4.0.dev1")]
    #[case::upper_case_dev("0.4.0.DEV1", "0.4.0.dev1")]
    #[case::spelled_beta("1.0-beta", "1.0b0")]
    #[case::spelled_alpha("1.0.alpha.2", "1.0a2")]
    #[case::preview_is_rc("1.0preview1", "1.0rc1")]
    #[case::c_is_rc("1.0c1", "1.0rc1")]
    #[case::implicit_post("1.0-1", "1.0.post1")]
    #[case::rev_is_post("1.0rev2", "1.0.post2")]
    #[case::implicit_post_number("1.0.post", "1.0.post0")]
    #[case::leading_zero("01.02", "1.2")]
    #[case::v_prefix("v2.3.1", "2.3.1")]
    #[case::explicit_zero_epoch("0!2.3.1", "2.3.1")]
    fn alternate_spellings_parse_to_the_normal_form(
        #[case] spelled: &str,
        #[case] normal: &str,
    ) {
        assert_eq!(v(spelled), v(normal), "{spelled} should equal {normal}");
        assert_eq!(v(spelled).to_string(), spelled);
    }

    #[rstest]
    #[case::implicit_dev_number("0.4.0.dev")]
    #[case::dev_without_separator("0.4.0dev1")]
    #[case::dev_after_dash("0.4.0-dev1")]
    #[case::local_label("0.4.0+dev.build")]
    fn alternate_dev_spellings_are_development_builds(#[case] input: &str) {
        assert!(v(input).is_development(), "{input} should be a development build");
    }

    #[rstest]
    #[case("1.0.dev1", "1.0a1")]
    #[case("1.0a1", "1.0b1")]
    #[case("1.0b1", "1.0rc1")]
    #[case("1.0rc1", "1.0")]
    #[case("1.0", "1.0.post1.dev1")]
    #[case("1.0.post1.dev1", "1.0.post1")]
    #[case("1.9", "1.10")]
    #[case("0.4.0.dev3", "0.4.0.dev12")]
    #[case("1.0a1.dev1", "1.0a1")]
    #[case("1.0", "1.0+local")]
    #[case("1.0+abc", "1.0+1")]
    #[case("1.0+1", "1.0+1.1")]
    #[case("2.0", "1!1.0")]
    fn orders_versions(#[case] lower: &str, #[case] higher: &str) {
        assert!(v(lower) < v(higher), "{lower} should sort before {higher}");
    }

    #[test]
    fn missing_components_compare_as_zero() {
        assert_eq!(v("1.0"), v("1.0.0"));
    }

    #[rstest]
    #[case("0.4.0.dev3", true)]
    #[case("0.4.0", false)]
    #[case("1.0rc1", false)]
    fn detects_development_marker(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(v(input).is_development(), expected);
        assert_eq!(input.contains(DEVELOPMENT_MARKER), expected);
    }

    #[test]
    fn serde_uses_plain_string() {
        let json = serde_json::to_string(&v("2.3.1")).expect("serialise");
        assert_eq!(json, "\"2.3.1\"");
        let parsed: ProductVersion = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(parsed.as_str(), "2.3.1");
        assert!(serde_json::from_str::<ProductVersion>("\"nope\"").is_err());
    }
}
