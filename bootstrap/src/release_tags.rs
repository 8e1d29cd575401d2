//! Bundled release tag to commit table.
//!
//! The table maps `release_<version>` tags to the commit they point at and is
//! regenerated at release time with:
//!
//! ```text
//! git tag --list 'release_*' \
//!   | xargs -I@ bash -c 'jq --arg T @ --arg C $(git rev-parse @^{commit}) -n "{(\$T): \$C}"' \
//!   | jq -s 'add // {}' > bootstrap/data/release_tags.json
//! ```

use crate::version::ProductVersion;
use std::collections::HashMap;
use std::fmt;

/// Prefix carried by every release tag.
pub const RELEASE_TAG_PREFIX: &str = "release_";

const BUNDLED_TABLE: &str = include_str!("../data/release_tags.json");

const MIN_SHA_LEN: usize = 7;
const MAX_SHA_LEN: usize = 40;

/// Errors raised while loading a tag table.
#[derive(Debug, thiserror::Error)]
pub enum ReleaseTagsError {
    /// The table is not a JSON object of strings.
    #[error("malformed release tag table: {0}")]
    Parse(#[from] serde_json::Error),

    /// A commit reference in the table is malformed.
    #[error("invalid commit \"{value}\" for tag {tag}: {reason}")]
    InvalidGitSha {
        /// Tag whose commit was rejected.
        tag: String,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// A validated abbreviated or full git commit SHA.
///
/// # Examples
///
/// ```
/// use pikesquares_bootstrap::release_tags::GitSha;
///
/// let sha = GitSha::parse("abc1234").expect("valid sha");
/// assert_eq!(sha.as_str(), "abc1234");
/// assert!(GitSha::parse("ABC").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GitSha(String);

impl GitSha {
    /// Validate `value` as a lowercase hex SHA of 7 to 40 characters.
    ///
    /// # Errors
    ///
    /// Returns a static description of the violated rule.
    pub fn parse(value: &str) -> Result<Self, &'static str> {
        if !(MIN_SHA_LEN..=MAX_SHA_LEN).contains(&value.len()) {
            return Err("SHA must be 7 to 40 characters");
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err("SHA must be lowercase hexadecimal");
        }
        Ok(Self(value.to_owned()))
    }

    /// Return the SHA as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for GitSha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lookup table from release tag to commit.
#[derive(Debug, Clone, Default)]
pub struct ReleaseTags {
    tags: HashMap<String, GitSha>,
}

impl ReleaseTags {
    /// Load the table compiled into this binary.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled table is malformed.
    pub fn bundled() -> Result<Self, ReleaseTagsError> {
        Self::from_json(BUNDLED_TABLE)
    }

    /// Parse a table from a JSON object of `tag: sha` pairs.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or holds an invalid SHA.
    pub fn from_json(json: &str) -> Result<Self, ReleaseTagsError> {
        let raw: HashMap<String, String> = serde_json::from_str(json)?;
        let tags = raw
            .into_iter()
            .map(|(tag, value)| match GitSha::parse(&value) {
                Ok(sha) => Ok((tag, sha)),
                Err(reason) => Err(ReleaseTagsError::InvalidGitSha { tag, value, reason }),
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { tags })
    }

    /// Commit for the release tag of `version`, if the table knows it.
    #[must_use]
    pub fn commit_for(&self, version: &ProductVersion) -> Option<&GitSha> {
        self.tags.get(&release_tag(version))
    }

    /// Number of known tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Tag name under which `version` is released.
#[must_use]
pub fn release_tag(version: &ProductVersion) -> String {
    format!("{RELEASE_TAG_PREFIX}{version}")
}
