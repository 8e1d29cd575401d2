//! Append-only `KEY=VALUE` hand-off writer.
//!
//! The launcher that spawned us reads this file after we exit and injects
//! every line into the environment of the next stage. Lines are only ever
//! appended; a key written once in a run cannot be written again.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Errors raised while writing the env-file hand-off.
#[derive(Debug, thiserror::Error)]
pub enum EnvFileError {
    /// The key was already written during this run.
    #[error("env key {key} was already written during this run")]
    DuplicateKey {
        /// The repeated key.
        key: String,
    },

    /// The key is not an upper-case shell identifier.
    #[error("invalid env key \"{key}\"")]
    InvalidKey {
        /// The rejected key.
        key: String,
    },

    /// The value would break the line format.
    #[error("value for {key} contains a line break")]
    InvalidValue {
        /// Key whose value was rejected.
        key: String,
    },

    /// Appending to the file failed.
    #[error("failed to append to {}: {source}", .path.display())]
    Write {
        /// Path of the hand-off file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Writer for one run's env-file lines.
#[derive(Debug)]
pub struct EnvFile {
    path: PathBuf,
    written: HashSet<String>,
    lines: Vec<(String, String)>,
}

impl EnvFile {
    /// Create a writer targeting `path`. The file is not touched until the
    /// first append.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            written: HashSet::new(),
            lines: Vec::new(),
        }
    }

    /// Path of the hand-off file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `KEY=VALUE` to the file.
    ///
    /// # Errors
    ///
    /// Returns [`EnvFileError::DuplicateKey`] if `key` was already written by
    /// this writer, [`EnvFileError::InvalidKey`] or
    /// [`EnvFileError::InvalidValue`] for malformed input, and
    /// [`EnvFileError::Write`] if the file cannot be appended to.
    pub fn append(&mut self, key: &str, value: impl AsRef<str>) -> Result<(), EnvFileError> {
        let value = value.as_ref();
        validate_key(key)?;
        if value.contains(['\n', '\r']) {
            return Err(EnvFileError::InvalidValue {
                key: key.to_owned(),
            });
        }
        if self.written.contains(key) {
            return Err(EnvFileError::DuplicateKey {
                key: key.to_owned(),
            });
        }

        let write_err = |source| EnvFileError::Write {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_err)?;
        writeln!(file, "{key}={value}").map_err(write_err)?;

        log::debug!("env file: {key}={value}");
        self.written.insert(key.to_owned());
        self.lines.push((key.to_owned(), value.to_owned()));
        Ok(())
    }

    /// Lines written so far, in order.
    #[must_use]
    pub fn lines(&self) -> &[(String, String)] {
        &self.lines
    }
}

fn validate_key(key: &str) -> Result<(), EnvFileError> {
    let mut chars = key.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_uppercase() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    if valid_start && valid_rest {
        Ok(())
    } else {
        Err(EnvFileError::InvalidKey {
            key: key.to_owned(),
        })
    }
}
