//! Optional `pikesquares.toml` project configuration.
//!
//! A project may pin the product version it expects:
//!
//! ```toml
//! [GLOBAL]
//! pikesquares_version = "2.3.1"
//! ```
//!
//! The file is looked up in the working directory unless `PIKESQUARES_TOML`
//! names it explicitly, in which case it must exist.

use crate::error::{BootstrapError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const CONFIG_FILENAME: &str = "pikesquares.toml";

#[derive(Debug, Default, Deserialize)]
struct Global {
    #[serde(default)]
    pikesquares_version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default, rename = "GLOBAL")]
    global: Global,
}

/// Parsed project configuration.
#[derive(Debug)]
pub struct PikeSquaresConfig {
    path: PathBuf,
    raw: RawConfig,
}

impl PikeSquaresConfig {
    /// Locate and parse the project configuration.
    ///
    /// With `explicit` set the file must exist; otherwise a missing
    /// `<dir>/pikesquares.toml` yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Config`] if the file cannot be read or is not
    /// valid TOML.
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> Result<Option<Self>> {
        match explicit {
            Some(path) => Self::load(path).map(Some),
            None => {
                let path = dir.join(CONFIG_FILENAME);
                if path.is_file() {
                    Self::load(&path).map(Some)
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Parse the configuration at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Config`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let config_err = |reason: String| BootstrapError::Config {
            path: path.to_path_buf(),
            reason,
        };
        let contents = std::fs::read_to_string(path).map_err(|e| config_err(e.to_string()))?;
        let raw: RawConfig = toml::from_str(&contents).map_err(|e| config_err(e.to_string()))?;
        log::debug!("loaded config from {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            raw,
        })
    }

    /// Version pinned under `[GLOBAL]`, if any.
    #[must_use]
    pub fn pikesquares_version(&self) -> Option<&str> {
        self.raw
            .global
            .pikesquares_version
            .as_deref()
            .filter(|v| !v.is_empty())
    }

    /// Path the configuration was read from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
