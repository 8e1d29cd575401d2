//! Platform directory abstraction.
//!
//! [`BaseDirs`] hides the per-user platform conventions behind a trait so the
//! layout logic can be tested against fixed paths.

use crate::APP_NAME;
use directories_next::ProjectDirs;
use std::path::PathBuf;

/// Per-user platform directories for the product.
#[cfg_attr(test, mockall::automock)]
pub trait BaseDirs {
    /// Per-user data directory.
    fn data_dir(&self) -> Option<PathBuf>;

    /// Per-user configuration directory.
    fn config_dir(&self) -> Option<PathBuf>;

    /// Per-user cache directory. Logs live beneath it.
    fn cache_dir(&self) -> Option<PathBuf>;

    /// Per-user runtime directory, where the platform has one.
    fn runtime_dir(&self) -> Option<PathBuf>;
}

/// [`BaseDirs`] backed by `directories-next`.
///
/// On Linux this follows the XDG base directory specification; on macOS it
/// uses `~/Library/Application Support` and friends.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBaseDirs;

impl SystemBaseDirs {
    fn project() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", APP_NAME)
    }
}

impl BaseDirs for SystemBaseDirs {
    fn data_dir(&self) -> Option<PathBuf> {
        Self::project().map(|p| p.data_dir().to_path_buf())
    }

    fn config_dir(&self) -> Option<PathBuf> {
        Self::project().map(|p| p.config_dir().to_path_buf())
    }

    fn cache_dir(&self) -> Option<PathBuf> {
        Self::project().map(|p| p.cache_dir().to_path_buf())
    }

    fn runtime_dir(&self) -> Option<PathBuf> {
        Self::project().and_then(|p| p.runtime_dir().map(std::path::Path::to_path_buf))
    }
}
