//! Directory layout derivation and creation.
//!
//! Unprivileged runs use the per-user platform directories from
//! [`BaseDirs`]; runs with an effective uid of root use the site-wide
//! layout under `/var/lib`, `/var/log`, `/run` and `/etc`. Either way the
//! plugins and PKI directories live under the data directory.

use crate::APP_NAME;
use crate::dirs::BaseDirs;
use crate::error::{BootstrapError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use std::path::PathBuf;

/// Mode applied to the plugins directory so that processes running under
/// different uids can all drop artifacts into it.
pub const PLUGINS_DIR_MODE: u32 = 0o777;

/// Resolved directories for one installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryLayout {
    /// Data directory; holds the device record.
    pub data_dir: Utf8PathBuf,
    /// Log directory.
    pub log_dir: Utf8PathBuf,
    /// Runtime directory.
    pub run_dir: Utf8PathBuf,
    /// Configuration directory.
    pub config_dir: Utf8PathBuf,
    /// Shared native plugin directory.
    pub plugins_dir: Utf8PathBuf,
    /// PKI directory.
    pub pki_dir: Utf8PathBuf,
}

impl DirectoryLayout {
    /// Derive the per-user layout.
    ///
    /// # Errors
    ///
    /// Returns an error when a platform directory is unknown or not UTF-8.
    pub fn for_user(dirs: &dyn BaseDirs) -> Result<Self> {
        let data_dir = utf8("data", dirs.data_dir())?;
        let config_dir = utf8("config", dirs.config_dir())?;
        let log_dir = utf8("cache", dirs.cache_dir())?.join("log");
        let run_dir = match dirs.runtime_dir() {
            Some(dir) => utf8("runtime", Some(dir))?,
            None => data_dir.join("run"),
        };
        Ok(Self::with_data_dir(data_dir, log_dir, run_dir, config_dir))
    }

    /// Derive the site-wide layout rooted at `/`.
    #[must_use]
    pub fn site() -> Self {
        Self::site_under(Utf8Path::new("/"))
    }

    /// Derive the site-wide layout under an arbitrary root.
    #[must_use]
    pub fn site_under(root: &Utf8Path) -> Self {
        Self::with_data_dir(
            root.join("var/lib").join(APP_NAME),
            root.join("var/log").join(APP_NAME),
            root.join("run").join(APP_NAME),
            root.join("etc").join(APP_NAME),
        )
    }

    /// Derive the layout appropriate for the privilege level.
    ///
    /// # Errors
    ///
    /// Returns an error when a per-user directory cannot be determined.
    pub fn resolve(dirs: &dyn BaseDirs, privileged: bool) -> Result<Self> {
        if privileged {
            Ok(Self::site())
        } else {
            Self::for_user(dirs)
        }
    }

    fn with_data_dir(
        data_dir: Utf8PathBuf,
        log_dir: Utf8PathBuf,
        run_dir: Utf8PathBuf,
        config_dir: Utf8PathBuf,
    ) -> Self {
        Self {
            plugins_dir: data_dir.join("plugins"),
            pki_dir: data_dir.join("pki"),
            data_dir,
            log_dir,
            run_dir,
            config_dir,
        }
    }

    /// Create every directory in the layout. Existing directories are left
    /// alone, so calling this again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::DirectoryCreate`] for the first directory
    /// that cannot be created or whose permissions cannot be set.
    pub fn ensure(&self) -> Result<()> {
        for dir in self.all() {
            std::fs::create_dir_all(dir).map_err(|source| BootstrapError::DirectoryCreate {
                path: dir.to_owned(),
                source,
            })?;
            debug!("directory ready: {dir}");
        }
        open_permissions(&self.plugins_dir)
    }

    /// Every directory, in creation order.
    #[must_use]
    pub fn all(&self) -> [&Utf8Path; 6] {
        [
            &self.data_dir,
            &self.log_dir,
            &self.run_dir,
            &self.config_dir,
            &self.plugins_dir,
            &self.pki_dir,
        ]
    }
}

/// What to do about the plugins directory mode.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModeFix {
    Keep,
    Open,
    /// Wrong mode, but owned by someone else; chmod would fail.
    Foreign,
}

#[cfg(unix)]
fn mode_fix(mode: u32, owner: u32, euid: u32) -> ModeFix {
    if mode & 0o777 == PLUGINS_DIR_MODE {
        ModeFix::Keep
    } else if owner == euid {
        ModeFix::Open
    } else {
        ModeFix::Foreign
    }
}

#[cfg(unix)]
fn open_permissions(dir: &Utf8Path) -> Result<()> {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    let dir_err = |source| BootstrapError::DirectoryCreate {
        path: dir.to_owned(),
        source,
    };
    let metadata = std::fs::metadata(dir).map_err(dir_err)?;
    // SAFETY: geteuid has no preconditions and cannot fail.
    let euid = unsafe { libc::geteuid() };
    match mode_fix(metadata.mode(), metadata.uid(), euid) {
        ModeFix::Keep => Ok(()),
        ModeFix::Open => {
            std::fs::set_permissions(dir, std::fs::Permissions::from_mode(PLUGINS_DIR_MODE))
                .map_err(dir_err)
        }
        ModeFix::Foreign => {
            warn!(
                "{dir} is owned by uid {} and not mode {PLUGINS_DIR_MODE:o}; leaving it as is",
                metadata.uid()
            );
            Ok(())
        }
    }
}

#[cfg(not(unix))]
fn open_permissions(_dir: &Utf8Path) -> Result<()> {
    Ok(())
}

fn utf8(kind: &'static str, path: Option<PathBuf>) -> Result<Utf8PathBuf> {
    let path = path.ok_or(BootstrapError::DirectoryUnavailable { kind })?;
    Utf8PathBuf::try_from(path).map_err(|e| BootstrapError::NonUtf8Path {
        kind,
        path: e.into_path_buf(),
    })
}
