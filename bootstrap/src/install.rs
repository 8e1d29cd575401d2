//! Virtual environment install stage.
//!
//! Creates `<base_dir>/venvs/<version>` either by syncing a local checkout with
//! the launcher's bundled `uv`, or by downloading the platform's release PEX
//! and asking it to materialise a venv. Failures here are fatal.

use crate::error::{BootstrapError, Result};
use crate::exec::{CommandExecutor, CommandLine, run_checked};
use crate::fetch::Fetcher;
use crate::version::ProductVersion;
use camino::{Utf8Path, Utf8PathBuf};
use log::info;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Base URL of release artifacts; the version tag and file name follow.
pub const RELEASE_DOWNLOAD_BASE: &str =
    "https://github.com/EloquentBits/pikesquares/releases/download";

/// Operating system and architecture naming used by release artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    os: &'static str,
    arch: &'static str,
}

impl Platform {
    /// Platform of the running binary.
    #[must_use]
    pub fn current() -> Self {
        let os = if cfg!(target_os = "macos") {
            "macos"
        } else {
            "linux"
        };
        Self::new(os, std::env::consts::ARCH)
    }

    /// Platform with explicit names.
    #[must_use]
    pub const fn new(os: &'static str, arch: &'static str) -> Self {
        Self { os, arch }
    }

    /// File name of the release PEX, e.g. `pikesquares-linux-x86_64.pex`.
    ///
    /// Release PEX names spell the architecture the way `uname -m` does, so
    /// Apple silicon is `arm64` rather than `aarch64`.
    #[must_use]
    pub fn pex_name(&self) -> String {
        format!("pikesquares-{}-{}.pex", self.os, self.machine())
    }

    fn machine(&self) -> &'static str {
        match (self.os, self.arch) {
            ("macos", "aarch64") => "arm64",
            (_, arch) => arch,
        }
    }

    /// Name of the bundled `uv` entry in the lift manifest, which always uses
    /// the Rust architecture names (`uv-macos-aarch64`).
    #[must_use]
    pub fn uv_lift_name(&self) -> String {
        format!("uv-{}-{}", self.os, self.arch)
    }
}

/// Where the venv is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallSource {
    /// A local source checkout synced with `uv`.
    Checkout(Utf8PathBuf),
    /// The published release PEX.
    Release,
}

/// Paths produced by installing one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan {
    /// Version being installed.
    pub version: ProductVersion,
    /// The venv directory.
    pub venv_dir: Utf8PathBuf,
    /// The server entry point inside the venv.
    pub server_exe: Utf8PathBuf,
}

impl InstallPlan {
    /// Plan an install of `version` under `base_dir`.
    #[must_use]
    pub fn new(base_dir: &Utf8Path, version: ProductVersion) -> Self {
        let venv_dir = base_dir.join("venvs").join(version.as_str());
        let server_exe = venv_dir.join("bin").join("pikesquares");
        Self {
            version,
            venv_dir,
            server_exe,
        }
    }

    /// Download URL of the release PEX for `platform`.
    #[must_use]
    pub fn pex_url(&self, platform: Platform) -> String {
        format!(
            "{RELEASE_DOWNLOAD_BASE}/{}/{}",
            self.version,
            platform.pex_name()
        )
    }

    /// `uv sync` invocation for a local checkout.
    #[must_use]
    pub fn uv_sync_command(&self, uv: &Path, python: &str, checkout: &Utf8Path) -> CommandLine {
        CommandLine::new(uv.to_string_lossy())
            .args(["sync", "--python", python, "--verbose"])
            .current_dir(checkout)
            .env("UV_PROJECT_ENVIRONMENT", self.venv_dir.as_str())
    }

    /// PEX tools invocation that builds the venv from a downloaded PEX.
    #[must_use]
    pub fn pex_venv_command(&self, python: &str, pex: &Path) -> CommandLine {
        CommandLine::new(python)
            .arg(pex.to_string_lossy())
            .args(["venv", "--prompt"])
            .arg(format!("PikeSquares {}", self.version))
            .args([
                "--compile",
                "--pip",
                "--collisions-ok",
                "--no-emit-warnings",
                "--disable-cache",
            ])
            .arg(self.venv_dir.as_str())
            .env("PEX_TOOLS", "1")
    }

    /// Build the venv from a local checkout.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Subprocess`] if `uv` fails.
    pub fn sync_checkout(
        &self,
        executor: &dyn CommandExecutor,
        uv: &Path,
        python: &str,
        checkout: &Utf8Path,
    ) -> Result<()> {
        info!("Syncing {checkout} into {}", self.venv_dir);
        run_checked(executor, &self.uv_sync_command(uv, python, checkout))?;
        Ok(())
    }

    /// Download the release PEX and build the venv from it.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Fetch`] if the download fails and
    /// [`BootstrapError::Subprocess`] if venv creation fails.
    pub fn install_release(
        &self,
        executor: &dyn CommandExecutor,
        fetcher: &dyn Fetcher,
        python: &str,
        platform: Platform,
    ) -> Result<()> {
        let url = self.pex_url(platform);
        let pex = tempfile::Builder::new().suffix(".pex").tempfile()?;
        info!("Downloading {url}");
        fetcher.fetch_to_file(&url, pex.path())?;
        info!(
            "Installing pikesquares=={} into a virtual environment at {}",
            self.version, self.venv_dir
        );
        run_checked(executor, &self.pex_venv_command(python, pex.path()))?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct LiftManifest {
    scie: LiftScie,
}

#[derive(Debug, Deserialize)]
struct LiftScie {
    lift: LiftSection,
}

#[derive(Debug, Deserialize)]
struct LiftSection {
    #[serde(default)]
    files: Vec<LiftFile>,
}

#[derive(Debug, Deserialize)]
struct LiftFile {
    name: String,
    #[serde(default)]
    key: Option<String>,
}

/// Locate the bundled `uv` binary.
///
/// The lift manifest lists every file the launcher unpacked; the entry named
/// `uv-<os>-<arch>` gives the directory under `uv_root` holding `uv`.
///
/// # Errors
///
/// Returns [`BootstrapError::LiftManifest`] if the manifest cannot be read, has
/// no matching entry, or the binary is absent.
pub fn locate_uv(lift_file: &Path, uv_root: &Path, platform: Platform) -> Result<PathBuf> {
    let manifest_err = |reason: String| BootstrapError::LiftManifest {
        path: lift_file.to_path_buf(),
        reason,
    };
    let text = std::fs::read_to_string(lift_file).map_err(|e| manifest_err(e.to_string()))?;
    let manifest: LiftManifest =
        serde_json::from_str(&text).map_err(|e| manifest_err(e.to_string()))?;

    let wanted = platform.uv_lift_name();
    let entry = manifest
        .scie
        .lift
        .files
        .into_iter()
        .find(|f| f.name == wanted)
        .ok_or_else(|| manifest_err(format!("no \"{wanted}\" entry")))?;
    let uv = uv_root
        .join(entry.key.unwrap_or(entry.name))
        .join("uv");
    if uv.is_file() {
        Ok(uv)
    } else {
        Err(manifest_err(format!("unable to locate uv at {}", uv.display())))
    }
}
