//! CLI argument definitions for the PikeSquares bootstrap.
//!
//! The launcher invokes the binary twice per install: `configure` resolves the
//! version and records it, then `install` creates the virtual environment.

use crate::bootstrap::{ConfigureOptions, InstallOptions};
use crate::device_record::DEFAULT_CONTROL_PLANE_ADDRESS;
use crate::install::Platform;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Resolve, configure and install PikeSquares for the launcher.
#[derive(Parser, Debug)]
#[command(name = "pikesquares-bootstrap")]
#[command(version, about)]
#[command(long_about = concat!(
    "Resolve, configure and install PikeSquares for the launcher.\n\n",
    "`configure` decides which version to provision, prepares the platform ",
    "directories, records the decision in the device record and appends the ",
    "resolved facts to the file named by SCIE_BINDING_ENV. `install` then ",
    "creates the virtual environment for that version.\n\n",
    "Development versions (containing `dev`) install from a local checkout and ",
    "may build the native server plugins from source.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Configure the latest stable release:\n",
    "    $ pikesquares-bootstrap configure ~/.pikesquares\n\n",
    "  Configure a development checkout without building plugins:\n",
    "    $ pikesquares-bootstrap configure ~/.pikesquares \\\n",
    "        --pikesquares-version 3.0.0.dev4 --localdev-dir ~/src/pikesquares \\\n",
    "        --skip-native-build\n\n",
    "  Install a configured version:\n",
    "    $ pikesquares-bootstrap install ~/.pikesquares --pikesquares-version 2.3.1",
))]
pub struct Cli {
    /// Stage to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Bootstrap stages.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Resolve the version and record it for the launcher.
    Configure(ConfigureArgs),

    /// Create the virtual environment for a configured version.
    Install(InstallArgs),
}

/// Flags shared by both stages.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Enable debug logging.
    #[arg(long)]
    pub debug: bool,

    /// Local checkout of PikeSquares to use instead of a release.
    #[arg(long, value_name = "DIR")]
    pub localdev_dir: Option<PathBuf>,

    /// Timeout for remote requests, in seconds.
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    pub fetch_timeout: u64,
}

/// Arguments for the configure stage.
#[derive(Args, Debug, Clone)]
pub struct ConfigureArgs {
    /// The base directory to create PikeSquares venvs in.
    #[arg(value_name = "BASE_DIR")]
    pub base_dir: Utf8PathBuf,

    /// Version to configure [default: latest stable release].
    #[arg(long, value_name = "VERSION")]
    pub pikesquares_version: Option<String>,

    /// Do not offer to build the native plugins.
    #[arg(long)]
    pub skip_native_build: bool,

    /// Control plane address recorded for the server.
    #[arg(long, value_name = "ADDR", default_value = DEFAULT_CONTROL_PLANE_ADDRESS)]
    pub control_plane_address: String,

    /// Shared flags.
    #[command(flatten)]
    pub common: CommonArgs,
}

/// Arguments for the install stage.
#[derive(Args, Debug, Clone)]
pub struct InstallArgs {
    /// The base directory to create PikeSquares venvs in.
    #[arg(value_name = "BASE_DIR")]
    pub base_dir: Utf8PathBuf,

    /// Version to install.
    #[arg(long, value_name = "VERSION")]
    pub pikesquares_version: String,

    /// Shared flags.
    #[command(flatten)]
    pub common: CommonArgs,
}

impl Command {
    /// Flags shared by both stages.
    #[must_use]
    pub fn common(&self) -> &CommonArgs {
        match self {
            Self::Configure(args) => &args.common,
            Self::Install(args) => &args.common,
        }
    }
}

impl CommonArgs {
    /// Transport timeout for the fetcher.
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }
}

impl From<ConfigureArgs> for ConfigureOptions {
    fn from(args: ConfigureArgs) -> Self {
        Self {
            base_dir: args.base_dir.into_std_path_buf(),
            pikesquares_version: args.pikesquares_version,
            localdev_dir: args.common.localdev_dir,
            skip_native_build: args.skip_native_build,
            control_plane_address: args.control_plane_address,
        }
    }
}

impl From<InstallArgs> for InstallOptions {
    fn from(args: InstallArgs) -> Self {
        Self {
            base_dir: args.base_dir,
            version: args.pikesquares_version,
            localdev_dir: args.common.localdev_dir,
            platform: Platform::current(),
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
