//! Process environment and identity captured once per run.
//!
//! Every environment variable and uid/gid the bootstrap consults is read here,
//! exactly once, into a [`BootstrapContext`] that is then passed by reference
//! to each component. Nothing else in the crate touches `std::env` for
//! configuration.

use crate::error::{BootstrapError, Result};
use log::warn;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Path of the env-file hand-off read by the launcher after we exit.
pub const ENV_FILE_VAR: &str = "SCIE_BINDING_ENV";
/// Telemetry DSN recorded in the device record.
pub const SENTRY_DSN_VAR: &str = "PIKESQUARES_SENTRY_DSN";
/// Directory of the PKI tool used by the server.
pub const EASYRSA_DIR_VAR: &str = "PIKESQUARES_EASYRSA_DIR";
/// PKI tool binary used by the server.
pub const EASYRSA_BIN_VAR: &str = "PIKESQUARES_EASYRSA_BIN";
/// Root under which the launcher unpacked its bundled `uv` binaries.
pub const UV_ROOT_VAR: &str = "PIKESQUARES_UV_ROOT";
/// Interpreter used for venv creation and native builds.
pub const PYTHON_BIN_VAR: &str = "PIKESQUARES_PYTHON_BIN";
/// The launcher's lift manifest, listing bundled files and their keys.
pub const LIFT_FILE_VAR: &str = "SCIE_LIFT_FILE";
/// Explicit location of `pikesquares.toml`.
pub const CONFIG_FILE_VAR: &str = "PIKESQUARES_TOML";

const SUDO_UID_VAR: &str = "SUDO_UID";
const SUDO_GID_VAR: &str = "SUDO_GID";

/// A numeric user and group pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Identity {
    /// User id.
    pub uid: u32,
    /// Group id.
    pub gid: u32,
}

impl Identity {
    /// The superuser.
    pub const ROOT: Self = Self { uid: 0, gid: 0 };

    /// Return the real uid/gid of this process.
    #[must_use]
    pub fn current() -> Self {
        // SAFETY: getuid and getgid have no preconditions and cannot fail.
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Self { uid, gid }
    }

    /// Return true for uid 0.
    #[must_use]
    pub fn is_root(self) -> bool {
        self.uid == 0
    }
}

/// Facts about the running process that do not come from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessFacts {
    /// Real identity of the process.
    pub identity: Identity,
    /// Whether the effective uid is root.
    pub privileged: bool,
    /// Working directory at startup.
    pub cwd: PathBuf,
}

impl ProcessFacts {
    /// Capture the facts of the current process.
    ///
    /// # Errors
    ///
    /// Returns an error if the working directory cannot be read.
    pub fn current() -> Result<Self> {
        // SAFETY: geteuid has no preconditions and cannot fail.
        let euid = unsafe { libc::geteuid() };
        Ok(Self {
            identity: Identity::current(),
            privileged: euid == 0,
            cwd: std::env::current_dir()?,
        })
    }
}

/// Everything the bootstrap needs to know about its environment.
#[derive(Debug, Clone)]
pub struct BootstrapContext {
    env_file: PathBuf,
    sentry_dsn: Option<String>,
    easyrsa_dir: Option<PathBuf>,
    easyrsa_bin: Option<PathBuf>,
    uv_root: Option<PathBuf>,
    python_bin: Option<PathBuf>,
    lift_file: Option<PathBuf>,
    config_file: Option<PathBuf>,
    sudo_invoker: Option<Identity>,
    facts: ProcessFacts,
}

impl BootstrapContext {
    /// Build the context from the real process environment.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::MissingEnvVar`] when `SCIE_BINDING_ENV` is
    /// unset or empty, before any other work is attempted.
    pub fn from_process() -> Result<Self> {
        let env_file = required_path(&|name| std::env::var_os(name), ENV_FILE_VAR)?;
        let facts = ProcessFacts::current()?;
        Self::assemble(env_file, &|name| std::env::var_os(name), facts)
    }

    /// Build the context from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::MissingEnvVar`] when `SCIE_BINDING_ENV` is
    /// missing from `lookup`.
    pub fn from_lookup<F>(lookup: F, facts: ProcessFacts) -> Result<Self>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let env_file = required_path(&lookup, ENV_FILE_VAR)?;
        Self::assemble(env_file, &lookup, facts)
    }

    fn assemble(
        env_file: PathBuf,
        lookup: &dyn Fn(&str) -> Option<OsString>,
        facts: ProcessFacts,
    ) -> Result<Self> {
        let sentry_dsn = match optional(lookup, SENTRY_DSN_VAR) {
            Some(value) => Some(value.into_string().map_err(|_| {
                BootstrapError::InvalidEnvVar {
                    name: SENTRY_DSN_VAR,
                    reason: "value is not valid UTF-8".to_owned(),
                }
            })?),
            None => None,
        };

        Ok(Self {
            env_file,
            sentry_dsn,
            easyrsa_dir: optional(lookup, EASYRSA_DIR_VAR).map(PathBuf::from),
            easyrsa_bin: optional(lookup, EASYRSA_BIN_VAR).map(PathBuf::from),
            uv_root: optional(lookup, UV_ROOT_VAR).map(PathBuf::from),
            python_bin: optional(lookup, PYTHON_BIN_VAR).map(PathBuf::from),
            lift_file: optional(lookup, LIFT_FILE_VAR).map(PathBuf::from),
            config_file: optional(lookup, CONFIG_FILE_VAR).map(PathBuf::from),
            sudo_invoker: sudo_invoker(lookup),
            facts,
        })
    }

    /// Path of the env-file hand-off.
    #[must_use]
    pub fn env_file(&self) -> &Path {
        &self.env_file
    }

    /// Telemetry DSN, when configured.
    #[must_use]
    pub fn sentry_dsn(&self) -> Option<&str> {
        self.sentry_dsn.as_deref()
    }

    /// PKI tool directory override.
    #[must_use]
    pub fn easyrsa_dir(&self) -> Option<&Path> {
        self.easyrsa_dir.as_deref()
    }

    /// PKI tool binary override.
    #[must_use]
    pub fn easyrsa_bin(&self) -> Option<&Path> {
        self.easyrsa_bin.as_deref()
    }

    /// Root of the launcher's bundled `uv` binaries.
    #[must_use]
    pub fn uv_root(&self) -> Option<&Path> {
        self.uv_root.as_deref()
    }

    /// Interpreter override.
    #[must_use]
    pub fn python_bin(&self) -> Option<&Path> {
        self.python_bin.as_deref()
    }

    /// The launcher's lift manifest.
    #[must_use]
    pub fn lift_file(&self) -> Option<&Path> {
        self.lift_file.as_deref()
    }

    /// Explicit `pikesquares.toml` location.
    #[must_use]
    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    /// The user that invoked us through sudo, if any.
    #[must_use]
    pub fn sudo_invoker(&self) -> Option<Identity> {
        self.sudo_invoker
    }

    /// Real identity of this process.
    #[must_use]
    pub fn identity(&self) -> Identity {
        self.facts.identity
    }

    /// Whether the process runs with an effective uid of root.
    #[must_use]
    pub fn is_privileged(&self) -> bool {
        self.facts.privileged
    }

    /// Working directory at startup.
    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.facts.cwd
    }
}

fn optional(lookup: &dyn Fn(&str) -> Option<OsString>, name: &str) -> Option<OsString> {
    lookup(name).filter(|value| !value.is_empty())
}

fn required_path(
    lookup: &dyn Fn(&str) -> Option<OsString>,
    name: &'static str,
) -> Result<PathBuf> {
    optional(lookup, name)
        .map(PathBuf::from)
        .ok_or(BootstrapError::MissingEnvVar { name })
}

fn sudo_invoker(lookup: &dyn Fn(&str) -> Option<OsString>) -> Option<Identity> {
    let uid = optional(lookup, SUDO_UID_VAR)?;
    let gid = optional(lookup, SUDO_GID_VAR)?;
    let parse = |value: &OsString| value.to_str().and_then(|s| s.parse::<u32>().ok());
    match (parse(&uid), parse(&gid)) {
        (Some(uid), Some(gid)) => Some(Identity { uid, gid }),
        _ => {
            warn!("ignoring unparseable {SUDO_UID_VAR}/{SUDO_GID_VAR}");
            None
        }
    }
}
