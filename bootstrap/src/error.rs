//! Error types for the PikeSquares bootstrap.
//!
//! Every variant here is fatal: the binary prints it and exits non-zero.
//! Failures that must not abort a run, such as a broken native plugin step,
//! never become a [`BootstrapError`]; they are recorded in a
//! [`BuildReport`](crate::native_build::BuildReport) instead.

use crate::device_record::DeviceRecordError;
use crate::env_file::EnvFileError;
use crate::fetch::FetchError;
use crate::release_tags::ReleaseTagsError;
use crate::version::VersionError;
use camino::Utf8PathBuf;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while bootstrapping an installation.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// A required environment variable is absent or empty.
    #[error("expected {name} to be set in the environment")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: &'static str,
    },

    /// An environment variable held a value that could not be used.
    #[error("invalid value for {name}: {reason}")]
    InvalidEnvVar {
        /// Name of the offending variable.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The install version could not be determined.
    #[error("could not resolve the PikeSquares version: {reason}; got \"{raw}\"")]
    Resolution {
        /// Description of the failure.
        reason: String,
        /// The raw value that was fetched or supplied.
        raw: String,
    },

    /// A version string failed validation.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// Fetching remote metadata or an artifact failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The bundled release tag table is malformed.
    #[error(transparent)]
    ReleaseTags(#[from] ReleaseTagsError),

    /// A platform directory could not be determined.
    #[error("could not determine the {kind} directory")]
    DirectoryUnavailable {
        /// Which directory was being resolved.
        kind: &'static str,
    },

    /// A directory path is not valid UTF-8.
    #[error("{kind} directory is not valid UTF-8: {}", .path.display())]
    NonUtf8Path {
        /// Which directory was being resolved.
        kind: &'static str,
        /// The offending path.
        path: PathBuf,
    },

    /// Creating or configuring a directory failed.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// The directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An external command failed on a path where failure is fatal.
    #[error("{program} failed: {message}")]
    Subprocess {
        /// The program that was run.
        program: String,
        /// Captured stderr or spawn failure description.
        message: String,
    },

    /// The device record store failed.
    #[error(transparent)]
    DeviceRecord(#[from] DeviceRecordError),

    /// Writing the env-file hand-off failed.
    #[error(transparent)]
    EnvFile(#[from] EnvFileError),

    /// The project configuration file could not be read or parsed.
    #[error("invalid PikeSquares config at {}: {reason}", .path.display())]
    Config {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// The launcher's lift manifest is unreadable or lacks a bundled binary.
    #[error("lift manifest {}: {reason}", .path.display())]
    LiftManifest {
        /// Path to the manifest.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// An interactive prompt failed or was cancelled.
    #[error("prompt failed: {0}")]
    Prompt(String),

    /// The chosen local development checkout is unusable.
    #[error("local dev directory {} is not an existing directory", .path.display())]
    LocalDevDirInvalid {
        /// The rejected path.
        path: PathBuf,
    },

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Test stub received an unexpected or mismatched command invocation.
    #[cfg(any(test, feature = "test-support"))]
    #[error("stub mismatch: {message}")]
    StubMismatch {
        /// Description of what was expected versus what was received.
        message: String,
    },
}

/// Result type alias using [`BootstrapError`].
pub type Result<T> = std::result::Result<T, BootstrapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_env_var_names_the_variable() {
        let err = BootstrapError::MissingEnvVar {
            name: "SCIE_BINDING_ENV",
        };
        assert!(err.to_string().contains("SCIE_BINDING_ENV"));
    }

    #[test]
    fn resolution_error_includes_raw_value() {
        let err = BootstrapError::Resolution {
            reason: "expected the \"release_\" prefix".to_owned(),
            raw: "v2.3.1".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("release_"));
        assert!(msg.contains("v2.3.1"));
    }

    #[test]
    fn directory_create_preserves_source() {
        let err = BootstrapError::DirectoryCreate {
            path: Utf8PathBuf::from("/var/lib/pikesquares"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().contains("/var/lib/pikesquares"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn subprocess_error_includes_program() {
        let err = BootstrapError::Subprocess {
            program: "uv".to_owned(),
            message: "resolution failed".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("uv"));
        assert!(msg.contains("resolution failed"));
    }
}
