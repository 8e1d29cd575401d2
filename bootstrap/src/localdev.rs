//! Local source checkout selection for development installs.

use crate::error::{BootstrapError, Result};
use crate::exec::{CommandExecutor, CommandLine, stdout_text};
use camino::Utf8PathBuf;
use inquire::{Confirm, Text};
use log::debug;
use std::path::{Path, PathBuf};

/// Interactive questions asked during the development flow.
#[cfg_attr(test, mockall::automock)]
pub trait Prompter {
    /// Ask a yes/no question.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Prompt`] if the prompt cannot be shown or is
    /// cancelled.
    fn confirm(&self, message: &str, default: bool) -> Result<bool>;

    /// Ask for a filesystem path.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Prompt`] if the prompt cannot be shown or is
    /// cancelled.
    fn path(&self, message: &str, default: &str) -> Result<String>;
}

/// Terminal prompts rendered with `inquire`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InquirePrompter;

impl Prompter for InquirePrompter {
    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        Confirm::new(message)
            .with_default(default)
            .prompt()
            .map_err(|e| BootstrapError::Prompt(e.to_string()))
    }

    fn path(&self, message: &str, default: &str) -> Result<String> {
        Text::new(message)
            .with_default(default)
            .prompt()
            .map_err(|e| BootstrapError::Prompt(e.to_string()))
    }
}

/// Return true when `git` can be found on `PATH`.
#[must_use]
pub fn git_available() -> bool {
    which::which("git").is_ok()
}

/// Version-control toplevel of `cwd`, or `cwd` itself when `git` is missing
/// or `cwd` is not inside a repository.
#[must_use]
pub fn detect_buildroot(
    executor: &dyn CommandExecutor,
    cwd: &Path,
    git_available: bool,
) -> PathBuf {
    if !git_available {
        return cwd.to_path_buf();
    }
    let command = CommandLine::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .current_dir(cwd);
    match executor.run(&command) {
        Ok(output) if output.status.success() => {
            let toplevel = stdout_text(&output);
            if toplevel.is_empty() {
                cwd.to_path_buf()
            } else {
                PathBuf::from(toplevel)
            }
        }
        Ok(_) | Err(_) => {
            debug!("{} is not inside a git checkout", cwd.display());
            cwd.to_path_buf()
        }
    }
}

/// Choose the local checkout to install from.
///
/// An explicit `--localdev-dir` is used as is. Otherwise the user confirms
/// `default` or types another path.
///
/// # Errors
///
/// Returns [`BootstrapError::LocalDevDirInvalid`] if the chosen path is not
/// an existing directory, and prompt errors as they occur.
pub fn select_localdev_dir(
    explicit: Option<&Path>,
    default: &Path,
    prompter: &dyn Prompter,
) -> Result<Utf8PathBuf> {
    if let Some(dir) = explicit {
        return checked_dir(dir);
    }

    let question = format!(
        "Would you like to configure {} as a localdev project?",
        default.display()
    );
    if prompter.confirm(&question, true)? {
        return checked_dir(default);
    }

    let answer = prompter.path(
        "Provide the path to local repo of PikeSquares:",
        &default.to_string_lossy(),
    )?;
    checked_dir(Path::new(answer.trim()))
}

fn checked_dir(dir: &Path) -> Result<Utf8PathBuf> {
    if !dir.is_dir() {
        return Err(BootstrapError::LocalDevDirInvalid {
            path: dir.to_path_buf(),
        });
    }
    Utf8PathBuf::try_from(dir.to_path_buf()).map_err(|e| BootstrapError::NonUtf8Path {
        kind: "local dev",
        path: e.into_path_buf(),
    })
}
