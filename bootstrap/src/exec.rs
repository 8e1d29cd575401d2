//! Subprocess execution seam.
//!
//! Every external program the bootstrap runs (`git`, `uv`, the PEX tools, the
//! native plugin build) is described by a [`CommandLine`] and handed to a
//! [`CommandExecutor`], so flows can be tested with a scripted executor.

use crate::error::{BootstrapError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// A program invocation: arguments, working directory and extra environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl CommandLine {
    /// Start describing an invocation of `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run in `dir` instead of the inherited working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Set an environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Program to run.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments, in order.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Working directory override.
    #[must_use]
    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Extra environment variables.
    #[must_use]
    pub fn envs(&self) -> &[(String, String)] {
        &self.env
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Abstraction for running external commands.
pub trait CommandExecutor {
    /// Runs a command and returns its captured output.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use pikesquares_bootstrap::exec::{CommandExecutor, CommandLine, SystemCommandExecutor};
    ///
    /// let executor = SystemCommandExecutor;
    /// let output = executor.run(&CommandLine::new("git").arg("--version"))?;
    /// assert!(output.status.success());
    /// # Ok::<(), pikesquares_bootstrap::error::BootstrapError>(())
    /// ```
    fn run(&self, command: &CommandLine) -> Result<Output>;
}

/// Executes commands on the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, command: &CommandLine) -> Result<Output> {
        log::debug!("running {command}");
        let mut child = Command::new(&command.program);
        child.args(&command.args);
        if let Some(dir) = &command.cwd {
            child.current_dir(dir);
        }
        child.envs(command.env.iter().map(|(k, v)| (k, v)));
        child.output().map_err(|e| BootstrapError::Subprocess {
            program: command.program.clone(),
            message: e.to_string(),
        })
    }
}

/// Run `command` and treat a non-zero exit as a failure.
///
/// # Errors
///
/// Returns [`BootstrapError::Subprocess`] with the captured stderr when the
/// command cannot be spawned or exits unsuccessfully.
pub fn run_checked(executor: &dyn CommandExecutor, command: &CommandLine) -> Result<Output> {
    let output = executor.run(command)?;
    if output.status.success() {
        return Ok(output);
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let message = match stderr.trim() {
        "" => format!("`{command}` exited with {}", output.status),
        detail => format!("`{command}` exited with {}: {detail}", output.status),
    };
    Err(BootstrapError::Subprocess {
        program: command.program.clone(),
        message,
    })
}

/// Return trimmed stdout as a string.
#[must_use]
pub fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_owned()
}
