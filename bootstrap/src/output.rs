//! User-facing messages written to stderr by the binary.

use crate::bootstrap::{ConfigureOutcome, InstallOutcome};
use crate::install::InstallSource;
use crate::native_build::{BuildReport, BuildState};
use std::fmt::Display;
use std::io::Write;

/// Write one line, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort output; ignore write failures.
    }
}

/// Summary printed after a successful configure run.
#[must_use]
pub fn configure_summary(outcome: &ConfigureOutcome) -> String {
    let version = &outcome.resolved.stable_version;
    let mut message = format!(
        "Configured PikeSquares {version} ({}), data in {}",
        outcome.source, outcome.layout.data_dir
    );
    if let Some(sha) = &outcome.resolved.sha_version {
        message.push_str(&format!("\n  commit: {sha}"));
    }
    if let Some(dir) = &outcome.localdev_dir {
        message.push_str(&format!("\n  local checkout: {dir}"));
    }
    if let Some(report) = &outcome.build {
        message.push('\n');
        message.push_str(&build_summary(report));
    }
    message
}

/// One-paragraph description of a native build.
#[must_use]
pub fn build_summary(report: &BuildReport) -> String {
    match report.state() {
        BuildState::Ready => "  native plugins: ready".to_owned(),
        BuildState::Degraded => {
            let mut message = String::from(
                "  native plugins: degraded (the server may lack some features)",
            );
            for step in report.failures() {
                message.push_str(&format!("\n    failed: {}", step.step));
            }
            for path in report.missing_artifacts() {
                message.push_str(&format!("\n    missing: {path}"));
            }
            message
        }
    }
}

/// Summary printed after a successful install run.
#[must_use]
pub fn install_summary(outcome: &InstallOutcome) -> String {
    let from = match &outcome.source {
        InstallSource::Checkout(dir) => format!("local checkout {dir}"),
        InstallSource::Release => "release artifact".to_owned(),
    };
    format!(
        "Installed PikeSquares {} from {from} into {}",
        outcome.plan.version, outcome.plan.venv_dir
    )
}
