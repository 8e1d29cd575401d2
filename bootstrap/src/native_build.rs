//! Native plugin build pipeline for development installs.
//!
//! Builds the server's native plugins from the vendored uWSGI sources of a
//! local checkout and links them into the shared plugins directory. The
//! pipeline never fails the bootstrap: every step produces a [`StepResult`],
//! and the [`BuildReport`] is [`BuildState::Ready`] only once every step
//! succeeded and every plugin is present in the plugins directory.

use crate::exec::{CommandExecutor, CommandLine, run_checked};
use camino::{Utf8Path, Utf8PathBuf};
use log::{info, warn};
use std::fmt;

/// uWSGI build profile used for every plugin.
pub const BUILD_PROFILE: &str = "pikesquares";

/// Interpreter used when no override is configured.
pub const DEFAULT_PYTHON: &str = "python3";

/// A pluggable server component built from source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeComponent {
    /// Request router.
    Router,
    /// HTTP front end.
    Http,
    /// Python application runtime.
    Python,
    /// File logger.
    Logging,
}

impl NativeComponent {
    /// Every component, in build order.
    pub const ALL: [Self; 4] = [Self::Router, Self::Http, Self::Python, Self::Logging];

    /// Plugin name passed to the build and used for the artifact.
    #[must_use]
    pub fn plugin_name(self) -> &'static str {
        match self {
            Self::Router => "corerouter",
            Self::Http => "http",
            Self::Python => "python",
            Self::Logging => "logfile",
        }
    }

    /// Source directory relative to the uWSGI tree.
    #[must_use]
    pub fn source_dir(self) -> String {
        format!("plugins/{}", self.plugin_name())
    }

    /// File name of the built shared object.
    #[must_use]
    pub fn artifact(self) -> String {
        format!("{}_plugin.so", self.plugin_name())
    }
}

/// One step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStep {
    /// Fetch the vendored submodules.
    Submodules,
    /// Compile a plugin.
    Compile(NativeComponent),
    /// Link a built plugin into the plugins directory.
    Link(NativeComponent),
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submodules => f.write_str("update submodules"),
            Self::Compile(c) => write!(f, "compile {} plugin", c.plugin_name()),
            Self::Link(c) => write!(f, "link {} plugin", c.plugin_name()),
        }
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    /// The step that ran.
    pub step: BuildStep,
    /// `Err` carries the failure description.
    pub outcome: Result<(), String>,
}

impl StepResult {
    /// Return true if the step succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Overall state of the native build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    /// Every step succeeded and every plugin is in place.
    Ready,
    /// At least one step failed or a plugin is missing.
    Degraded,
}

/// Aggregated result of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    steps: Vec<StepResult>,
    missing_artifacts: Vec<Utf8PathBuf>,
}

impl BuildReport {
    /// Ready only when nothing failed and nothing is missing.
    #[must_use]
    pub fn state(&self) -> BuildState {
        if self.steps.iter().all(StepResult::succeeded) && self.missing_artifacts.is_empty() {
            BuildState::Ready
        } else {
            BuildState::Degraded
        }
    }

    /// Every step, in execution order.
    #[must_use]
    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    /// Steps that failed.
    pub fn failures(&self) -> impl Iterator<Item = &StepResult> {
        self.steps.iter().filter(|s| !s.succeeded())
    }

    /// Plugins absent from the plugins directory after the build.
    #[must_use]
    pub fn missing_artifacts(&self) -> &[Utf8PathBuf] {
        &self.missing_artifacts
    }
}

/// Inputs to the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct NativeBuild<'a> {
    /// Root of the local checkout.
    pub checkout: &'a Utf8Path,
    /// Destination for plugin links.
    pub plugins_dir: &'a Utf8Path,
    /// Interpreter that runs the uWSGI build script.
    pub python: &'a str,
}

impl NativeBuild<'_> {
    fn uwsgi_dir(&self) -> Utf8PathBuf {
        self.checkout.join("vendor").join("uwsgi")
    }

    /// Run every step and verify the result.
    pub fn run(&self, executor: &dyn CommandExecutor) -> BuildReport {
        let mut steps = Vec::new();

        let submodules = CommandLine::new("git")
            .args(["submodule", "update", "--init", "--recursive"])
            .current_dir(self.checkout);
        steps.push(record(BuildStep::Submodules, run_checked(executor, &submodules).map(drop)));

        for component in NativeComponent::ALL {
            let compiled = record(
                BuildStep::Compile(component),
                run_checked(executor, &self.compile_command(component)).map(drop),
            );
            let compiled_ok = compiled.succeeded();
            steps.push(compiled);
            if compiled_ok {
                steps.push(record(BuildStep::Link(component), self.link(component)));
            }
        }

        let missing_artifacts = NativeComponent::ALL
            .iter()
            .map(|c| self.plugins_dir.join(c.artifact()))
            .filter(|path| !path.exists())
            .collect::<Vec<_>>();
        for path in &missing_artifacts {
            warn!("native plugin missing after build: {path}");
        }

        let report = BuildReport {
            steps,
            missing_artifacts,
        };
        match report.state() {
            BuildState::Ready => info!("native plugins ready in {}", self.plugins_dir),
            BuildState::Degraded => warn!(
                "native plugin build degraded: {} failed step(s), {} missing plugin(s)",
                report.failures().count(),
                report.missing_artifacts().len()
            ),
        }
        report
    }

    /// Command compiling one plugin.
    #[must_use]
    pub fn compile_command(&self, component: NativeComponent) -> CommandLine {
        CommandLine::new(self.python)
            .arg("uwsgiconfig.py")
            .arg("--plugin")
            .arg(component.source_dir())
            .arg(BUILD_PROFILE)
            .arg(component.plugin_name())
            .current_dir(self.uwsgi_dir())
    }

    fn link(&self, component: NativeComponent) -> crate::error::Result<()> {
        let source = self.uwsgi_dir().join(component.artifact());
        let dest = self.plugins_dir.join(component.artifact());
        if dest.as_std_path().is_symlink() || dest.exists() {
            std::fs::remove_file(&dest)?;
        }
        symlink(&source, &dest)?;
        Ok(())
    }
}

fn record<E: fmt::Display>(step: BuildStep, result: Result<(), E>) -> StepResult {
    let outcome = result.map_err(|e| {
        warn!("native build step \"{step}\" failed: {e}");
        e.to_string()
    });
    StepResult { step, outcome }
}

#[cfg(unix)]
fn symlink(source: &Utf8Path, dest: &Utf8Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, dest)
}

#[cfg(windows)]
fn symlink(source: &Utf8Path, dest: &Utf8Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(source, dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ExpectedCall, StubExecutor, failure_output, success_output};
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct Checkout {
        _temp: TempDir,
        root: Utf8PathBuf,
        plugins: Utf8PathBuf,
    }

    #[fixture]
    fn checkout() -> Checkout {
        let temp = tempfile::tempdir().expect("create temp dir");
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("utf-8 temp dir");
        let plugins = root.join("plugins-out");
        std::fs::create_dir_all(root.join("src/vendor/uwsgi")).expect("create uwsgi dir");
        std::fs::create_dir_all(&plugins).expect("create plugins dir");
        Checkout {
            _temp: temp,
            root: root.join("src"),
            plugins,
        }
    }

    fn build(checkout: &Checkout) -> NativeBuild<'_> {
        NativeBuild {
            checkout: &checkout.root,
            plugins_dir: &checkout.plugins,
            python: "/opt/python/bin/python3.12",
        }
    }

    fn produce_artifacts(checkout: &Checkout, components: &[NativeComponent]) {
        for c in components {
            std::fs::write(checkout.root.join("vendor/uwsgi").join(c.artifact()), b"ELF")
                .expect("write artifact");
        }
    }

    fn expected_calls(
        build: &NativeBuild<'_>,
        failing: Option<NativeComponent>,
    ) -> Vec<ExpectedCall> {
        let mut calls = vec![ExpectedCall {
            command: CommandLine::new("git")
                .args(["submodule", "update", "--init", "--recursive"])
                .current_dir(build.checkout),
            result: Ok(success_output()),
        }];
        for c in NativeComponent::ALL {
            let result = if Some(c) == failing {
                Ok(failure_output("error: Python.h: No such file or directory"))
            } else {
                Ok(success_output())
            };
            calls.push(ExpectedCall {
                command: build.compile_command(c),
                result,
            });
        }
        calls
    }

    #[rstest]
    fn compile_command_targets_plugin_dir(checkout: Checkout) {
        let cmd = build(&checkout).compile_command(NativeComponent::Http);
        assert_eq!(
            cmd.to_string(),
            "/opt/python/bin/python3.12 uwsgiconfig.py --plugin plugins/http pikesquares http"
        );
        assert_eq!(
            cmd.cwd(),
            Some(checkout.root.join("vendor/uwsgi").as_std_path())
        );
    }

    #[rstest]
    fn successful_build_is_ready(checkout: Checkout) {
        produce_artifacts(&checkout, &NativeComponent::ALL);
        let build = build(&checkout);
        let executor = StubExecutor::new(expected_calls(&build, None));

        let report = build.run(&executor);

        executor.assert_finished();
        assert_eq!(report.state(), BuildState::Ready);
        assert_eq!(report.steps().len(), 9);
        for c in NativeComponent::ALL {
            assert!(checkout.plugins.join(c.artifact()).exists());
        }
    }

    #[rstest]
    fn rebuilding_replaces_links(checkout: Checkout) {
        produce_artifacts(&checkout, &NativeComponent::ALL);
        let build = build(&checkout);
        let first = StubExecutor::new(expected_calls(&build, None));
        assert_eq!(build.run(&first).state(), BuildState::Ready);
        let second = StubExecutor::new(expected_calls(&build, None));
        assert_eq!(build.run(&second).state(), BuildState::Ready);
    }

    #[rstest]
    fn failed_step_degrades_without_stopping(checkout: Checkout) {
        produce_artifacts(
            &checkout,
            &[
                NativeComponent::Router,
                NativeComponent::Http,
                NativeComponent::Logging,
            ],
        );
        let build = build(&checkout);
        let executor = StubExecutor::new(expected_calls(&build, Some(NativeComponent::Python)));

        let report = build.run(&executor);

        executor.assert_finished();
        assert_eq!(report.state(), BuildState::Degraded);
        let failures: Vec<_> = report.failures().map(|s| s.step).collect();
        assert_eq!(failures, vec![BuildStep::Compile(NativeComponent::Python)]);
        assert_eq!(
            report.missing_artifacts(),
            &[checkout.plugins.join("python_plugin.so")]
        );
        assert!(checkout.plugins.join("logfile_plugin.so").exists());
    }

    #[rstest]
    fn missing_artifact_degrades_even_when_steps_pass(checkout: Checkout) {
        produce_artifacts(
            &checkout,
            &[
                NativeComponent::Router,
                NativeComponent::Http,
                NativeComponent::Python,
            ],
        );
        let build = build(&checkout);
        let executor = StubExecutor::new(expected_calls(&build, None));

        let report = build.run(&executor);

        assert_eq!(report.failures().count(), 0);
        assert_eq!(report.state(), BuildState::Degraded);
        assert_eq!(
            report.missing_artifacts(),
            &[checkout.plugins.join("logfile_plugin.so")]
        );
    }
}
