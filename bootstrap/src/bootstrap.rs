//! Configure and install flow orchestration.
//!
//! [`configure`] walks the bootstrap state machine:
//!
//! ```text
//! Start -> VersionResolved -> DirsReady
//!   -> (dev: LocalDevSelected -> [NativeBuildRunning -> NativeBuildDone | Degraded])
//!   -> RecordPersisted -> EnvWritten -> Exit
//! ```
//!
//! Every transition is logged at debug level and returned in the outcome.
//! [`install`] runs after a successful configure and provisions the venv for
//! the configured version.

use crate::config::PikeSquaresConfig;
use crate::context::{BootstrapContext, LIFT_FILE_VAR, UV_ROOT_VAR};
use crate::device_record::{DeviceConfig, DeviceRecordError, DeviceRecordStore};
use crate::dirs::BaseDirs;
use crate::env_file::EnvFile;
use crate::error::{BootstrapError, Result};
use crate::exec::CommandExecutor;
use crate::fetch::Fetcher;
use crate::install::{InstallPlan, InstallSource, Platform, locate_uv};
use crate::layout::DirectoryLayout;
use crate::localdev::{Prompter, detect_buildroot, select_localdev_dir};
use crate::native_build::{BuildReport, BuildState, DEFAULT_PYTHON, NativeBuild};
use crate::privilege;
use crate::release_tags::ReleaseTags;
use crate::resolver::{ResolveInfo, VersionSource, resolve};
use crate::version::ProductVersion;
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};
use std::fmt;
use std::path::{Path, PathBuf};

/// Python runtime the launcher provisions.
pub const PYTHON_RUNTIME: &str = "cpython312";

const BUILD_PROMPT: &str = "Would you like to build the native plugins?";

/// A stage of the configure flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapStage {
    /// Context captured.
    Start,
    /// Install version decided.
    VersionResolved,
    /// Directory layout exists on disk.
    DirsReady,
    /// Development checkout chosen.
    LocalDevSelected,
    /// Native plugin build in progress.
    NativeBuildRunning,
    /// Native plugins built and linked.
    NativeBuildDone,
    /// Native plugin build finished with failures.
    Degraded,
    /// Device record upserted.
    RecordPersisted,
    /// Hand-off lines appended.
    EnvWritten,
    /// Flow complete.
    Exit,
}

impl fmt::Display for BootstrapStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::VersionResolved => "version-resolved",
            Self::DirsReady => "dirs-ready",
            Self::LocalDevSelected => "localdev-selected",
            Self::NativeBuildRunning => "native-build-running",
            Self::NativeBuildDone => "native-build-done",
            Self::Degraded => "degraded",
            Self::RecordPersisted => "record-persisted",
            Self::EnvWritten => "env-written",
            Self::Exit => "exit",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct StageTracker {
    visited: Vec<BootstrapStage>,
}

impl StageTracker {
    fn new() -> Self {
        debug!("bootstrap stage: {}", BootstrapStage::Start);
        Self {
            visited: vec![BootstrapStage::Start],
        }
    }

    fn advance(&mut self, next: BootstrapStage) {
        if let Some(current) = self.visited.last() {
            debug!("bootstrap stage: {current} -> {next}");
        }
        self.visited.push(next);
    }
}

/// Collaborators the flows reach through trait seams.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    /// Platform directory lookup.
    pub dirs: &'a dyn BaseDirs,
    /// Remote metadata and artifact download.
    pub fetcher: &'a dyn Fetcher,
    /// Subprocess runner.
    pub executor: &'a dyn CommandExecutor,
    /// Interactive questions.
    pub prompter: &'a dyn Prompter,
    /// Whether `git` is on `PATH`.
    pub git_available: bool,
}

/// Inputs of the configure flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigureOptions {
    /// Base directory handed over by the launcher.
    pub base_dir: PathBuf,
    /// Version requested on the command line.
    pub pikesquares_version: Option<String>,
    /// Local checkout chosen up front.
    pub localdev_dir: Option<PathBuf>,
    /// Skip the native build question.
    pub skip_native_build: bool,
    /// Recorded control plane address.
    pub control_plane_address: String,
}

/// What a successful configure run did.
#[derive(Debug, Clone)]
pub struct ConfigureOutcome {
    /// Resolved version and commit.
    pub resolved: ResolveInfo,
    /// Where the version came from.
    pub source: VersionSource,
    /// Directories created for the version.
    pub layout: DirectoryLayout,
    /// Checkout selected on the development path.
    pub localdev_dir: Option<Utf8PathBuf>,
    /// Present when the native build ran.
    pub build: Option<BuildReport>,
    /// Stages visited, starting with [`BootstrapStage::Start`].
    pub transitions: Vec<BootstrapStage>,
}

/// Resolve, prepare and record a version for the launcher.
///
/// # Errors
///
/// Returns the first fatal error. Native build failures are not fatal and
/// surface as a degraded [`BuildReport`].
pub fn configure(
    ctx: &BootstrapContext,
    opts: &ConfigureOptions,
    services: &Services<'_>,
) -> Result<ConfigureOutcome> {
    let mut stages = StageTracker::new();
    debug!("configure base dir: {}", opts.base_dir.display());

    // An explicit version never consults the project config.
    let project = match opts.pikesquares_version {
        Some(_) => None,
        None => PikeSquaresConfig::discover(ctx.config_file(), ctx.cwd())?,
    };
    let tags = ReleaseTags::bundled()?;
    let (resolved, source) = resolve(
        opts.pikesquares_version.as_deref(),
        project.as_ref().and_then(PikeSquaresConfig::pikesquares_version),
        services.fetcher,
        &tags,
    )?;
    stages.advance(BootstrapStage::VersionResolved);

    let layout = DirectoryLayout::resolve(services.dirs, ctx.is_privileged())?;
    layout.ensure()?;
    stages.advance(BootstrapStage::DirsReady);

    let mut localdev_dir = None;
    let mut build = None;
    if resolved.is_development() {
        info!(
            "Configuring PikeSquares {} for local development",
            resolved.stable_version
        );
        let default = detect_buildroot(services.executor, ctx.cwd(), services.git_available);
        let checkout =
            select_localdev_dir(opts.localdev_dir.as_deref(), &default, services.prompter)?;
        stages.advance(BootstrapStage::LocalDevSelected);

        if !opts.skip_native_build && services.prompter.confirm(BUILD_PROMPT, true)? {
            stages.advance(BootstrapStage::NativeBuildRunning);
            let python = python_for(ctx);
            let report = NativeBuild {
                checkout: &checkout,
                plugins_dir: &layout.plugins_dir,
                python: &python,
            }
            .run(services.executor);
            stages.advance(match report.state() {
                BuildState::Ready => BootstrapStage::NativeBuildDone,
                BuildState::Degraded => BootstrapStage::Degraded,
            });
            build = Some(report);
        }
        localdev_dir = Some(checkout);
    }

    let plan = privilege::plan_for(ctx);
    let record = DeviceConfig {
        version: resolved.stable_version.clone(),
        run_as_uid: plan.apps.uid,
        run_as_gid: plan.apps.gid,
        server_run_as_uid: plan.server.uid,
        server_run_as_gid: plan.server.gid,
        data_dir: layout.data_dir.clone(),
        log_dir: layout.log_dir.clone(),
        run_dir: layout.run_dir.clone(),
        config_dir: layout.config_dir.clone(),
        plugins_dir: layout.plugins_dir.clone(),
        pki_dir: layout.pki_dir.clone(),
        control_plane_address: opts.control_plane_address.clone(),
        sentry_dsn: ctx.sentry_dsn().map(str::to_owned),
        localdev_dir: localdev_dir.clone(),
        virtual_env: None,
    };
    let outcome = DeviceRecordStore::in_data_dir(&layout.data_dir).upsert(record)?;
    debug!("device record {outcome:?} for {}", resolved.stable_version);
    stages.advance(BootstrapStage::RecordPersisted);

    let mut env = EnvFile::new(ctx.env_file());
    env.append("PIKESQUARES_VERSION", resolved.stable_version.as_str())?;
    env.append("PYTHON", PYTHON_RUNTIME)?;
    if let Some(dir) = &localdev_dir {
        env.append("PIKESQUARES_LOCALDEV_DIR", dir.as_str())?;
    }
    if let Some(dir) = ctx.easyrsa_dir() {
        env.append("PIKESQUARES_EASYRSA_DIR", dir.to_string_lossy())?;
    }
    if let Some(bin) = ctx.easyrsa_bin() {
        env.append("PIKESQUARES_EASYRSA_BIN", bin.to_string_lossy())?;
    }
    stages.advance(BootstrapStage::EnvWritten);
    stages.advance(BootstrapStage::Exit);

    Ok(ConfigureOutcome {
        resolved,
        source,
        layout,
        localdev_dir,
        build,
        transitions: stages.visited,
    })
}

/// Inputs of the install flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOptions {
    /// Directory holding `venvs/`.
    pub base_dir: Utf8PathBuf,
    /// Version to install; must already be configured.
    pub version: String,
    /// Local checkout to sync instead of downloading a release.
    pub localdev_dir: Option<PathBuf>,
    /// Platform used to pick artifacts.
    pub platform: Platform,
}

/// What a successful install run did.
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    /// Venv and server paths.
    pub plan: InstallPlan,
    /// How the venv was populated.
    pub source: InstallSource,
    /// Directories handed to the launcher.
    pub layout: DirectoryLayout,
    /// Device record after the venv path was stored.
    pub record: DeviceConfig,
}

/// Create the venv for a configured version and hand its paths to the
/// launcher.
///
/// # Errors
///
/// Returns the first fatal error, including subprocess failures and a missing
/// device record for the version.
pub fn install(
    ctx: &BootstrapContext,
    opts: &InstallOptions,
    services: &Services<'_>,
) -> Result<InstallOutcome> {
    let version = ProductVersion::parse(&opts.version)?;
    let layout = DirectoryLayout::resolve(services.dirs, ctx.is_privileged())?;
    layout.ensure()?;

    let store = DeviceRecordStore::in_data_dir(&layout.data_dir);
    if store.get(version.as_str())?.is_none() {
        return Err(DeviceRecordError::MissingRecord {
            version: version.to_string(),
        }
        .into());
    }

    let plan = InstallPlan::new(&opts.base_dir, version);
    let python = python_for(ctx);
    let source = match opts.localdev_dir.as_deref().filter(|dir| dir.exists()) {
        Some(dir) => {
            let checkout = utf8_dir(dir)?;
            let uv = locate_uv(
                ctx.lift_file().ok_or(BootstrapError::MissingEnvVar {
                    name: LIFT_FILE_VAR,
                })?,
                ctx.uv_root().ok_or(BootstrapError::MissingEnvVar { name: UV_ROOT_VAR })?,
                opts.platform,
            )?;
            plan.sync_checkout(services.executor, &uv, &python, &checkout)?;
            InstallSource::Checkout(checkout)
        }
        None => {
            plan.install_release(services.executor, services.fetcher, &python, opts.platform)?;
            InstallSource::Release
        }
    };
    info!("Installed PikeSquares {} into {}", plan.version, plan.venv_dir);

    let mut env = EnvFile::new(ctx.env_file());
    env.append("VIRTUAL_ENV", plan.venv_dir.as_str())?;
    env.append("PIKESQUARES_SERVER_EXE", plan.server_exe.as_str())?;
    env.append("PIKESQUARES_DATA_DIR", layout.data_dir.as_str())?;
    env.append("PIKESQUARES_LOG_DIR", layout.log_dir.as_str())?;
    env.append("PIKESQUARES_CONFIG_DIR", layout.config_dir.as_str())?;
    env.append("PIKESQUARES_VERSION", plan.version.as_str())?;

    let record = store.update_virtual_env(plan.version.as_str(), &plan.venv_dir)?;

    Ok(InstallOutcome {
        plan,
        source,
        layout,
        record,
    })
}

fn python_for(ctx: &BootstrapContext) -> String {
    ctx.python_bin().map_or_else(
        || DEFAULT_PYTHON.to_owned(),
        |p| p.to_string_lossy().into_owned(),
    )
}

fn utf8_dir(dir: &Path) -> Result<Utf8PathBuf> {
    Utf8Path::from_path(dir)
        .map(Utf8Path::to_path_buf)
        .ok_or_else(|| BootstrapError::NonUtf8Path {
            kind: "local dev",
            path: dir.to_path_buf(),
        })
}
