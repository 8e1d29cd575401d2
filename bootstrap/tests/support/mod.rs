//! Test support utilities for bootstrap behavioural tests.
//!
//! Hand-written collaborators for the trait seams, since the generated mocks
//! are only available to unit tests.

#![allow(dead_code)]

use camino::{Utf8Path, Utf8PathBuf};
use pikesquares_bootstrap::context::{BootstrapContext, ENV_FILE_VAR, Identity, ProcessFacts};
use pikesquares_bootstrap::device_record::{DEFAULT_CONTROL_PLANE_ADDRESS, DeviceConfig};
use pikesquares_bootstrap::dirs::BaseDirs;
use pikesquares_bootstrap::error::{BootstrapError, Result};
use pikesquares_bootstrap::fetch::{FetchError, Fetcher};
use pikesquares_bootstrap::localdev::Prompter;
use std::cell::Cell;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Platform directories rooted in a temporary directory.
pub struct FixedDirs {
    root: PathBuf,
}

impl FixedDirs {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

impl BaseDirs for FixedDirs {
    fn data_dir(&self) -> Option<PathBuf> {
        Some(self.root.join("data"))
    }

    fn config_dir(&self) -> Option<PathBuf> {
        Some(self.root.join("config"))
    }

    fn cache_dir(&self) -> Option<PathBuf> {
        Some(self.root.join("cache"))
    }

    fn runtime_dir(&self) -> Option<PathBuf> {
        None
    }
}

/// Fetcher that answers every JSON request with one document and counts
/// the requests.
#[derive(Default)]
pub struct StaticFetcher {
    body: Option<serde_json::Value>,
    requests: Cell<usize>,
}

impl StaticFetcher {
    pub fn answering(body: serde_json::Value) -> Self {
        Self {
            body: Some(body),
            requests: Cell::new(0),
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.get()
    }
}

impl Fetcher for StaticFetcher {
    fn fetch_json(&self, url: &str) -> std::result::Result<serde_json::Value, FetchError> {
        self.requests.set(self.requests.get() + 1);
        self.body.clone().ok_or_else(|| FetchError::Http {
            url: url.to_owned(),
            reason: "network unreachable".to_owned(),
        })
    }

    fn fetch_to_file(&self, url: &str, _dest: &Path) -> std::result::Result<(), FetchError> {
        Err(FetchError::NotFound {
            url: url.to_owned(),
        })
    }
}

/// Prompter that accepts every default.
pub struct AcceptDefaults;

impl Prompter for AcceptDefaults {
    fn confirm(&self, _message: &str, default: bool) -> Result<bool> {
        Ok(default)
    }

    fn path(&self, _message: &str, default: &str) -> Result<String> {
        Ok(default.to_owned())
    }
}

/// Prompter that fails if it is ever consulted.
pub struct NoPrompts;

impl Prompter for NoPrompts {
    fn confirm(&self, message: &str, _default: bool) -> Result<bool> {
        Err(BootstrapError::Prompt(format!("unexpected prompt: {message}")))
    }

    fn path(&self, message: &str, _default: &str) -> Result<String> {
        Err(BootstrapError::Prompt(format!("unexpected prompt: {message}")))
    }
}

/// Build a context for an unprivileged user from `vars`.
pub fn context(vars: HashMap<&'static str, OsString>, cwd: &Path) -> Result<BootstrapContext> {
    let facts = ProcessFacts {
        identity: Identity { uid: 1000, gid: 1000 },
        privileged: false,
        cwd: cwd.to_path_buf(),
    };
    BootstrapContext::from_lookup(move |name| vars.get(name).cloned(), facts)
}

/// Variables naming `env_file` as the hand-off path.
pub fn hand_off_vars(env_file: &Path) -> HashMap<&'static str, OsString> {
    HashMap::from([(ENV_FILE_VAR, env_file.as_os_str().to_owned())])
}

/// UTF-8 view of a temporary path.
pub fn utf8(path: &Path) -> Utf8PathBuf {
    Utf8PathBuf::try_from(path.to_path_buf()).expect("temp paths are UTF-8")
}

/// A device config for `version` with directories under `data_dir`.
pub fn device_config(version: &str, data_dir: &Utf8Path, address: &str) -> DeviceConfig {
    DeviceConfig {
        version: version.parse().expect("test version"),
        run_as_uid: 1000,
        run_as_gid: 1000,
        server_run_as_uid: 1000,
        server_run_as_gid: 1000,
        data_dir: data_dir.to_owned(),
        log_dir: data_dir.join("log"),
        run_dir: data_dir.join("run"),
        config_dir: data_dir.join("config"),
        plugins_dir: data_dir.join("plugins"),
        pki_dir: data_dir.join("pki"),
        control_plane_address: if address.is_empty() {
            DEFAULT_CONTROL_PLANE_ADDRESS.to_owned()
        } else {
            address.to_owned()
        },
        sentry_dsn: None,
        localdev_dir: None,
        virtual_env: None,
    }
}
