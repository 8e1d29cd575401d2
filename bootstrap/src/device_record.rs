//! Locked, schema-versioned device record store.
//!
//! The device record is the durable hand-off between the bootstrap and the
//! long-running server. It lives at `<data_dir>/device-db.json` and holds one
//! [`DeviceConfig`] per installed version:
//!
//! ```json
//! { "schema_version": 1, "configs": [ { "version": "2.3.1", ... } ] }
//! ```
//!
//! Every read-modify-write cycle holds an exclusive lock on the sibling
//! `device-db.json.lock` file, and the new document replaces the old one
//! through an atomic rename, so concurrent bootstraps cannot lose updates.
//!
//! Earlier bootstraps wrote the same file as a document-id keyed table,
//! `{ "configs": { "1": { "version": "2.3.1", ... } } }`, with no schema
//! version. Such a file reads as a schema 1 document and is rewritten in the
//! new layout by the next modification.

use crate::version::ProductVersion;
use camino::{Utf8Path, Utf8PathBuf};
use fs2::FileExt;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// File name of the device record inside the data directory.
pub const DEVICE_RECORD_FILENAME: &str = "device-db.json";

/// Address the server's control plane listens on unless overridden.
pub const DEFAULT_CONTROL_PLANE_ADDRESS: &str = "127.0.0.1:5250";

const CURRENT_MAX: u32 = 1;

/// Errors raised by the device record store.
#[derive(Debug, thiserror::Error)]
pub enum DeviceRecordError {
    /// Acquiring the store lock failed.
    #[error("failed to lock {}: {source}", .path.display())]
    Lock {
        /// Lock file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading the record file failed.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        /// Record file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The record file is not a valid document.
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        /// Record file path.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The record file was written by a newer release.
    #[error("unsupported device record schema version {value} (max {max})")]
    UnsupportedSchemaVersion {
        /// Version found in the file.
        value: u32,
        /// Highest version this build reads.
        max: u32,
    },

    /// Serializing the document failed.
    #[error("failed to serialize device record: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Writing the record file failed.
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        /// Record file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// No record exists for the requested version.
    #[error("no device record for version {version}")]
    MissingRecord {
        /// The requested version key.
        version: String,
    },
}

/// Validated device record schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct SchemaVersion(u32);

impl SchemaVersion {
    /// Return the schema version this build writes.
    #[must_use]
    pub fn current() -> Self {
        Self(CURRENT_MAX)
    }

    /// Return the inner version number.
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for SchemaVersion {
    type Error = DeviceRecordError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if value == 0 || value > CURRENT_MAX {
            return Err(DeviceRecordError::UnsupportedSchemaVersion {
                value,
                max: CURRENT_MAX,
            });
        }
        Ok(Self(value))
    }
}

impl From<SchemaVersion> for u32 {
    fn from(v: SchemaVersion) -> Self {
        v.0
    }
}

/// Runtime configuration recorded for one installed version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Version key. Matching is by exact string.
    pub version: ProductVersion,
    /// Uid the managed applications run as.
    #[serde(rename = "RUN_AS_UID")]
    pub run_as_uid: u32,
    /// Gid the managed applications run as.
    #[serde(rename = "RUN_AS_GID")]
    pub run_as_gid: u32,
    /// Uid the server runs as.
    #[serde(rename = "SERVER_RUN_AS_UID")]
    pub server_run_as_uid: u32,
    /// Gid the server runs as.
    #[serde(rename = "SERVER_RUN_AS_GID")]
    pub server_run_as_gid: u32,
    /// Data directory.
    #[serde(rename = "DATA_DIR")]
    pub data_dir: Utf8PathBuf,
    /// Log directory.
    #[serde(rename = "LOG_DIR")]
    pub log_dir: Utf8PathBuf,
    /// Runtime directory for sockets and pid files.
    #[serde(rename = "RUN_DIR")]
    pub run_dir: Utf8PathBuf,
    /// Configuration directory.
    #[serde(rename = "CONFIG_DIR")]
    pub config_dir: Utf8PathBuf,
    /// Shared native plugin directory.
    #[serde(rename = "PLUGINS_DIR")]
    pub plugins_dir: Utf8PathBuf,
    /// PKI directory handed to the certificate collaborator.
    #[serde(rename = "PKI_DIR")]
    pub pki_dir: Utf8PathBuf,
    /// `host:port` of the server's control plane.
    #[serde(rename = "EMPEROR_ZMQ_ADDRESS")]
    pub control_plane_address: String,
    /// Telemetry DSN, if one was configured.
    #[serde(rename = "SENTRY_DSN", default, skip_serializing_if = "Option::is_none")]
    pub sentry_dsn: Option<String>,
    /// Local source checkout for development installs.
    #[serde(rename = "LOCALDEV_DIR", default, skip_serializing_if = "Option::is_none")]
    pub localdev_dir: Option<Utf8PathBuf>,
    /// Virtual environment created by the install stage.
    #[serde(rename = "VIRTUAL_ENV", default, skip_serializing_if = "Option::is_none")]
    pub virtual_env: Option<Utf8PathBuf>,
}

/// On-disk device record document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecordFile {
    schema_version: SchemaVersion,
    configs: Vec<DeviceConfig>,
}

impl Default for DeviceRecordFile {
    fn default() -> Self {
        Self {
            schema_version: SchemaVersion::current(),
            configs: Vec::new(),
        }
    }
}

impl DeviceRecordFile {
    /// All records, in insertion order.
    #[must_use]
    pub fn configs(&self) -> &[DeviceConfig] {
        &self.configs
    }

    /// Replace the record with the same version string, or append one.
    pub fn upsert(&mut self, config: DeviceConfig) -> UpsertOutcome {
        match self
            .configs
            .iter_mut()
            .find(|existing| existing.version.as_str() == config.version.as_str())
        {
            Some(existing) => {
                *existing = config;
                UpsertOutcome::Replaced
            }
            None => {
                self.configs.push(config);
                UpsertOutcome::Inserted
            }
        }
    }

    /// Exact lookup by version string.
    #[must_use]
    pub fn get(&self, version: &str) -> Option<&DeviceConfig> {
        self.configs.iter().find(|c| c.version.as_str() == version)
    }

    /// The record whose version compares greatest.
    #[must_use]
    pub fn latest(&self) -> Option<&DeviceConfig> {
        self.configs.iter().max_by(|a, b| a.version.cmp(&b.version))
    }
}

/// Whether an upsert added a record or replaced one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No record existed for the version.
    Inserted,
    /// An existing record was overwritten.
    Replaced,
}

#[derive(Deserialize)]
struct SchemaHeader {
    #[serde(default)]
    schema_version: Option<u32>,
}

/// Table written by earlier bootstraps, keyed by numeric document id.
#[derive(Deserialize)]
struct LegacyDocument {
    #[serde(default)]
    configs: BTreeMap<String, serde_json::Value>,
}

/// A record as earlier bootstraps wrote it. The server identity was not
/// recorded separately; it matched the application identity.
#[derive(Deserialize)]
struct LegacyConfig {
    version: String,
    #[serde(rename = "RUN_AS_UID")]
    run_as_uid: u32,
    #[serde(rename = "RUN_AS_GID")]
    run_as_gid: u32,
    #[serde(rename = "SERVER_RUN_AS_UID", default)]
    server_run_as_uid: Option<u32>,
    #[serde(rename = "SERVER_RUN_AS_GID", default)]
    server_run_as_gid: Option<u32>,
    #[serde(rename = "DATA_DIR")]
    data_dir: Utf8PathBuf,
    #[serde(rename = "LOG_DIR")]
    log_dir: Utf8PathBuf,
    #[serde(rename = "RUN_DIR")]
    run_dir: Utf8PathBuf,
    #[serde(rename = "CONFIG_DIR")]
    config_dir: Utf8PathBuf,
    #[serde(rename = "PLUGINS_DIR")]
    plugins_dir: Utf8PathBuf,
    #[serde(rename = "PKI_DIR")]
    pki_dir: Utf8PathBuf,
    #[serde(rename = "EMPEROR_ZMQ_ADDRESS", default)]
    control_plane_address: Option<String>,
    #[serde(rename = "SENTRY_DSN", default)]
    sentry_dsn: Option<String>,
}

impl LegacyDocument {
    /// Convert to the current layout, keeping document-id order. Records
    /// that cannot be converted are dropped with a warning.
    fn migrate(self, path: &Path) -> DeviceRecordFile {
        let mut entries: Vec<_> = self.configs.into_iter().collect();
        entries.sort_by_key(|(id, _)| (id.parse::<u64>().unwrap_or(u64::MAX), id.clone()));

        let mut doc = DeviceRecordFile::default();
        for (id, value) in entries {
            match serde_json::from_value::<LegacyConfig>(value)
                .map_err(|e| e.to_string())
                .and_then(LegacyConfig::into_current)
            {
                Ok(config) => {
                    doc.upsert(config);
                }
                Err(reason) => warn!(
                    "dropping legacy device record {id} from {}: {reason}",
                    path.display()
                ),
            }
        }
        info!(
            "migrated {} legacy device record(s) from {}",
            doc.configs.len(),
            path.display()
        );
        doc
    }
}

impl LegacyConfig {
    fn into_current(self) -> Result<DeviceConfig, String> {
        let version = ProductVersion::parse(&self.version).map_err(|e| e.to_string())?;
        Ok(DeviceConfig {
            version,
            run_as_uid: self.run_as_uid,
            run_as_gid: self.run_as_gid,
            server_run_as_uid: self.server_run_as_uid.unwrap_or(self.run_as_uid),
            server_run_as_gid: self.server_run_as_gid.unwrap_or(self.run_as_gid),
            data_dir: self.data_dir,
            log_dir: self.log_dir,
            run_dir: self.run_dir,
            config_dir: self.config_dir,
            plugins_dir: self.plugins_dir,
            pki_dir: self.pki_dir,
            control_plane_address: self
                .control_plane_address
                .unwrap_or_else(|| DEFAULT_CONTROL_PLANE_ADDRESS.to_owned()),
            sentry_dsn: self.sentry_dsn.filter(|dsn| !dsn.is_empty()),
            localdev_dir: None,
            virtual_env: None,
        })
    }
}

/// Handle to a device record file on disk.
#[derive(Debug, Clone)]
pub struct DeviceRecordStore {
    path: PathBuf,
}

impl DeviceRecordStore {
    /// Store located at `<data_dir>/device-db.json`.
    #[must_use]
    pub fn in_data_dir(data_dir: &Utf8Path) -> Self {
        Self::at_path(data_dir.join(DEVICE_RECORD_FILENAME))
    }

    /// Store located at an explicit path.
    #[must_use]
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the record file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole document under a shared lock. A missing file reads as
    /// an empty document.
    ///
    /// # Errors
    ///
    /// Returns an error if locking, reading or parsing fails.
    pub fn load(&self) -> Result<DeviceRecordFile, DeviceRecordError> {
        let lock = self.open_lock()?;
        FileExt::lock_shared(&lock).map_err(|source| self.lock_error(source))?;
        self.read_unlocked()
    }

    /// Insert or replace the record for `config.version`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    pub fn upsert(&self, config: DeviceConfig) -> Result<UpsertOutcome, DeviceRecordError> {
        let version = config.version.to_string();
        let outcome = self.modify(|doc| Ok(doc.upsert(config)))?;
        log::debug!("device record for {version}: {outcome:?}");
        Ok(outcome)
    }

    /// The record whose version compares greatest.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn latest(&self) -> Result<Option<DeviceConfig>, DeviceRecordError> {
        Ok(self.load()?.latest().cloned())
    }

    /// Exact lookup by version string.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn get(&self, version: &str) -> Result<Option<DeviceConfig>, DeviceRecordError> {
        Ok(self.load()?.get(version).cloned())
    }

    /// Record the virtual environment path on an existing record.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceRecordError::MissingRecord`] when no record exists for
    /// `version`, or an I/O error from the store.
    pub fn update_virtual_env(
        &self,
        version: &str,
        virtual_env: &Utf8Path,
    ) -> Result<DeviceConfig, DeviceRecordError> {
        self.modify(|doc| {
            let record = doc
                .configs
                .iter_mut()
                .find(|c| c.version.as_str() == version)
                .ok_or_else(|| DeviceRecordError::MissingRecord {
                    version: version.to_owned(),
                })?;
            record.virtual_env = Some(virtual_env.to_owned());
            Ok(record.clone())
        })
    }

    fn modify<T>(
        &self,
        change: impl FnOnce(&mut DeviceRecordFile) -> Result<T, DeviceRecordError>,
    ) -> Result<T, DeviceRecordError> {
        let lock = self.open_lock()?;
        lock.lock_exclusive()
            .map_err(|source| self.lock_error(source))?;

        let mut doc = self.read_unlocked()?;
        let value = change(&mut doc)?;
        self.write_unlocked(&doc)?;
        Ok(value)
    }

    fn read_unlocked(&self) -> Result<DeviceRecordFile, DeviceRecordError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(DeviceRecordFile::default()),
            Err(source) => {
                return Err(DeviceRecordError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let parse_err = |source| DeviceRecordError::Parse {
            path: self.path.clone(),
            source,
        };

        let header: SchemaHeader = serde_json::from_str(&text).map_err(parse_err)?;
        match header.schema_version {
            Some(value) => {
                SchemaVersion::try_from(value)?;
                serde_json::from_str(&text).map_err(parse_err)
            }
            None => {
                let legacy: LegacyDocument = serde_json::from_str(&text).map_err(parse_err)?;
                Ok(legacy.migrate(&self.path))
            }
        }
    }

    fn write_unlocked(&self, doc: &DeviceRecordFile) -> Result<(), DeviceRecordError> {
        let write_err = |source| DeviceRecordError::Write {
            path: self.path.clone(),
            source,
        };
        let parent = self.parent_dir();
        std::fs::create_dir_all(parent).map_err(write_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
        let body = serde_json::to_vec_pretty(doc).map_err(DeviceRecordError::Serialize)?;
        tmp.write_all(&body).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }

    fn open_lock(&self) -> Result<File, DeviceRecordError> {
        let mut lock_path = self.path.clone().into_os_string();
        lock_path.push(".lock");
        let lock_path = PathBuf::from(lock_path);
        std::fs::create_dir_all(self.parent_dir()).map_err(|source| self.lock_error(source))?;
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|source| DeviceRecordError::Lock {
                path: lock_path,
                source,
            })
    }

    fn parent_dir(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    fn lock_error(&self, source: std::io::Error) -> DeviceRecordError {
        DeviceRecordError::Lock {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    fn config(version: &str, uid: u32) -> DeviceConfig {
        let data = Utf8PathBuf::from("/home/dev/.local/share/pikesquares");
        DeviceConfig {
            version: version.parse().expect("valid version"),
            run_as_uid: uid,
            run_as_gid: uid,
            server_run_as_uid: uid,
            server_run_as_gid: uid,
            data_dir: data.clone(),
            log_dir: data.join("log"),
            run_dir: data.join("run"),
            config_dir: data.join("config"),
            plugins_dir: data.join("plugins"),
            pki_dir: data.join("pki"),
            control_plane_address: DEFAULT_CONTROL_PLANE_ADDRESS.to_owned(),
            sentry_dsn: None,
            localdev_dir: None,
            virtual_env: None,
        }
    }

    #[fixture]
    fn temp() -> TempDir {
        tempfile::tempdir().expect("create temp dir")
    }

    fn store(temp: &TempDir) -> DeviceRecordStore {
        DeviceRecordStore::at_path(temp.path().join(DEVICE_RECORD_FILENAME))
    }

    #[rstest]
    fn missing_file_reads_as_empty(temp: TempDir) {
        let doc = store(&temp).load().expect("load");
        assert!(doc.configs().is_empty());
        assert_eq!(doc.schema_version, SchemaVersion::current());
    }

    #[rstest]
    fn upsert_same_version_keeps_one_record(temp: TempDir) {
        let store = store(&temp);
        assert_eq!(store.upsert(config("2.3.1", 1000)).expect("upsert"), UpsertOutcome::Inserted);
        assert_eq!(store.upsert(config("2.3.1", 1001)).expect("upsert"), UpsertOutcome::Replaced);

        let doc = store.load().expect("load");
        assert_eq!(doc.configs().len(), 1);
        assert_eq!(doc.get("2.3.1").map(|c| c.run_as_uid), Some(1001));
    }

    #[rstest]
    fn version_keys_match_exactly(temp: TempDir) {
        let store = store(&temp);
        store.upsert(config("1.0", 1)).expect("upsert");
        store.upsert(config("1.0.0", 2)).expect("upsert");
        assert_eq!(store.load().expect("load").configs().len(), 2);
    }

    #[rstest]
    fn latest_selects_greatest_version(temp: TempDir) {
        let store = store(&temp);
        for version in ["0.9.2", "1.10.0", "1.9.0", "1.10.0.dev4"] {
            store.upsert(config(version, 1000)).expect("upsert");
        }
        let latest = store.latest().expect("latest").expect("some record");
        assert_eq!(latest.version.as_str(), "1.10.0");
    }

    #[rstest]
    fn latest_of_empty_store_is_none(temp: TempDir) {
        assert!(store(&temp).latest().expect("latest").is_none());
    }

    #[rstest]
    fn update_virtual_env_sets_field(temp: TempDir) {
        let store = store(&temp);
        store.upsert(config("2.3.1", 1000)).expect("upsert");
        let venv = Utf8PathBuf::from("/opt/pikesquares/venvs/2.3.1");
        let updated = store.update_virtual_env("2.3.1", &venv).expect("update");

        assert_eq!(updated.virtual_env.as_ref(), Some(&venv));
        let stored = store.get("2.3.1").expect("get").expect("record");
        assert_eq!(stored.virtual_env, Some(venv));
    }

    #[rstest]
    fn update_virtual_env_requires_record(temp: TempDir) {
        let err = store(&temp)
            .update_virtual_env("2.3.1", Utf8Path::new("/tmp/venv"))
            .expect_err("missing record");
        assert!(matches!(err, DeviceRecordError::MissingRecord { .. }));
    }

    #[rstest]
    fn writes_uppercase_keys(temp: TempDir) {
        let store = store(&temp);
        let mut cfg = config("2.3.1", 1000);
        cfg.sentry_dsn = Some("https://key@sentry.example/1".to_owned());
        store.upsert(cfg).expect("upsert");

        let text = std::fs::read_to_string(store.path()).expect("read");
        let json: serde_json::Value = serde_json::from_str(&text).expect("json");
        let record = &json["configs"][0];
        assert_eq!(json["schema_version"], 1);
        assert_eq!(record["version"], "2.3.1");
        assert_eq!(record["EMPEROR_ZMQ_ADDRESS"], DEFAULT_CONTROL_PLANE_ADDRESS);
        assert_eq!(record["SENTRY_DSN"], "https://key@sentry.example/1");
        assert!(record.get("VIRTUAL_ENV").is_none());
    }

    #[rstest]
    fn rejects_newer_schema(temp: TempDir) {
        let store = store(&temp);
        std::fs::write(store.path(), r#"{"schema_version": 2, "configs": []}"#).expect("seed");
        let err = store.load().expect_err("newer schema");
        assert!(matches!(
            err,
            DeviceRecordError::UnsupportedSchemaVersion { value: 2, max: 1 }
        ));
    }

    const LEGACY_TABLE: &str = r#"{
        "_default": {},
        "configs": {
            "2": {
                "RUN_AS_UID": 1000, "RUN_AS_GID": 1000,
                "DATA_DIR": "/home/dev/.local/share/pikesquares",
                "RUN_DIR": "/run/user/1000/pikesquares",
                "LOG_DIR": "/home/dev/.local/state/pikesquares/log",
                "CONFIG_DIR": "/home/dev/.config/pikesquares",
                "PLUGINS_DIR": "/home/dev/.local/share/pikesquares/plugins",
                "EMPEROR_ZMQ_ADDRESS": "127.0.0.1:5250",
                "PKI_DIR": "/home/dev/.local/share/pikesquares/pki",
                "SENTRY_DSN": null,
                "version": "0.4.0.dev2"
            },
            "1": {
                "RUN_AS_UID": 1000, "RUN_AS_GID": 1000,
                "DATA_DIR": "/home/dev/.local/share/pikesquares",
                "RUN_DIR": "/run/user/1000/pikesquares",
                "LOG_DIR": "/home/dev/.local/state/pikesquares/log",
                "CONFIG_DIR": "/home/dev/.config/pikesquares",
                "PLUGINS_DIR": "/home/dev/.local/share/pikesquares/plugins",
                "EMPEROR_ZMQ_ADDRESS": "127.0.0.1:5250",
                "PKI_DIR": "/home/dev/.local/share/pikesquares/pki",
                "SENTRY_DSN": "https://key@sentry.example/1",
                "version": "0.3.1"
            },
            "3": { "version": "0.2.0" }
        }
    }"#;

    #[rstest]
    fn legacy_table_reads_as_current_schema(temp: TempDir) {
        let store = store(&temp);
        std::fs::write(store.path(), LEGACY_TABLE).expect("seed");

        let doc = store.load().expect("load legacy table");

        let versions: Vec<_> = doc.configs().iter().map(|c| c.version.as_str()).collect();
        assert_eq!(versions, vec!["0.3.1", "0.4.0.dev2"]);
        let first = doc.get("0.3.1").expect("migrated record");
        assert_eq!(first.server_run_as_uid, 1000);
        assert_eq!(first.server_run_as_gid, 1000);
        assert_eq!(first.sentry_dsn.as_deref(), Some("https://key@sentry.example/1"));
        assert_eq!(first.pki_dir, "/home/dev/.local/share/pikesquares/pki");
        assert_eq!(doc.get("0.4.0.dev2").and_then(|c| c.sentry_dsn.clone()), None);
        assert_eq!(std::fs::read_to_string(store.path()).expect("read"), LEGACY_TABLE);
    }

    #[rstest]
    fn upsert_over_legacy_table_rewrites_current_schema(temp: TempDir) {
        let store = store(&temp);
        std::fs::write(store.path(), LEGACY_TABLE).expect("seed");

        let outcome = store.upsert(config("0.3.1", 1001)).expect("upsert");
        store.upsert(config("2.3.1", 1000)).expect("upsert");

        assert_eq!(outcome, UpsertOutcome::Replaced);
        let text = std::fs::read_to_string(store.path()).expect("read");
        let json: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert_eq!(json["schema_version"], 1);
        let doc = store.load().expect("load");
        let versions: Vec<_> = doc.configs().iter().map(|c| c.version.as_str()).collect();
        assert_eq!(versions, vec!["0.3.1", "0.4.0.dev2", "2.3.1"]);
        assert_eq!(doc.get("0.3.1").map(|c| c.run_as_uid), Some(1001));
    }

    #[rstest]
    fn concurrent_upserts_keep_every_record(temp: TempDir) {
        const WRITERS: u32 = 8;
        let path = temp.path().join(DEVICE_RECORD_FILENAME);

        std::thread::scope(|scope| {
            for i in 0..WRITERS {
                let store = DeviceRecordStore::at_path(&path);
                scope.spawn(move || {
                    store
                        .upsert(config(&format!("1.0.{i}"), 1000 + i))
                        .expect("concurrent upsert");
                });
            }
        });

        let doc = DeviceRecordStore::at_path(&path).load().expect("file still parses");
        assert_eq!(doc.configs().len(), WRITERS as usize);
        for i in 0..WRITERS {
            let record = doc.get(&format!("1.0.{i}")).expect("record survived");
            assert_eq!(record.run_as_uid, 1000 + i);
        }
    }

    #[rstest]
    fn corrupt_file_is_an_error(temp: TempDir) {
        let store = store(&temp);
        std::fs::write(store.path(), "{not json").expect("seed");
        let err = store.upsert(config("2.3.1", 1000)).expect_err("corrupt");
        assert!(matches!(err, DeviceRecordError::Parse { .. }));
        assert_eq!(std::fs::read_to_string(store.path()).expect("read"), "{not json");
    }
}
