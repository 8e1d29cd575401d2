//! PikeSquares bootstrap library.
//!
//! This crate resolves which PikeSquares version a launcher should provision,
//! prepares the platform directories for it, and records the outcome in a
//! per-user device record and an env-file hand-off consumed by the next
//! launcher stage. It backs the `pikesquares-bootstrap` binary and can be
//! driven programmatically for testing.
//!
//! # Modules
//!
//! - [`bootstrap`] - Configure flow orchestration and its state machine
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - Optional `pikesquares.toml` project configuration
//! - [`context`] - Process environment and identity captured once per run
//! - [`device_record`] - Locked, schema-versioned device record store
//! - [`dirs`] - Platform directory abstraction
//! - [`env_file`] - Append-only `KEY=VALUE` hand-off writer
//! - [`error`] - Semantic error types
//! - [`exec`] - Subprocess execution seam
//! - [`fetch`] - Remote metadata and artifact fetching
//! - [`install`] - Virtual environment install stage
//! - [`layout`] - Directory layout derivation and creation
//! - [`localdev`] - Local source checkout selection
//! - [`native_build`] - Native plugin build pipeline for development installs
//! - [`output`] - User-facing stderr messages
//! - [`privilege`] - Run-as identity reconciliation
//! - [`release_tags`] - Bundled release tag to commit table
//! - [`resolver`] - Install version resolution
//! - [`version`] - Product version parsing and ordering

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod context;
pub mod device_record;
pub mod dirs;
pub mod env_file;
pub mod error;
pub mod exec;
pub mod fetch;
pub mod install;
pub mod layout;
pub mod localdev;
pub mod native_build;
pub mod output;
pub mod privilege;
pub mod release_tags;
pub mod resolver;
pub mod version;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;

/// Application name used for platform directories and artifact names.
pub const APP_NAME: &str = "pikesquares";
