//! Configuration management for the beads system.
//!
//! A workspace is a directory containing `.beads/`. This crate finds it,
//! reads and writes `metadata.json` (backend selection, id prefix), loads
//! `config/config.yaml` through figment (file + env layering), and lays out
//! the runtime directories used by the inbox buffer and session gates.

pub mod beads_dir;
pub mod config;
pub mod metadata;
pub mod runtime_dir;

pub use beads_dir::{ensure_beads_dir, find_beads_dir, find_beads_dir_or_error};
pub use config::{ConfigError, WorkspaceConfig, load_config, save_config};
pub use metadata::WorkspaceMetadata;
pub use runtime_dir::RuntimePaths;
