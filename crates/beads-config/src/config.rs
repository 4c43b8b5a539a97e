//! Workspace configuration loading.
//!
//! `.beads/config/config.yaml` holds workspace-level settings; environment
//! variables prefixed `BEADS_` override file values through figment.

use std::collections::HashMap;
use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read or written.
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// The configuration file contained invalid YAML.
    #[error("failed to parse config file: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Figment layering failed.
    #[error("failed to assemble configuration: {0}")]
    LayerError(#[from] Box<figment::Error>),

    /// The `.beads/` directory was not found.
    #[error("no .beads directory found (run 'bd init' first)")]
    BeadsDirNotFound,

    /// Workspace metadata was missing or malformed.
    #[error("invalid workspace metadata: {0}")]
    InvalidMetadata(String),
}

/// A specialized `Result` type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Federation/sync settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Export each committed mutation to the JSONL files.
    #[serde(default = "default_true")]
    pub export_on_change: bool,

    /// Re-import the JSONL files when git rewrites them.
    #[serde(default = "default_true")]
    pub import_on_change: bool,

    /// Commit message prefix for `bd sync`.
    #[serde(default = "default_commit_prefix")]
    pub commit_prefix: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            export_on_change: true,
            import_on_change: true,
            commit_prefix: default_commit_prefix(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_commit_prefix() -> String {
    "beads:".to_string()
}

/// Daemon tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Seconds between gate evaluation passes.
    #[serde(default = "default_gate_interval")]
    pub gate_check_interval_secs: u64,

    /// Hours a delivered or expired inbox row survives before reaping.
    #[serde(default = "default_inbox_retention")]
    pub inbox_retention_hours: u64,

    /// Oldest client protocol version the daemon accepts.
    #[serde(default = "default_version_floor")]
    pub protocol_version_floor: u32,

    /// Size of the read worker pool.
    #[serde(default = "default_read_pool")]
    pub read_pool_size: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            gate_check_interval_secs: default_gate_interval(),
            inbox_retention_hours: default_inbox_retention(),
            protocol_version_floor: default_version_floor(),
            read_pool_size: default_read_pool(),
        }
    }
}

fn default_gate_interval() -> u64 {
    60
}

fn default_inbox_retention() -> u64 {
    24
}

fn default_version_floor() -> u32 {
    1
}

fn default_read_pool() -> usize {
    4
}

// ---------------------------------------------------------------------------
// WorkspaceConfig
// ---------------------------------------------------------------------------

/// The contents of `.beads/config/config.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Additional issue types beyond the built-ins.
    #[serde(default)]
    pub custom_types: Vec<String>,

    /// Additional statuses beyond the built-ins.
    #[serde(default)]
    pub custom_statuses: Vec<String>,

    /// Free-form extension values.
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

/// Relative path of the config file inside `.beads/`.
pub const CONFIG_FILE: &str = "config/config.yaml";

/// Loads workspace configuration: defaults, then the YAML file (if any),
/// then `BEADS_*` environment variables.
pub fn load_config(beads_dir: &Path) -> Result<WorkspaceConfig> {
    let path = beads_dir.join(CONFIG_FILE);
    let mut figment = Figment::from(Serialized::defaults(WorkspaceConfig::default()));
    if path.is_file() {
        figment = figment.merge(Yaml::file(&path));
    }
    figment = figment.merge(Env::prefixed("BEADS_").split("__"));
    figment.extract().map_err(|e| ConfigError::LayerError(Box::new(e)))
}

/// Saves the workspace configuration as YAML.
pub fn save_config(beads_dir: &Path, config: &WorkspaceConfig) -> Result<()> {
    let path = beads_dir.join(CONFIG_FILE);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&path, yaml)?;
    Ok(())
}
