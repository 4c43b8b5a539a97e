//! Workspace metadata: `.beads/metadata.json`.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use beads_storage::Backend;

use crate::config::{ConfigError, Result};

/// Relative path of the metadata file inside `.beads/`.
pub const METADATA_FILE: &str = "metadata.json";

/// The contents of `.beads/metadata.json`: which backend serves the
/// workspace, the issue id prefix, and when the workspace was initialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceMetadata {
    #[serde(default)]
    pub backend: Backend,

    pub prefix: String,

    pub created_at: DateTime<Utc>,
}

impl WorkspaceMetadata {
    /// Creates metadata for a fresh workspace.
    pub fn new(backend: Backend, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            created_at: Utc::now(),
        }
    }

    /// Loads metadata from `.beads/metadata.json`.
    pub fn load(beads_dir: &Path) -> Result<Self> {
        let path = beads_dir.join(METADATA_FILE);
        let text = std::fs::read_to_string(&path)?;
        serde_json::from_str(&text).map_err(|e| ConfigError::InvalidMetadata(e.to_string()))
    }

    /// Writes metadata to `.beads/metadata.json`.
    pub fn save(&self, beads_dir: &Path) -> Result<()> {
        let path = beads_dir.join(METADATA_FILE);
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidMetadata(e.to_string()))?;
        std::fs::write(&path, text)?;
        Ok(())
    }

    /// The database path for the selected backend.
    pub fn db_path(&self, beads_dir: &Path) -> std::path::PathBuf {
        match self.backend {
            Backend::Embedded => beads_dir.join("beads.db"),
            Backend::Versioned => {
                let dir = beads_dir.join("dolt").join("beads");
                dir.join("beads.db")
            }
        }
    }
}
