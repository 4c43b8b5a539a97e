//! Federation pipeline: append-only JSONL export/import plus the git merge
//! driver.
//!
//! The exported files live in `.beads/` and are tracked by git. Lines are
//! canonical JSON (sorted keys) carrying a `content_hash`; consumers dedup
//! by that hash, which makes line order insignificant and union merges
//! conflict-free.

pub mod drift;
pub mod export;
pub mod import;
pub mod merge;

use std::path::{Path, PathBuf};

/// Errors that can occur in the federation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum FederationError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] beads_storage::StorageError),
}

/// Result alias for federation operations.
pub type Result<T> = std::result::Result<T, FederationError>;

pub(crate) fn io_err(path: &Path, source: std::io::Error) -> FederationError {
    FederationError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Resolved federation file paths for one workspace.
#[derive(Debug, Clone, PartialEq)]
pub struct FederationPaths {
    beads_dir: PathBuf,
}

impl FederationPaths {
    /// Builds paths rooted at a `.beads/` directory.
    pub fn new(beads_dir: impl Into<PathBuf>) -> Self {
        Self {
            beads_dir: beads_dir.into(),
        }
    }

    pub fn beads_dir(&self) -> &Path {
        &self.beads_dir
    }

    /// The primary federation file: one issue per line.
    pub fn issues(&self) -> PathBuf {
        self.beads_dir.join("issues.jsonl")
    }

    pub fn comments(&self) -> PathBuf {
        self.beads_dir.join("comments.jsonl")
    }

    pub fn labels(&self) -> PathBuf {
        self.beads_dir.join("labels.jsonl")
    }

    pub fn dependencies(&self) -> PathBuf {
        self.beads_dir.join("dependencies.jsonl")
    }

    pub fn inbox(&self) -> PathBuf {
        self.beads_dir.join("inbox.jsonl")
    }

    /// Pipe-delimited audit log.
    pub fn events_log(&self) -> PathBuf {
        self.beads_dir.join("events.log")
    }
}
