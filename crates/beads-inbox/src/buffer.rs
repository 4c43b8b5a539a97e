//! The per-session merge buffer (delivery tier 2).
//!
//! One line-delimited file per session under `.runtime/inject-queue/`.
//! Appends hold a file-level exclusive lock and write the whole line in a
//! single call, so concurrent producers interleave whole records. The
//! buffer exists to batch concurrent notifications into one coherent hook
//! response; the database stays authoritative, so a corrupt buffer is
//! simply rebuilt on the next reconciliation.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::warn;

use beads_core::inbox::InboxMessage;

use crate::Result;

/// A session's merge buffer file.
#[derive(Debug, Clone)]
pub struct MergeBuffer {
    path: PathBuf,
}

impl MergeBuffer {
    /// Wraps the buffer file for one session.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The buffer file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one message under the exclusive lock.
    pub fn append(&self, msg: &InboxMessage) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.lock_exclusive()?;
        let line = serde_json::to_string(msg)?;
        let result = (&file).write_all(format!("{line}\n").as_bytes());
        let _ = fs2::FileExt::unlock(&file);
        result?;
        Ok(())
    }

    /// Reads the buffered messages without consuming them. Corrupt lines
    /// are skipped with a warning.
    pub fn peek(&self) -> Result<Vec<InboxMessage>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(parse_lines(&text))
    }

    /// Atomically takes all buffered messages: lock, read, truncate to
    /// zero, release.
    pub fn take_all(&self) -> Result<Vec<InboxMessage>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        file.lock_exclusive()?;
        let result = (|| -> Result<Vec<InboxMessage>> {
            let text = std::fs::read_to_string(&self.path)?;
            file.set_len(0)?;
            Ok(parse_lines(&text))
        })();
        let _ = fs2::FileExt::unlock(&file);
        result
    }

    /// Returns `true` when the buffer already holds the dedup key.
    pub fn contains(&self, dedup_key: &str) -> Result<bool> {
        Ok(self.peek()?.iter().any(|m| m.dedup_key == dedup_key))
    }
}

fn parse_lines(text: &str) -> Vec<InboxMessage> {
    let mut messages = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str(trimmed) {
            Ok(msg) => messages.push(msg),
            Err(e) => {
                // Recoverable: the database rebuild replaces lost entries.
                warn!(line = line_no + 1, error = %e, "skipping corrupt buffer line");
            }
        }
    }
    messages
}
