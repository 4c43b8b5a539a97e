//! Drift detection between the database and the federation file.
//!
//! The issues file accumulates history (one line per content change), so a
//! healthy file holds at least as many distinct ids as the database holds
//! issues. Large divergence in either direction points at a broken export
//! hook or a truncated file and is flagged for human inspection.

use std::collections::HashSet;
use std::path::Path;

use crate::{Result, io_err};

/// Report of one drift check.
#[derive(Debug, Clone, PartialEq)]
pub struct DriftReport {
    /// Issues in the database (tombstones excluded).
    pub db_issues: usize,
    /// Distinct issue ids seen in the federation file.
    pub file_ids: usize,
    /// Total lines in the federation file (history included).
    pub file_lines: usize,
}

impl DriftReport {
    /// Ids in the database missing from the file, as a fraction of the
    /// database size.
    pub fn divergence(&self) -> f64 {
        if self.db_issues == 0 {
            return if self.file_ids == 0 { 0.0 } else { 1.0 };
        }
        let diff = self.db_issues.abs_diff(self.file_ids);
        diff as f64 / self.db_issues as f64
    }

    /// Flags divergence worth a human look: more than 10% apart and more
    /// than 5 issues absolute.
    pub fn is_suspect(&self) -> bool {
        self.db_issues.abs_diff(self.file_ids) > 5 && self.divergence() > 0.10
    }
}

/// Compares the database issue count with the federation file.
pub fn check_drift(db_issue_count: usize, issues_file: &Path) -> Result<DriftReport> {
    let text = match std::fs::read_to_string(issues_file) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(io_err(issues_file, e)),
    };

    let mut ids: HashSet<String> = HashSet::new();
    let mut file_lines = 0usize;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        file_lines += 1;
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
            if let Some(id) = value.get("id").and_then(|v| v.as_str()) {
                ids.insert(id.to_string());
            }
        }
    }

    Ok(DriftReport {
        db_issues: db_issue_count,
        file_ids: ids.len(),
        file_lines,
    })
}
