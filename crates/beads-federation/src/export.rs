//! Export: append committed records to the federation files.
//!
//! Every line is the canonical record plus its `content_hash`. Appends take
//! an advisory exclusive lock on the target file so concurrent exporters
//! interleave whole lines, and each line is one `write` call so git never
//! sees a torn line. Export failure leaves the database intact; the next
//! change retries.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use fs2::FileExt;
use tracing::debug;

use beads_core::comment::Event;
use beads_core::issue::Issue;
use beads_core::jsonl::{canonical_line, line_hash};

use crate::{FederationPaths, Result, io_err};

/// Renders the export line for an issue: canonical JSON with the
/// `content_hash` key injected.
pub fn issue_export_line(issue: &Issue) -> Result<String> {
    let mut value = serde_json::to_value(issue)?;
    if let Some(map) = value.as_object_mut() {
        map.insert(
            "content_hash".to_string(),
            serde_json::Value::String(issue.content_hash.clone()),
        );
    }
    Ok(serde_json::to_string(&value)?)
}

/// Reads the `content_hash` carried on an export line, falling back to the
/// digest of the line text for records without one.
pub fn line_content_hash(line: &str) -> String {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|v| {
            v.get("content_hash")
                .and_then(|h| h.as_str())
                .filter(|h| !h.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| line_hash(line))
}

/// Appends one line to a file under an exclusive advisory lock.
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(path, e))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| io_err(path, e))?;
    file.lock_exclusive().map_err(|e| io_err(path, e))?;
    let mut buf = String::with_capacity(line.len() + 1);
    buf.push_str(line);
    buf.push('\n');
    let result = (&file).write_all(buf.as_bytes()).map_err(|e| io_err(path, e));
    let _ = fs2::FileExt::unlock(&file);
    result
}

/// Appends an issue (with its relational data populated) to the issues file.
pub fn export_issue(paths: &FederationPaths, issue: &Issue) -> Result<()> {
    let line = issue_export_line(issue)?;
    append_line(&paths.issues(), &line)?;
    debug!(id = %issue.id, "exported issue line");
    Ok(())
}

/// Appends the pipe-delimited audit line for an event.
pub fn export_event(paths: &FederationPaths, event: &Event) -> Result<()> {
    append_line(&paths.events_log(), &event.to_log_line())
}

/// Appends a standalone record (comment, label, dependency, inbox row) to
/// the given file in canonical form.
pub fn export_record<T: serde::Serialize>(path: &Path, record: &T) -> Result<()> {
    let line = canonical_line(record).map_err(|e| match e {
        beads_core::jsonl::JsonlError::Io(io) => io_err(path, io),
        beads_core::jsonl::JsonlError::Json { source, .. } => source.into(),
    })?;
    append_line(path, &line)
}

/// Collects the content hashes already present in an export file.
pub fn known_hashes(path: &Path) -> Result<std::collections::HashSet<String>> {
    let mut hashes = std::collections::HashSet::new();
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(hashes),
        Err(e) => return Err(io_err(path, e)),
    };
    for line in text.lines() {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            hashes.insert(line_content_hash(trimmed));
        }
    }
    Ok(hashes)
}

/// Appends an issue only if its hash is not already in the file. Returns
/// `true` when a line was written.
pub fn export_issue_if_new(paths: &FederationPaths, issue: &Issue) -> Result<bool> {
    let known = known_hashes(&paths.issues())?;
    if known.contains(&issue.content_hash) {
        return Ok(false);
    }
    export_issue(paths, issue)?;
    Ok(true)
}
