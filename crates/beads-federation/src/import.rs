//! Import: upsert unknown federation lines into storage.
//!
//! Runs on workspace open and whenever git rewrites the files. Idempotent:
//! a line whose `content_hash` is already present is a no-op; for the same
//! id the newer `updated_at` wins. A single bad line logs and is skipped --
//! the file is eventually consistent, not transactional.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, warn};

use beads_core::issue::Issue;
use beads_core::validation;
use beads_storage::{IssueUpdates, Storage};

use crate::export::line_content_hash;
use crate::{FederationPaths, Result, io_err};

/// Outcome of one import pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportStats {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
}

impl ImportStats {
    /// Total lines that changed the database.
    pub fn applied(&self) -> usize {
        self.created + self.updated
    }
}

/// Imports the issues file into storage.
pub fn import_issues(store: &dyn Storage, paths: &FederationPaths) -> Result<ImportStats> {
    import_issues_file(store, &paths.issues())
}

/// Imports one issues JSONL file into storage.
pub fn import_issues_file(store: &dyn Storage, path: &Path) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(stats),
        Err(e) => return Err(io_err(path, e)),
    };

    // Hashes already in the database: identical content is a no-op.
    let known: HashSet<String> = store
        .list_issues(&beads_core::filter::IssueFilter {
            include_closed: true,
            include_templates: true,
            ..Default::default()
        })?
        .into_iter()
        .map(|i| i.content_hash)
        .collect();

    for (line_no, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let hash = line_content_hash(trimmed);
        if known.contains(&hash) {
            stats.unchanged += 1;
            continue;
        }
        match serde_json::from_str::<Issue>(trimmed) {
            Ok(mut issue) => {
                issue.set_defaults();
                issue.content_hash = hash;
                match upsert_issue(store, &issue) {
                    Ok(Upsert::Created) => stats.created += 1,
                    Ok(Upsert::Updated) => stats.updated += 1,
                    Ok(Upsert::Stale) => stats.unchanged += 1,
                    Err(e) => {
                        warn!(line = line_no + 1, error = %e, "skipping unimportable line");
                        stats.skipped += 1;
                    }
                }
            }
            Err(e) => {
                warn!(line = line_no + 1, error = %e, "skipping unparsable line");
                stats.skipped += 1;
            }
        }
    }

    debug!(?stats, "import pass complete");
    Ok(stats)
}

enum Upsert {
    Created,
    Updated,
    Stale,
}

/// Applies one imported issue: create when unknown, overwrite when the
/// incoming record is newer, drop when stale.
fn upsert_issue(store: &dyn Storage, incoming: &Issue) -> beads_storage::error::Result<Upsert> {
    validation::validate_for_import(incoming, &[])
        .map_err(|e| beads_storage::StorageError::validation(e.to_string()))?;

    match store.get_issue(&incoming.id) {
        Err(e) if e.is_not_found() => {
            store.create_issue(incoming, "import")?;
            apply_relational(store, incoming);
            Ok(Upsert::Created)
        }
        Err(e) => Err(e),
        Ok(existing) => {
            if incoming.updated_at <= existing.updated_at {
                return Ok(Upsert::Stale);
            }
            let updates = IssueUpdates {
                title: Some(incoming.title.clone()),
                description: Some(incoming.description.clone()),
                status: Some(incoming.status.clone()),
                priority: Some(incoming.priority),
                issue_type: Some(incoming.issue_type.clone()),
                assignee: Some(incoming.assignee.clone()),
                close_reason: Some(incoming.close_reason.clone()),
                metadata: Some(incoming.metadata.as_ref().map(|m| m.get().to_string())),
                source_repo: Some(incoming.source_repo.clone()),
                source_formula: Some(incoming.source_formula.clone()),
                is_template: Some(incoming.is_template),
                expected_updated_at: None,
            };
            store.update_issue(&incoming.id, &updates, "import")?;
            apply_relational(store, incoming);
            Ok(Upsert::Updated)
        }
    }
}

/// Imports the relational data embedded on an issue line. Failures (an edge
/// to a not-yet-imported issue, a cycle from a corrupt source) log and skip;
/// a later pass converges.
fn apply_relational(store: &dyn Storage, incoming: &Issue) {
    for label in &incoming.labels {
        if let Err(e) = store.add_label(&incoming.id, label, "import") {
            warn!(id = %incoming.id, %label, error = %e, "label import skipped");
        }
    }
    for dep in &incoming.dependencies {
        if let Err(e) = store.add_dependency(dep, "import") {
            warn!(
                id = %incoming.id,
                depends_on = %dep.depends_on_id,
                error = %e,
                "dependency import skipped"
            );
        }
    }
    for comment in &incoming.comments {
        let existing = store.get_comments(&incoming.id).unwrap_or_default();
        let duplicate = existing.iter().any(|c| {
            c.author == comment.author
                && c.text == comment.text
                && c.created_at == comment.created_at
        });
        if duplicate {
            continue;
        }
        let result = store.run_in_transaction(&|tx| {
            tx.import_comment(
                &incoming.id,
                &comment.author,
                &comment.text,
                comment.created_at,
            )?;
            Ok(())
        });
        if let Err(e) = result {
            warn!(id = %incoming.id, error = %e, "comment import skipped");
        }
    }
}
