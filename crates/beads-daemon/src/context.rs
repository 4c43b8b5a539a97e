//! Per-workspace daemon state.
//!
//! One owned context holds everything the daemon needs: config, the
//! storage handle (exclusively owned), the event bus, the stream, and the
//! federation paths. Process-level globals are limited to signal handlers
//! and the logging sink.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use tracing::warn;

use beads_bus::stream::HOOKS_SUBJECT;
use beads_bus::{EventBus, Stream};
use beads_config::{RuntimePaths, WorkspaceConfig, WorkspaceMetadata};
use beads_core::filter::IssueFilter;
use beads_core::idgen;
use beads_federation::FederationPaths;
use beads_federation::export;
use beads_storage::{Storage, open_backend};

use crate::Result;

/// Everything one workspace daemon owns.
pub struct DaemonContext {
    pub workspace_root: PathBuf,
    pub beads_dir: PathBuf,
    pub config: WorkspaceConfig,
    pub metadata: WorkspaceMetadata,
    /// The only live storage handle for the workspace.
    pub store: Box<dyn Storage>,
    pub bus: Mutex<EventBus>,
    pub stream: Stream,
    pub federation: FederationPaths,
    pub runtime: RuntimePaths,
    /// Cursor into the events table for the audit-log appender.
    last_event_id: AtomicI64,
}

impl DaemonContext {
    /// Opens the context for a workspace root (the parent of `.beads/`).
    pub fn open(workspace_root: &Path) -> Result<Self> {
        let beads_dir = workspace_root.join(".beads");
        let metadata = WorkspaceMetadata::load(&beads_dir)?;
        let config = beads_config::load_config(&beads_dir)?;
        let store = open_backend(metadata.backend, &metadata.db_path(&beads_dir))?;
        let stream = Stream::open(beads_dir.join("stream"))
            .map_err(|e| crate::DaemonError::Io(std::io::Error::other(e.to_string())))?;
        let runtime = RuntimePaths::for_workspace(workspace_root);
        runtime.ensure()?;

        let ctx = Self {
            workspace_root: workspace_root.to_path_buf(),
            beads_dir: beads_dir.clone(),
            config,
            metadata,
            store,
            bus: Mutex::new(EventBus::new()),
            stream,
            federation: FederationPaths::new(beads_dir),
            runtime,
            last_event_id: AtomicI64::new(0),
        };
        // Start the audit cursor at the current end so a restart does not
        // re-append history.
        if let Ok(events) = ctx.store.get_all_events_since(0) {
            if let Some(last) = events.last() {
                ctx.last_event_id.store(last.id, Ordering::SeqCst);
            }
        }
        Ok(ctx)
    }

    /// Generates a fresh issue id: configured prefix, adaptive length,
    /// nonce retry on collision.
    pub fn generate_issue_id(&self, title: &str, description: &str, actor: &str) -> Result<String> {
        let count = self.store.get_statistics()?.total_issues as usize;
        let length = idgen::compute_adaptive_length(
            count,
            idgen::adaptive_defaults::MIN_LENGTH,
            idgen::adaptive_defaults::MAX_LENGTH,
            idgen::adaptive_defaults::MAX_COLLISION_PROB,
        );
        let now = chrono::Utc::now();
        for nonce in 0..10 {
            let candidate = idgen::generate_hash_id(
                &self.metadata.prefix,
                title,
                description,
                actor,
                now,
                length,
                nonce,
            );
            match self.store.get_issue(&candidate) {
                Err(e) if e.is_not_found() => return Ok(candidate),
                Ok(_) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(beads_storage::StorageError::Internal(
            "failed to generate a unique id after 10 attempts".into(),
        )
        .into())
    }

    /// Post-commit side effects for a mutation: append new audit events to
    /// `events.log`, export touched issues to the federation file, and
    /// publish to the stream. All best-effort -- the transaction already
    /// committed, and export retries on the next change.
    pub fn after_write(&self, touched_ids: &[String]) {
        // Audit log.
        let cursor = self.last_event_id.load(Ordering::SeqCst);
        match self.store.get_all_events_since(cursor) {
            Ok(events) => {
                for event in &events {
                    if let Err(e) = export::export_event(&self.federation, event) {
                        warn!(error = %e, "events.log append failed; will retry");
                        break;
                    }
                }
                if let Some(last) = events.last() {
                    self.last_event_id.store(last.id, Ordering::SeqCst);
                }
            }
            Err(e) => warn!(error = %e, "event cursor read failed"),
        }

        // Federation export: one line per touched issue, current content.
        for id in touched_ids {
            match self.load_issue_with_relations(id) {
                Ok(Some(issue)) => {
                    if let Err(e) = export::export_issue_if_new(&self.federation, &issue) {
                        warn!(%id, error = %e, "federation export failed; will retry");
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(%id, error = %e, "export load failed"),
            }
        }

        // Stream publish: best-effort, never a request failure.
        for id in touched_ids {
            let note = serde_json::json!({"event": "BeadStatusChanged", "id": id});
            if let Err(e) = self.stream.publish(HOOKS_SUBJECT, &note) {
                warn!(%id, error = %e, "stream publish failed");
            }
        }
    }

    /// Loads an issue with labels, dependency records and comments
    /// populated for export. Tombstones return `None`.
    pub fn load_issue_with_relations(
        &self,
        id: &str,
    ) -> Result<Option<beads_core::issue::Issue>> {
        let mut issue = match self.store.get_issue(id) {
            Ok(issue) => issue,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        issue.labels = self.store.get_labels(id)?;
        issue.dependencies = self.store.get_dependency_records(id)?;
        issue.comments = self.store.get_comments(id)?;
        Ok(Some(issue))
    }

    /// Exports every live issue whose content hash is missing from the
    /// federation file. Returns how many lines were appended.
    pub fn export_all(&self) -> Result<usize> {
        let issues = self.store.list_issues(&IssueFilter {
            include_closed: true,
            include_templates: true,
            ..Default::default()
        })?;
        let mut appended = 0;
        for issue in issues {
            if let Some(full) = self.load_issue_with_relations(&issue.id)? {
                let written = export::export_issue_if_new(&self.federation, &full)
                    .map_err(|e| crate::DaemonError::Io(std::io::Error::other(e.to_string())))?;
                if written {
                    appended += 1;
                }
            }
        }
        Ok(appended)
    }
}

impl std::fmt::Debug for DaemonContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonContext")
            .field("workspace_root", &self.workspace_root)
            .field("backend", &self.metadata.backend)
            .finish_non_exhaustive()
    }
}

/// Initializes a minimal embedded-backend workspace (test support).
#[cfg(test)]
pub(crate) fn init_test_workspace(dir: &Path) -> PathBuf {
    let beads_dir = beads_config::ensure_beads_dir(dir).unwrap();
    WorkspaceMetadata::new(beads_storage::Backend::Embedded, "tt")
        .save(&beads_dir)
        .unwrap();
    dir.to_path_buf()
}
