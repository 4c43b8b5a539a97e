//! Storage backends for the beads system.
//!
//! Provides the [`Storage`] trait and two implementations: the embedded
//! [`SqliteStore`] and the commit-graph [`VersionedStore`]. Selection is
//! recorded in the workspace metadata (`backend` field).

pub mod batch;
pub mod error;
pub mod sqlite;
pub mod traits;
pub mod versioned;

// Re-exports for convenience.
pub use error::StorageError;
pub use sqlite::SqliteStore;
pub use traits::{
    BlockedIssue, BusHandlerRow, EpicRollup, IssueUpdates, Statistics, Storage, Transaction,
};
pub use versioned::VersionedStore;

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};

use beads_core::comment::{Comment, Event};
use beads_core::dependency::Dependency;
use beads_core::filter::{IssueFilter, WorkFilter};
use beads_core::inbox::InboxMessage;
use beads_core::issue::Issue;

use crate::error::Result;

/// Which backend serves a workspace. Persisted in `.beads/metadata.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Single-file SQLite engine.
    #[default]
    Embedded,
    /// Commit-graph layer over the embedded engine.
    Versioned,
}

/// Opens the backend selected for a workspace database path.
pub fn open_backend(backend: Backend, db_path: &Path) -> Result<Box<dyn Storage>> {
    match backend {
        Backend::Embedded => Ok(Box::new(SqliteStore::open(db_path)?)),
        Backend::Versioned => Ok(Box::new(VersionedStore::open(db_path)?)),
    }
}

// ---------------------------------------------------------------------------
// Storage trait implementation for SqliteStore
// ---------------------------------------------------------------------------

impl Storage for SqliteStore {
    fn create_issue(&self, issue: &Issue, actor: &str) -> Result<()> {
        self.create_issue_impl(issue, actor)
    }

    fn create_issues(&self, issues: &[Issue], actor: &str) -> Result<()> {
        self.create_issues_impl(issues, actor)
    }

    fn get_issue(&self, id: &str) -> Result<Issue> {
        self.get_issue_impl(id)
    }

    fn get_issues_by_ids(&self, ids: &[String]) -> Result<Vec<Issue>> {
        self.get_issues_by_ids_impl(ids)
    }

    fn update_issue(&self, id: &str, updates: &IssueUpdates, actor: &str) -> Result<Issue> {
        self.update_issue_impl(id, updates, actor)
    }

    fn close_issue(&self, id: &str, reason: &str, actor: &str, session: &str) -> Result<()> {
        self.close_issue_impl(id, reason, actor, session)
    }

    fn reopen_issue(&self, id: &str, actor: &str) -> Result<()> {
        self.reopen_issue_impl(id, actor)
    }

    fn tombstone_issue(&self, id: &str, actor: &str) -> Result<()> {
        self.tombstone_issue_impl(id, actor)
    }

    fn list_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        self.list_issues_impl(filter)
    }

    fn add_dependency(&self, dep: &Dependency, actor: &str) -> Result<()> {
        self.add_dependency_impl(dep, actor)
    }

    fn remove_dependency(&self, issue_id: &str, depends_on_id: &str, actor: &str) -> Result<()> {
        self.remove_dependency_impl(issue_id, depends_on_id, actor)
    }

    fn get_dependencies(&self, issue_id: &str) -> Result<Vec<Issue>> {
        self.get_dependencies_impl(issue_id)
    }

    fn get_dependents(&self, issue_id: &str) -> Result<Vec<Issue>> {
        self.get_dependents_impl(issue_id)
    }

    fn get_dependency_records(&self, issue_id: &str) -> Result<Vec<Dependency>> {
        self.get_dependency_records_impl(issue_id)
    }

    fn open_blocking_dependents(&self, issue_id: &str) -> Result<Vec<String>> {
        self.open_blocking_dependents_impl(issue_id)
    }

    fn add_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<()> {
        self.add_label_impl(issue_id, label, actor)
    }

    fn remove_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<()> {
        self.remove_label_impl(issue_id, label, actor)
    }

    fn get_labels(&self, issue_id: &str) -> Result<Vec<String>> {
        self.get_labels_impl(issue_id)
    }

    fn get_labels_for_issues(&self, ids: &[String]) -> Result<HashMap<String, Vec<String>>> {
        self.get_labels_for_issues_impl(ids)
    }

    fn label_counts(&self) -> Result<Vec<(String, i64)>> {
        self.label_counts_impl()
    }

    fn get_ready_work(&self, filter: &WorkFilter) -> Result<Vec<Issue>> {
        self.get_ready_work_impl(filter)
    }

    fn get_blocked_issues(&self, filter: &WorkFilter) -> Result<Vec<BlockedIssue>> {
        self.get_blocked_issues_impl(filter)
    }

    fn get_epic_rollup(&self, epic_id: &str) -> Result<EpicRollup> {
        self.get_epic_rollup_impl(epic_id)
    }

    fn add_comment(&self, issue_id: &str, author: &str, text: &str) -> Result<Comment> {
        self.add_comment_impl(issue_id, author, text)
    }

    fn get_comments(&self, issue_id: &str) -> Result<Vec<Comment>> {
        self.get_comments_impl(issue_id)
    }

    fn get_events(&self, issue_id: &str, limit: i32) -> Result<Vec<Event>> {
        self.get_events_impl(issue_id, limit)
    }

    fn get_all_events_since(&self, since_id: i64) -> Result<Vec<Event>> {
        self.get_all_events_since_impl(since_id)
    }

    fn inbox_push(&self, msg: &InboxMessage) -> Result<bool> {
        self.inbox_push_impl(msg)
    }

    fn inbox_undelivered(&self, agent_name: &str) -> Result<Vec<InboxMessage>> {
        self.inbox_undelivered_impl(agent_name)
    }

    fn inbox_mark_delivered(&self, ids: &[i64]) -> Result<()> {
        self.inbox_mark_delivered_impl(ids)
    }

    fn inbox_list(&self, agent_name: &str, limit: i32) -> Result<Vec<InboxMessage>> {
        self.inbox_list_impl(agent_name, limit)
    }

    fn inbox_reap(&self, older_than: DateTime<Utc>) -> Result<usize> {
        self.inbox_reap_impl(older_than)
    }

    fn open_gates(&self) -> Result<Vec<Issue>> {
        self.open_gates_impl()
    }

    fn register_bus_handler(&self, row: &BusHandlerRow) -> Result<()> {
        self.register_bus_handler_impl(row)
    }

    fn unregister_bus_handler(&self, id: &str) -> Result<()> {
        self.unregister_bus_handler_impl(id)
    }

    fn list_bus_handlers(&self) -> Result<Vec<BusHandlerRow>> {
        self.list_bus_handlers_impl()
    }

    fn get_statistics(&self) -> Result<Statistics> {
        self.get_statistics_impl()
    }

    fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.set_config_impl(key, value)
    }

    fn get_config(&self, key: &str) -> Result<String> {
        self.get_config_impl(key)
    }

    fn get_all_config(&self) -> Result<HashMap<String, String>> {
        self.get_all_config_impl()
    }

    fn rebuild_caches(&self) -> Result<usize> {
        self.rebuild_caches_impl()
    }

    fn run_in_transaction(&self, f: &dyn Fn(&dyn Transaction) -> Result<()>) -> Result<()> {
        self.run_in_transaction_impl(f)
    }

    fn close(&self) -> Result<()> {
        // The connection closes when dropped; the Mutex wrapper ensures no
        // statement is in flight.
        Ok(())
    }
}
