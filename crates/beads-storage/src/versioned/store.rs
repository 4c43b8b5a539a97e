//! [`VersionedStore`] -- the version-controlled storage backend.
//!
//! The same relational tables as the embedded engine, versioned by a
//! content-addressed commit graph. Every write group runs in one SQL
//! transaction whose final statement records a commit on the shared branch;
//! committing inside the transaction means a commit reflects exactly the
//! group's writes and never a concurrent connection's uncommitted work.
//!
//! All writers share one branch (`main`); no per-worker branches. Two
//! writers touching disjoint cells serialize cleanly; two writers updating
//! the same cell race on the stored `updated_at` expectation and the loser
//! fails with `Conflict`.
//!
//! Local bookkeeping (delivery marks, reaping, the handler registry, config)
//! bypasses the commit graph: it is not federated content.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use sha2::{Digest, Sha256};
use tracing::debug;

use beads_core::comment::{Comment, Event};
use beads_core::dependency::Dependency;
use beads_core::filter::{IssueFilter, WorkFilter};
use beads_core::inbox::InboxMessage;
use beads_core::issue::Issue;

use crate::error::{Result, StorageError};
use crate::sqlite::store::SqliteStore;
use crate::sqlite::transaction::SqliteTx;
use crate::sqlite::{comments, dependencies, inbox, issues, labels};
use crate::traits::{
    BlockedIssue, BusHandlerRow, EpicRollup, IssueUpdates, Statistics, Storage, Transaction,
};

/// The single branch all writers share.
const DEFAULT_BRANCH: &str = "main";

/// One commit in the version graph.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitInfo {
    pub hash: String,
    pub parent: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Commit-graph storage backend.
pub struct VersionedStore {
    inner: SqliteStore,
    branch: String,
}

const VC_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS vc_commits (
        hash        TEXT PRIMARY KEY,
        parent      TEXT NOT NULL DEFAULT '',
        message     TEXT NOT NULL DEFAULT '',
        root_digest TEXT NOT NULL,
        created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );
    CREATE TABLE IF NOT EXISTS vc_branches (
        name TEXT PRIMARY KEY,
        head TEXT NOT NULL
    );
"#;

impl VersionedStore {
    /// Opens (or creates) a versioned database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let inner = SqliteStore::open(path)?;
        let store = Self {
            inner,
            branch: DEFAULT_BRANCH.to_string(),
        };
        store.init_version_graph()?;
        Ok(store)
    }

    /// Opens an in-memory versioned database (tests).
    pub fn open_in_memory() -> Result<Self> {
        let inner = SqliteStore::open_in_memory()?;
        let store = Self {
            inner,
            branch: DEFAULT_BRANCH.to_string(),
        };
        store.init_version_graph()?;
        Ok(store)
    }

    fn init_version_graph(&self) -> Result<()> {
        let conn = self.inner.lock_conn()?;
        conn.execute_batch(VC_SCHEMA)
            .map_err(|e| StorageError::Migration {
                name: "vc_schema".into(),
                reason: e.to_string(),
            })?;

        // Genesis commit for a fresh branch.
        let head: Option<String> = conn
            .query_row(
                "SELECT head FROM vc_branches WHERE name = ?1",
                params![self.branch],
                |row| row.get(0),
            )
            .ok();
        if head.is_none() {
            let digest = root_digest(&conn)?;
            let hash = commit_hash("", &digest);
            conn.execute(
                "INSERT OR IGNORE INTO vc_commits (hash, parent, message, root_digest)
                 VALUES (?1, '', 'genesis', ?2)",
                params![hash, digest],
            )
            .map_err(issues::map_engine_error)?;
            conn.execute(
                "INSERT OR REPLACE INTO vc_branches (name, head) VALUES (?1, ?2)",
                params![self.branch, hash],
            )
            .map_err(issues::map_engine_error)?;
        }
        Ok(())
    }

    /// Runs a write group in one transaction that ends with a branch commit.
    fn commit_write<F>(&self, message: &str, f: F) -> Result<()>
    where
        F: FnOnce(&Connection) -> Result<()>,
    {
        let conn = self.inner.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StorageError::Transaction(format!("failed to begin: {e}")))?;

        f(&tx)?;
        commit_branch(&tx, &self.branch, message)?;

        tx.commit()
            .map_err(|e| StorageError::Transaction(format!("failed to commit: {e}")))?;
        Ok(())
    }

    /// Returns the branch head commit hash.
    pub fn head(&self) -> Result<String> {
        let conn = self.inner.lock_conn()?;
        conn.query_row(
            "SELECT head FROM vc_branches WHERE name = ?1",
            params![self.branch],
            |row| row.get(0),
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StorageError::not_found("branch", &self.branch),
            other => issues::map_engine_error(other),
        })
    }

    /// Returns the commit log, newest first, walking parent links from head.
    pub fn history(&self, limit: usize) -> Result<Vec<CommitInfo>> {
        let mut commits = Vec::new();
        let conn = self.inner.lock_conn()?;
        let mut cursor: String = conn
            .query_row(
                "SELECT head FROM vc_branches WHERE name = ?1",
                params![self.branch],
                |row| row.get(0),
            )
            .map_err(issues::map_engine_error)?;

        while !cursor.is_empty() && commits.len() < limit {
            let row = conn.query_row(
                "SELECT hash, parent, message, created_at FROM vc_commits WHERE hash = ?1",
                params![cursor],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            );
            match row {
                Ok((hash, parent, message, created_at)) => {
                    cursor = parent.clone();
                    commits.push(CommitInfo {
                        hash,
                        parent,
                        message,
                        created_at: crate::sqlite::parse_datetime(&created_at),
                    });
                }
                Err(_) => break,
            }
        }
        Ok(commits)
    }
}

/// Digest of the current table state: issue, dependency, label and inbox
/// rows in deterministic order. The commit hash derives from this, which
/// makes commits content-addressed.
fn root_digest(conn: &Connection) -> Result<String> {
    let mut h = Sha256::new();

    let mut stmt = conn
        .prepare("SELECT id, content_hash, status, updated_at FROM issues ORDER BY id")
        .map_err(issues::map_engine_error)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(format!(
                "i|{}|{}|{}|{}",
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .map_err(issues::map_engine_error)?;
    for row in rows {
        h.update(row.map_err(issues::map_engine_error)?.as_bytes());
        h.update([0u8]);
    }

    let mut stmt = conn
        .prepare(
            "SELECT issue_id, depends_on_id, type FROM dependencies
             ORDER BY issue_id, depends_on_id",
        )
        .map_err(issues::map_engine_error)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(format!(
                "d|{}|{}|{}",
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .map_err(issues::map_engine_error)?;
    for row in rows {
        h.update(row.map_err(issues::map_engine_error)?.as_bytes());
        h.update([0u8]);
    }

    let mut stmt = conn
        .prepare("SELECT issue_id, label FROM labels ORDER BY issue_id, label")
        .map_err(issues::map_engine_error)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(format!(
                "l|{}|{}",
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
            ))
        })
        .map_err(issues::map_engine_error)?;
    for row in rows {
        h.update(row.map_err(issues::map_engine_error)?.as_bytes());
        h.update([0u8]);
    }

    let mut stmt = conn
        .prepare("SELECT dedup_key FROM inbox ORDER BY dedup_key")
        .map_err(issues::map_engine_error)?;
    let rows = stmt
        .query_map([], |row| Ok(format!("m|{}", row.get::<_, String>(0)?)))
        .map_err(issues::map_engine_error)?;
    for row in rows {
        h.update(row.map_err(issues::map_engine_error)?.as_bytes());
        h.update([0u8]);
    }

    Ok(format!("{:x}", h.finalize()))
}

fn commit_hash(parent: &str, digest: &str) -> String {
    let mut h = Sha256::new();
    h.update(parent.as_bytes());
    h.update([0u8]);
    h.update(digest.as_bytes());
    format!("{:x}", h.finalize())
}

/// Records a commit on the branch; called as the final statement of every
/// write transaction. A write group that changed nothing leaves the head
/// untouched.
fn commit_branch(conn: &Connection, branch: &str, message: &str) -> Result<()> {
    let parent: String = conn
        .query_row(
            "SELECT head FROM vc_branches WHERE name = ?1",
            params![branch],
            |row| row.get(0),
        )
        .map_err(issues::map_engine_error)?;
    let parent_digest: String = conn
        .query_row(
            "SELECT root_digest FROM vc_commits WHERE hash = ?1",
            params![parent],
            |row| row.get(0),
        )
        .map_err(issues::map_engine_error)?;

    let digest = root_digest(conn)?;
    if digest == parent_digest {
        debug!(branch, "no content change, skipping commit");
        return Ok(());
    }

    let hash = commit_hash(&parent, &digest);
    conn.execute(
        "INSERT OR IGNORE INTO vc_commits (hash, parent, message, root_digest)
         VALUES (?1, ?2, ?3, ?4)",
        params![hash, parent, message, digest],
    )
    .map_err(issues::map_engine_error)?;
    conn.execute(
        "UPDATE vc_branches SET head = ?1 WHERE name = ?2",
        params![hash, branch],
    )
    .map_err(issues::map_engine_error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Storage trait implementation
// ---------------------------------------------------------------------------

impl Storage for VersionedStore {
    fn create_issue(&self, issue: &Issue, actor: &str) -> Result<()> {
        self.commit_write(&format!("create {}", issue.id), |conn| {
            issues::insert_issue(conn, issue, actor)
        })
    }

    fn create_issues(&self, batch: &[Issue], actor: &str) -> Result<()> {
        self.commit_write(&format!("create {} issues", batch.len()), |conn| {
            for issue in batch {
                issues::insert_issue(conn, issue, actor)?;
            }
            Ok(())
        })
    }

    fn get_issue(&self, id: &str) -> Result<Issue> {
        self.inner.get_issue_impl(id)
    }

    fn get_issues_by_ids(&self, ids: &[String]) -> Result<Vec<Issue>> {
        self.inner.get_issues_by_ids_impl(ids)
    }

    fn update_issue(&self, id: &str, updates: &IssueUpdates, actor: &str) -> Result<Issue> {
        let mut updated: Option<Issue> = None;
        self.commit_write(&format!("update {id}"), |conn| {
            updated = Some(issues::update_issue_on_conn(conn, id, updates, actor)?);
            Ok(())
        })?;
        updated.ok_or_else(|| StorageError::Internal("update produced no issue".into()))
    }

    fn close_issue(&self, id: &str, reason: &str, actor: &str, session: &str) -> Result<()> {
        self.commit_write(&format!("close {id}"), |conn| {
            issues::close_issue_on_conn(conn, id, reason, actor, session)
        })
    }

    fn reopen_issue(&self, id: &str, actor: &str) -> Result<()> {
        self.commit_write(&format!("reopen {id}"), |conn| {
            issues::reopen_issue_on_conn(conn, id, actor)
        })
    }

    fn tombstone_issue(&self, id: &str, actor: &str) -> Result<()> {
        self.commit_write(&format!("tombstone {id}"), |conn| {
            issues::tombstone_issue_on_conn(conn, id, actor)
        })
    }

    fn list_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        self.inner.list_issues_impl(filter)
    }

    fn add_dependency(&self, dep: &Dependency, actor: &str) -> Result<()> {
        self.commit_write(
            &format!("dep {} -> {}", dep.issue_id, dep.depends_on_id),
            |conn| dependencies::add_dependency_on_conn(conn, dep, actor),
        )
    }

    fn remove_dependency(&self, issue_id: &str, depends_on_id: &str, actor: &str) -> Result<()> {
        self.commit_write(&format!("undep {issue_id} -> {depends_on_id}"), |conn| {
            dependencies::remove_dependency_on_conn(conn, issue_id, depends_on_id, actor)
        })
    }

    fn get_dependencies(&self, issue_id: &str) -> Result<Vec<Issue>> {
        self.inner.get_dependencies_impl(issue_id)
    }

    fn get_dependents(&self, issue_id: &str) -> Result<Vec<Issue>> {
        self.inner.get_dependents_impl(issue_id)
    }

    fn get_dependency_records(&self, issue_id: &str) -> Result<Vec<Dependency>> {
        self.inner.get_dependency_records_impl(issue_id)
    }

    fn open_blocking_dependents(&self, issue_id: &str) -> Result<Vec<String>> {
        self.inner.open_blocking_dependents_impl(issue_id)
    }

    fn add_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<()> {
        self.commit_write(&format!("label {issue_id} +{label}"), |conn| {
            labels::add_label_on_conn(conn, issue_id, label, actor)
        })
    }

    fn remove_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<()> {
        self.commit_write(&format!("label {issue_id} -{label}"), |conn| {
            labels::remove_label_on_conn(conn, issue_id, label, actor)
        })
    }

    fn get_labels(&self, issue_id: &str) -> Result<Vec<String>> {
        self.inner.get_labels_impl(issue_id)
    }

    fn get_labels_for_issues(&self, ids: &[String]) -> Result<HashMap<String, Vec<String>>> {
        self.inner.get_labels_for_issues_impl(ids)
    }

    fn label_counts(&self) -> Result<Vec<(String, i64)>> {
        self.inner.label_counts_impl()
    }

    fn get_ready_work(&self, filter: &WorkFilter) -> Result<Vec<Issue>> {
        self.inner.get_ready_work_impl(filter)
    }

    fn get_blocked_issues(&self, filter: &WorkFilter) -> Result<Vec<BlockedIssue>> {
        self.inner.get_blocked_issues_impl(filter)
    }

    fn get_epic_rollup(&self, epic_id: &str) -> Result<EpicRollup> {
        self.inner.get_epic_rollup_impl(epic_id)
    }

    fn add_comment(&self, issue_id: &str, author: &str, text: &str) -> Result<Comment> {
        let mut created: Option<Comment> = None;
        self.commit_write(&format!("comment {issue_id}"), |conn| {
            created = Some(comments::add_comment_on_conn(conn, issue_id, author, text)?);
            Ok(())
        })?;
        created.ok_or_else(|| StorageError::Internal("comment produced no row".into()))
    }

    fn get_comments(&self, issue_id: &str) -> Result<Vec<Comment>> {
        self.inner.get_comments_impl(issue_id)
    }

    fn get_events(&self, issue_id: &str, limit: i32) -> Result<Vec<Event>> {
        self.inner.get_events_impl(issue_id, limit)
    }

    fn get_all_events_since(&self, since_id: i64) -> Result<Vec<Event>> {
        self.inner.get_all_events_since_impl(since_id)
    }

    fn inbox_push(&self, msg: &InboxMessage) -> Result<bool> {
        let mut inserted = false;
        self.commit_write(&format!("inbox {}", msg.dedup_key), |conn| {
            inserted = inbox::inbox_push_on_conn(conn, msg)?;
            Ok(())
        })?;
        Ok(inserted)
    }

    fn inbox_undelivered(&self, agent_name: &str) -> Result<Vec<InboxMessage>> {
        self.inner.inbox_undelivered_impl(agent_name)
    }

    fn inbox_mark_delivered(&self, ids: &[i64]) -> Result<()> {
        self.inner.inbox_mark_delivered_impl(ids)
    }

    fn inbox_list(&self, agent_name: &str, limit: i32) -> Result<Vec<InboxMessage>> {
        self.inner.inbox_list_impl(agent_name, limit)
    }

    fn inbox_reap(&self, older_than: DateTime<Utc>) -> Result<usize> {
        self.inner.inbox_reap_impl(older_than)
    }

    fn open_gates(&self) -> Result<Vec<Issue>> {
        self.inner.open_gates_impl()
    }

    fn register_bus_handler(&self, row: &BusHandlerRow) -> Result<()> {
        self.inner.register_bus_handler_impl(row)
    }

    fn unregister_bus_handler(&self, id: &str) -> Result<()> {
        self.inner.unregister_bus_handler_impl(id)
    }

    fn list_bus_handlers(&self) -> Result<Vec<BusHandlerRow>> {
        self.inner.list_bus_handlers_impl()
    }

    fn get_statistics(&self) -> Result<Statistics> {
        self.inner.get_statistics_impl()
    }

    fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.inner.set_config_impl(key, value)
    }

    fn get_config(&self, key: &str) -> Result<String> {
        self.inner.get_config_impl(key)
    }

    fn get_all_config(&self) -> Result<HashMap<String, String>> {
        self.inner.get_all_config_impl()
    }

    fn rebuild_caches(&self) -> Result<usize> {
        self.inner.rebuild_caches_impl()
    }

    fn run_in_transaction(&self, f: &dyn Fn(&dyn Transaction) -> Result<()>) -> Result<()> {
        self.commit_write("transaction", |conn| {
            let tx = SqliteTx { conn };
            f(&tx)
        })
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for VersionedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedStore")
            .field("branch", &self.branch)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;

    fn test_store() -> VersionedStore {
        VersionedStore::open_in_memory().unwrap()
    }

    #[test]
    fn genesis_commit_exists() {
        let store = test_store();
        let head = store.head().unwrap();
        assert_eq!(head.len(), 64);
        let history = store.history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].message, "genesis");
    }

    #[test]
    fn each_write_group_advances_head() {
        let store = test_store();
        let genesis = store.head().unwrap();

        let issue = IssueBuilder::new("First").id("bd-v1").build();
        store.create_issue(&issue, "mayor").unwrap();
        let after_create = store.head().unwrap();
        assert_ne!(genesis, after_create);

        store.close_issue("bd-v1", "done", "mayor", "").unwrap();
        let after_close = store.head().unwrap();
        assert_ne!(after_create, after_close);

        let history = store.history(10).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].message, "close bd-v1");
        assert_eq!(history[2].message, "genesis");
    }

    #[test]
    fn failed_write_leaves_head_untouched() {
        let store = test_store();
        let issue = IssueBuilder::new("First").id("bd-v2").build();
        store.create_issue(&issue, "mayor").unwrap();
        let head = store.head().unwrap();

        // Duplicate create rolls back; no commit.
        let err = store.create_issue(&issue, "mayor").unwrap_err();
        assert!(matches!(err, StorageError::Duplicate { .. }));
        assert_eq!(store.head().unwrap(), head);
    }

    #[test]
    fn same_cell_conflict_fails() {
        let store = test_store();
        let issue = IssueBuilder::new("Contended").id("bd-v3").build();
        store.create_issue(&issue, "mayor").unwrap();
        let seen = store.get_issue("bd-v3").unwrap();

        // First writer wins.
        let updates = IssueUpdates {
            title: Some("Writer A".into()),
            expected_updated_at: Some(seen.updated_at),
            ..Default::default()
        };
        store.update_issue("bd-v3", &updates, "a").unwrap();

        // Second writer raced on the same cell with the stale version.
        let updates = IssueUpdates {
            title: Some("Writer B".into()),
            expected_updated_at: Some(seen.updated_at),
            ..Default::default()
        };
        let err = store.update_issue("bd-v3", &updates, "b").unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[test]
    fn transaction_is_one_commit() {
        let store = test_store();
        store
            .run_in_transaction(&|tx| {
                tx.create_issue(&IssueBuilder::new("A").id("bd-t1").build(), "mayor")?;
                tx.create_issue(&IssueBuilder::new("B").id("bd-t2").build(), "mayor")?;
                Ok(())
            })
            .unwrap();
        // genesis + one transaction commit.
        assert_eq!(store.history(10).unwrap().len(), 2);
    }

    #[test]
    fn commits_are_content_addressed() {
        let a = test_store();
        let b = test_store();
        let issue = IssueBuilder::new("Same")
            .id("bd-same")
            .created_at(
                chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
                    .unwrap()
                    .with_timezone(&chrono::Utc),
            )
            .updated_at(
                chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
                    .unwrap()
                    .with_timezone(&chrono::Utc),
            )
            .build();
        a.create_issue(&issue, "mayor").unwrap();
        b.create_issue(&issue, "mayor").unwrap();
        assert_eq!(a.head().unwrap(), b.head().unwrap());
    }
}
