//! Storage and Transaction traits -- the public API for persistence.
//!
//! The daemon and the direct (no-daemon) execution path depend on these
//! traits rather than on concrete backends so that the embedded and the
//! versioned engines are interchangeable behind one contract.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use beads_core::comment::{Comment, Event};
use beads_core::dependency::Dependency;
use beads_core::enums::{IssueType, Status};
use beads_core::filter::{IssueFilter, WorkFilter};
use beads_core::inbox::InboxMessage;
use beads_core::issue::Issue;

use crate::error::Result;

// ---------------------------------------------------------------------------
// View / helper types
// ---------------------------------------------------------------------------

/// Typed partial-update struct for issues.
///
/// Only `Some` fields are applied; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct IssueUpdates {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<Status>,
    pub priority: Option<i32>,
    pub issue_type: Option<IssueType>,
    pub assignee: Option<String>,
    pub close_reason: Option<String>,
    /// Outer `Some` means "update"; inner `None` clears the blob.
    pub metadata: Option<Option<String>>,
    pub source_repo: Option<String>,
    pub source_formula: Option<String>,
    pub is_template: Option<bool>,

    /// Optimistic concurrency check: when set, the write fails with
    /// `Conflict` unless the stored `updated_at` still matches.
    pub expected_updated_at: Option<DateTime<Utc>>,
}

impl IssueUpdates {
    /// Returns `true` when no field would change.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.issue_type.is_none()
            && self.assignee.is_none()
            && self.close_reason.is_none()
            && self.metadata.is_none()
            && self.source_repo.is_none()
            && self.source_formula.is_none()
            && self.is_template.is_none()
    }
}

/// An issue that is blocked, along with the ids of its open blockers.
#[derive(Debug, Clone)]
pub struct BlockedIssue {
    pub issue: Issue,
    pub blockers: Vec<String>,
}

/// Rollup of an epic's parent-child descendants.
#[derive(Debug, Clone)]
pub struct EpicRollup {
    pub epic: Issue,
    pub total_children: i32,
    pub closed_children: i32,
    /// Children that are ready right now.
    pub ready: Vec<Issue>,
}

/// Aggregate statistics about the issue database.
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    pub total_issues: i64,
    pub open_issues: i64,
    pub in_progress_issues: i64,
    pub blocked_issues: i64,
    pub closed_issues: i64,
    pub tombstoned_issues: i64,

    /// Breakdown by issue type: `(type_name, count)`.
    pub by_type: Vec<(String, i64)>,
}

/// A registered external bus handler row.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BusHandlerRow {
    pub id: String,
    /// Comma-separated event type names.
    pub event_types: String,
    pub command: String,
    pub priority: i32,
    pub enabled: bool,
    pub timeout_s: i64,
}

// ---------------------------------------------------------------------------
// Storage trait
// ---------------------------------------------------------------------------

/// Primary storage interface. Both the embedded and the versioned backend
/// implement the same contract.
pub trait Storage: Send + Sync {
    // -- Issue CRUD ----------------------------------------------------------

    /// Creates a new issue and emits a "created" event. Fails with
    /// `Duplicate` if the id exists, `Validation` on bad input, and
    /// `CycleDetected` if an embedded dependency would close a cycle.
    fn create_issue(&self, issue: &Issue, actor: &str) -> Result<()>;

    /// Creates multiple issues in a single transaction.
    fn create_issues(&self, issues: &[Issue], actor: &str) -> Result<()>;

    /// Retrieves an issue by its ID. Tombstones read as `NotFound`.
    fn get_issue(&self, id: &str) -> Result<Issue>;

    /// Retrieves multiple issues by their IDs (batched IN-clauses).
    fn get_issues_by_ids(&self, ids: &[String]) -> Result<Vec<Issue>>;

    /// Applies partial updates, revalidates, appends one event per changed
    /// field group. Fails with `Conflict` on a stale expected version.
    fn update_issue(&self, id: &str, updates: &IssueUpdates, actor: &str) -> Result<Issue>;

    /// Closes an issue and ripples a readiness recompute to its dependents.
    fn close_issue(&self, id: &str, reason: &str, actor: &str, session: &str) -> Result<()>;

    /// Reopens a closed issue.
    fn reopen_issue(&self, id: &str, actor: &str) -> Result<()>;

    /// Tombstones an issue; it never re-appears in any query.
    fn tombstone_issue(&self, id: &str, actor: &str) -> Result<()>;

    /// Lists issues by filter with id-cursor pagination.
    fn list_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>>;

    // -- Dependencies --------------------------------------------------------

    /// Adds a dependency edge. Atomic; cycle-checked for structural types;
    /// keeps the blocked cache current.
    fn add_dependency(&self, dep: &Dependency, actor: &str) -> Result<()>;

    /// Removes a dependency edge and refreshes the blocked cache.
    fn remove_dependency(&self, issue_id: &str, depends_on_id: &str, actor: &str) -> Result<()>;

    /// Returns the issues the given issue depends on.
    fn get_dependencies(&self, issue_id: &str) -> Result<Vec<Issue>>;

    /// Returns the issues that depend on the given issue.
    fn get_dependents(&self, issue_id: &str) -> Result<Vec<Issue>>;

    /// Returns raw dependency records for an issue.
    fn get_dependency_records(&self, issue_id: &str) -> Result<Vec<Dependency>>;

    /// Ids of open issues that are blocked (via `blocks`) on the given issue.
    fn open_blocking_dependents(&self, issue_id: &str) -> Result<Vec<String>>;

    // -- Labels --------------------------------------------------------------

    fn add_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<()>;
    fn remove_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<()>;
    fn get_labels(&self, issue_id: &str) -> Result<Vec<String>>;

    /// Returns labels for many issues at once. Internal IN-clauses are
    /// batched to at most 20 ids per statement.
    fn get_labels_for_issues(&self, ids: &[String]) -> Result<HashMap<String, Vec<String>>>;

    /// Returns `(label, count)` pairs from the derived counts table.
    fn label_counts(&self) -> Result<Vec<(String, i64)>>;

    // -- Work queries --------------------------------------------------------

    /// Returns issues that are ready to work on: open, non-template, with no
    /// open blocking predecessor, ordered by priority asc, created_at asc,
    /// id asc.
    fn get_ready_work(&self, filter: &WorkFilter) -> Result<Vec<Issue>>;

    /// Returns issues that have at least one open blocker.
    fn get_blocked_issues(&self, filter: &WorkFilter) -> Result<Vec<BlockedIssue>>;

    /// Returns the rollup for one epic.
    fn get_epic_rollup(&self, epic_id: &str) -> Result<EpicRollup>;

    // -- Comments and events -------------------------------------------------

    fn add_comment(&self, issue_id: &str, author: &str, text: &str) -> Result<Comment>;
    fn get_comments(&self, issue_id: &str) -> Result<Vec<Comment>>;
    fn get_events(&self, issue_id: &str, limit: i32) -> Result<Vec<Event>>;
    fn get_all_events_since(&self, since_id: i64) -> Result<Vec<Event>>;

    // -- Inbox ---------------------------------------------------------------

    /// Inserts an inbox message. Duplicate `dedup_key` is a silent no-op;
    /// returns `true` when a row was actually inserted.
    fn inbox_push(&self, msg: &InboxMessage) -> Result<bool>;

    /// Returns undelivered messages for an agent name.
    fn inbox_undelivered(&self, agent_name: &str) -> Result<Vec<InboxMessage>>;

    /// Marks messages delivered, stamping `delivered_at`.
    fn inbox_mark_delivered(&self, ids: &[i64]) -> Result<()>;

    /// Lists all messages for an agent (delivered included), newest first.
    fn inbox_list(&self, agent_name: &str, limit: i32) -> Result<Vec<InboxMessage>>;

    /// Deletes delivered+expired rows older than the retention window.
    /// Returns the number of rows reaped.
    fn inbox_reap(&self, older_than: DateTime<Utc>) -> Result<usize>;

    // -- Gates ---------------------------------------------------------------

    /// Returns all open gate issues.
    fn open_gates(&self) -> Result<Vec<Issue>>;

    // -- Bus handlers --------------------------------------------------------

    fn register_bus_handler(&self, row: &BusHandlerRow) -> Result<()>;
    fn unregister_bus_handler(&self, id: &str) -> Result<()>;
    fn list_bus_handlers(&self) -> Result<Vec<BusHandlerRow>>;

    // -- Statistics ----------------------------------------------------------

    fn get_statistics(&self) -> Result<Statistics>;

    // -- Configuration -------------------------------------------------------

    fn set_config(&self, key: &str, value: &str) -> Result<()>;
    fn get_config(&self, key: &str) -> Result<String>;
    fn get_all_config(&self) -> Result<HashMap<String, String>>;

    // -- Integrity -----------------------------------------------------------

    /// Rebuilds the blocked cache and label counts from base tables.
    /// Returns the number of cache rows that had drifted.
    fn rebuild_caches(&self) -> Result<usize>;

    // -- Transactions --------------------------------------------------------

    /// Executes a closure within a database transaction. Commit on `Ok`,
    /// rollback on `Err`.
    fn run_in_transaction(&self, f: &dyn Fn(&dyn Transaction) -> Result<()>) -> Result<()>;

    // -- Lifecycle -----------------------------------------------------------

    /// Closes the backend and releases resources.
    fn close(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Transaction trait
// ---------------------------------------------------------------------------

/// Subset of [`Storage`] methods available inside a transaction.
///
/// All operations share a single connection and commit or roll back
/// atomically.
pub trait Transaction {
    fn create_issue(&self, issue: &Issue, actor: &str) -> Result<()>;
    fn update_issue(&self, id: &str, updates: &IssueUpdates, actor: &str) -> Result<Issue>;
    fn close_issue(&self, id: &str, reason: &str, actor: &str, session: &str) -> Result<()>;
    fn get_issue(&self, id: &str) -> Result<Issue>;

    fn add_dependency(&self, dep: &Dependency, actor: &str) -> Result<()>;
    fn remove_dependency(&self, issue_id: &str, depends_on_id: &str, actor: &str) -> Result<()>;
    fn get_dependency_records(&self, issue_id: &str) -> Result<Vec<Dependency>>;

    fn add_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<()>;
    fn remove_label(&self, issue_id: &str, label: &str, actor: &str) -> Result<()>;
    fn get_labels(&self, issue_id: &str) -> Result<Vec<String>>;

    fn add_comment(&self, issue_id: &str, author: &str, text: &str) -> Result<Comment>;

    /// Imports a comment with an explicit timestamp (federation import).
    fn import_comment(
        &self,
        issue_id: &str,
        author: &str,
        text: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Comment>;

    fn inbox_push(&self, msg: &InboxMessage) -> Result<bool>;

    fn set_config(&self, key: &str, value: &str) -> Result<()>;
    fn get_config(&self, key: &str) -> Result<String>;
    fn set_metadata(&self, key: &str, value: &str) -> Result<()>;
    fn get_metadata(&self, key: &str) -> Result<String>;
}
