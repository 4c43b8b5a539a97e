//! Issue CRUD operations for [`SqliteStore`].

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

use beads_core::content_hash::compute_content_hash;
use beads_core::enums::{EventType, IssueType, Status};
use beads_core::filter::IssueFilter;
use beads_core::issue::Issue;
use beads_core::validation;

use crate::batch::placeholders;
use crate::error::{Result, StorageError};
use crate::sqlite::cache;
use crate::sqlite::store::SqliteStore;
use crate::traits::IssueUpdates;

// ---------------------------------------------------------------------------
// Column list (shared between INSERT and SELECT)
// ---------------------------------------------------------------------------

/// All issue columns in a deterministic order for SELECT queries.
pub(crate) const ISSUE_COLUMNS: &str = r#"
    id, content_hash, title, description, status, priority, issue_type,
    assignee, created_at, created_by, updated_at, closed_at, close_reason,
    metadata, source_repo, source_formula, is_template
"#;

/// Same as [`ISSUE_COLUMNS`] but prefixed with `issues.` for JOIN queries.
pub(crate) const ISSUE_COLUMNS_PREFIXED: &str = r#"
    issues.id, issues.content_hash, issues.title, issues.description,
    issues.status, issues.priority, issues.issue_type, issues.assignee,
    issues.created_at, issues.created_by, issues.updated_at, issues.closed_at,
    issues.close_reason, issues.metadata, issues.source_repo,
    issues.source_formula, issues.is_template
"#;

// ---------------------------------------------------------------------------
// Row scanning
// ---------------------------------------------------------------------------

/// Deserialises a row into an [`Issue`]. Column order must match
/// [`ISSUE_COLUMNS`].
pub(crate) fn scan_issue(row: &Row<'_>) -> rusqlite::Result<Issue> {
    let created_at_str: String = row.get("created_at")?;
    let updated_at_str: String = row.get("updated_at")?;
    let closed_at_str: Option<String> = row.get("closed_at")?;
    let status_str: String = row.get("status")?;
    let issue_type_str: String = row.get("issue_type")?;
    let metadata_str: String = row.get("metadata")?;
    let is_template_int: i32 = row.get("is_template")?;

    let metadata = if metadata_str.is_empty() || metadata_str == "{}" {
        None
    } else {
        serde_json::value::RawValue::from_string(metadata_str).ok()
    };

    Ok(Issue {
        id: row.get("id")?,
        content_hash: row.get("content_hash")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status: Status::from(status_str),
        priority: row.get("priority")?,
        issue_type: IssueType::from(issue_type_str),
        assignee: row.get("assignee")?,
        created_at: parse_datetime(&created_at_str),
        created_by: row.get("created_by")?,
        updated_at: parse_datetime(&updated_at_str),
        closed_at: closed_at_str.as_deref().map(parse_datetime),
        close_reason: row.get("close_reason")?,
        metadata,
        source_repo: row.get("source_repo")?,
        source_formula: row.get("source_formula")?,
        is_template: is_template_int != 0,
        labels: Vec::new(),
        dependencies: Vec::new(),
        comments: Vec::new(),
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Formats a `DateTime<Utc>` as ISO 8601 TEXT for SQLite.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Parses an ISO 8601 TEXT string from SQLite into a `DateTime<Utc>`.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    s.parse::<DateTime<Utc>>().unwrap_or_else(|_| {
        chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.fZ")
            .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ"))
            .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
            .map(|ndt| ndt.and_utc())
            .unwrap_or_else(|_| Utc::now())
    })
}

/// Maps busy/locked engine errors to the retryable `DatabaseLocked` kind.
pub(crate) fn map_engine_error(e: rusqlite::Error) -> StorageError {
    match &e {
        rusqlite::Error::SqliteFailure(inner, msg) => match inner.code {
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                StorageError::DatabaseLocked(msg.clone().unwrap_or_else(|| "busy".into()))
            }
            rusqlite::ErrorCode::OperationInterrupted => {
                StorageError::Timeout(std::time::Duration::from_secs(0))
            }
            _ => StorageError::Query(e),
        },
        _ => StorageError::Query(e),
    }
}

// ---------------------------------------------------------------------------
// Connection-level helpers (shared between SqliteStore and Transaction)
// ---------------------------------------------------------------------------

/// Inserts a single issue. Validates, computes the content hash, emits a
/// "created" event. Fails with `Duplicate` when the id exists.
pub(crate) fn insert_issue(conn: &Connection, issue: &Issue, actor: &str) -> Result<()> {
    if issue.id.is_empty() {
        return Err(StorageError::validation("issue id is required"));
    }
    validation::validate_for_import(issue, &[])
        .map_err(|e| StorageError::validation(e.to_string()))?;

    let exists: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM issues WHERE id = ?1)",
            params![issue.id],
            |row| row.get(0),
        )
        .map_err(map_engine_error)?;
    if exists {
        return Err(StorageError::duplicate("issue", &issue.id));
    }

    let now_str = format_datetime(&Utc::now());
    let content_hash = compute_content_hash(issue);
    let metadata_str = issue
        .metadata
        .as_ref()
        .map(|m| m.get().to_string())
        .unwrap_or_else(|| "{}".to_string());

    conn.execute(
        &format!(
            "INSERT INTO issues ({ISSUE_COLUMNS}) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17
            )"
        ),
        params![
            issue.id,
            content_hash,
            issue.title,
            issue.description,
            issue.status.as_str(),
            issue.priority,
            issue.issue_type.as_str(),
            issue.assignee,
            format_datetime(&issue.created_at),
            issue.created_by,
            format_datetime(&issue.updated_at),
            issue.closed_at.as_ref().map(format_datetime),
            issue.close_reason,
            metadata_str,
            issue.source_repo,
            issue.source_formula,
            issue.is_template as i32,
        ],
    )
    .map_err(map_engine_error)?;

    for label in &issue.labels {
        crate::sqlite::labels::add_label_row(conn, &issue.id, label)?;
    }

    emit_event(
        conn,
        &issue.id,
        EventType::Created,
        actor,
        None,
        None,
        None,
        &now_str,
    )?;

    Ok(())
}

/// Emits an event row into the append-only events table.
#[allow(clippy::too_many_arguments)]
pub(crate) fn emit_event(
    conn: &Connection,
    issue_id: &str,
    event_type: EventType,
    actor: &str,
    old_value: Option<&str>,
    new_value: Option<&str>,
    comment: Option<&str>,
    created_at: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO events (issue_id, event_type, actor, old_value, new_value, comment, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            issue_id,
            event_type.as_str(),
            actor,
            old_value,
            new_value,
            comment,
            created_at,
        ],
    )
    .map_err(map_engine_error)?;
    Ok(())
}

/// Retrieves a single issue by ID. Tombstones read as `NotFound`.
pub(crate) fn get_issue_on_conn(conn: &Connection, id: &str) -> Result<Issue> {
    let sql =
        format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE id = ?1 AND status != 'tombstone'");
    conn.query_row(&sql, params![id], scan_issue)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StorageError::not_found("issue", id),
            other => map_engine_error(other),
        })
}

/// Applies partial updates on the given connection. Returns the updated
/// issue.
pub(crate) fn update_issue_on_conn(
    conn: &Connection,
    id: &str,
    updates: &IssueUpdates,
    actor: &str,
) -> Result<Issue> {
    let before = get_issue_on_conn(conn, id)?;

    // Optimistic concurrency: a stale expectation is a cell-level conflict.
    if let Some(expected) = updates.expected_updated_at {
        if format_datetime(&expected) != format_datetime(&before.updated_at) {
            return Err(StorageError::conflict(
                "issue",
                id,
                format!(
                    "expected updated_at {}, found {}",
                    format_datetime(&expected),
                    format_datetime(&before.updated_at)
                ),
            ));
        }
    }
    if updates.is_empty() {
        return Ok(before);
    }
    if let Some(ref title) = updates.title {
        if title.trim().is_empty() {
            return Err(StorageError::validation("title is required"));
        }
        if title.len() > 500 {
            return Err(StorageError::validation(format!(
                "title must be 500 characters or less (got {})",
                title.len()
            )));
        }
    }

    let now = Utc::now();
    let now_str = format_datetime(&now);

    let mut set_clauses: Vec<String> = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    macro_rules! add_field {
        ($field:ident, $col:expr) => {
            if let Some(ref val) = updates.$field {
                set_clauses.push(format!("{} = ?", $col));
                param_values.push(Box::new(val.clone()));
            }
        };
    }

    add_field!(title, "title");
    add_field!(description, "description");
    add_field!(assignee, "assignee");
    add_field!(close_reason, "close_reason");
    add_field!(source_repo, "source_repo");
    add_field!(source_formula, "source_formula");

    if let Some(ref status) = updates.status {
        set_clauses.push("status = ?".to_string());
        param_values.push(Box::new(status.as_str().to_string()));
        if *status == Status::Closed && before.closed_at.is_none() {
            set_clauses.push("closed_at = ?".to_string());
            param_values.push(Box::new(now_str.clone()));
        }
        if *status != Status::Closed && *status != Status::Tombstone {
            set_clauses.push("closed_at = NULL".to_string());
        }
    }
    if let Some(ref issue_type) = updates.issue_type {
        set_clauses.push("issue_type = ?".to_string());
        param_values.push(Box::new(issue_type.as_str().to_string()));
    }
    if let Some(priority) = updates.priority {
        if !(0..=4).contains(&priority) {
            return Err(StorageError::validation(format!(
                "priority must be between 0 and 4 (got {priority})"
            )));
        }
        set_clauses.push("priority = ?".to_string());
        param_values.push(Box::new(priority));
    }
    if let Some(ref meta) = updates.metadata {
        set_clauses.push("metadata = ?".to_string());
        param_values.push(Box::new(meta.clone().unwrap_or_else(|| "{}".to_string())));
    }
    if let Some(is_template) = updates.is_template {
        set_clauses.push("is_template = ?".to_string());
        param_values.push(Box::new(is_template as i32));
    }

    set_clauses.push("updated_at = ?".to_string());
    param_values.push(Box::new(now_str.clone()));

    let sql = format!("UPDATE issues SET {} WHERE id = ?", set_clauses.join(", "));
    param_values.push(Box::new(id.to_string()));

    let param_refs: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    conn.execute(&sql, param_refs.as_slice())
        .map_err(map_engine_error)?;

    // The content hash tracks substantive fields; recompute after the write.
    let mut after = get_issue_on_conn(conn, id)?;
    let new_hash = compute_content_hash(&after);
    conn.execute(
        "UPDATE issues SET content_hash = ?1 WHERE id = ?2",
        params![new_hash, id],
    )
    .map_err(map_engine_error)?;
    after.content_hash = new_hash;

    // One event per logical change: a status transition is its own event.
    if let Some(ref status) = updates.status {
        if *status != before.status {
            emit_event(
                conn,
                id,
                EventType::StatusChanged,
                actor,
                Some(before.status.as_str()),
                Some(status.as_str()),
                None,
                &now_str,
            )?;
            // Readiness can ripple both ways on a status change.
            cache::refresh_for_issue(conn, id)?;
            cache::refresh_for_dependents(conn, id)?;
        }
    }
    emit_event(conn, id, EventType::Updated, actor, None, None, None, &now_str)?;

    Ok(after)
}

/// Closes an issue on the given connection.
pub(crate) fn close_issue_on_conn(
    conn: &Connection,
    id: &str,
    reason: &str,
    actor: &str,
    session: &str,
) -> Result<()> {
    let now_str = format_datetime(&Utc::now());

    let affected = conn
        .execute(
            "UPDATE issues SET status = 'closed', closed_at = ?1, close_reason = ?2,
             updated_at = ?1 WHERE id = ?3 AND status != 'tombstone'",
            params![now_str, reason, id],
        )
        .map_err(map_engine_error)?;
    if affected == 0 {
        return Err(StorageError::not_found("issue", id));
    }

    // Recompute hash: status and close_reason are substantive fields.
    let issue = get_issue_on_conn(conn, id)?;
    conn.execute(
        "UPDATE issues SET content_hash = ?1 WHERE id = ?2",
        params![compute_content_hash(&issue), id],
    )
    .map_err(map_engine_error)?;

    emit_event(
        conn,
        id,
        EventType::Closed,
        actor,
        None,
        Some(reason),
        if session.is_empty() { None } else { Some(session) },
        &now_str,
    )?;

    // The closed issue no longer blocks anyone, and is itself not blocked.
    cache::refresh_for_issue(conn, id)?;
    cache::refresh_for_dependents(conn, id)?;

    Ok(())
}

/// Reopens a closed issue.
pub(crate) fn reopen_issue_on_conn(conn: &Connection, id: &str, actor: &str) -> Result<()> {
    let before = get_issue_on_conn(conn, id)?;
    if before.status != Status::Closed {
        return Err(StorageError::validation(format!(
            "issue {id} is not closed (status: {})",
            before.status
        )));
    }

    let now_str = format_datetime(&Utc::now());
    conn.execute(
        "UPDATE issues SET status = 'open', closed_at = NULL, close_reason = '',
         updated_at = ?1 WHERE id = ?2",
        params![now_str, id],
    )
    .map_err(map_engine_error)?;

    let issue = get_issue_on_conn(conn, id)?;
    conn.execute(
        "UPDATE issues SET content_hash = ?1 WHERE id = ?2",
        params![compute_content_hash(&issue), id],
    )
    .map_err(map_engine_error)?;

    emit_event(
        conn,
        id,
        EventType::Reopened,
        actor,
        Some("closed"),
        Some("open"),
        None,
        &now_str,
    )?;

    cache::refresh_for_issue(conn, id)?;
    cache::refresh_for_dependents(conn, id)?;

    Ok(())
}

/// Tombstones an issue. Tombstones never re-appear in any query.
pub(crate) fn tombstone_issue_on_conn(conn: &Connection, id: &str, actor: &str) -> Result<()> {
    let now_str = format_datetime(&Utc::now());
    let affected = conn
        .execute(
            "UPDATE issues SET status = 'tombstone', updated_at = ?1 WHERE id = ?2",
            params![now_str, id],
        )
        .map_err(map_engine_error)?;
    if affected == 0 {
        return Err(StorageError::not_found("issue", id));
    }

    emit_event(
        conn,
        id,
        EventType::Tombstoned,
        actor,
        None,
        None,
        None,
        &now_str,
    )?;

    // Orphaned edges pointing at a tombstone count as satisfied.
    cache::refresh_for_issue(conn, id)?;
    cache::refresh_for_dependents(conn, id)?;

    Ok(())
}

/// Lists issues matching a filter, cursor-paginated by id.
pub(crate) fn list_issues_on_conn(conn: &Connection, filter: &IssueFilter) -> Result<Vec<Issue>> {
    let mut where_clauses: Vec<String> = vec!["status != 'tombstone'".to_string()];
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut param_idx = 1;

    if !filter.include_closed && filter.status.is_none() {
        where_clauses.push("status != 'closed'".to_string());
    }
    if !filter.include_templates {
        where_clauses.push("is_template = 0".to_string());
    }
    if let Some(ref status) = filter.status {
        where_clauses.push(format!("status = ?{param_idx}"));
        param_values.push(Box::new(status.as_str().to_string()));
        param_idx += 1;
    }
    if let Some(priority) = filter.priority {
        where_clauses.push(format!("priority = ?{param_idx}"));
        param_values.push(Box::new(priority));
        param_idx += 1;
    }
    if let Some(ref issue_type) = filter.issue_type {
        where_clauses.push(format!("issue_type = ?{param_idx}"));
        param_values.push(Box::new(issue_type.as_str().to_string()));
        param_idx += 1;
    }
    if let Some(ref assignee) = filter.assignee {
        where_clauses.push(format!("assignee = ?{param_idx}"));
        param_values.push(Box::new(assignee.clone()));
        param_idx += 1;
    }
    if let Some(ref text) = filter.text {
        where_clauses.push(format!(
            "(title LIKE ?{pi} OR description LIKE ?{pi})",
            pi = param_idx
        ));
        param_values.push(Box::new(format!("%{text}%")));
        param_idx += 1;
    }
    if let Some(ref created_after) = filter.created_after {
        where_clauses.push(format!("created_at >= ?{param_idx}"));
        param_values.push(Box::new(format_datetime(created_after)));
        param_idx += 1;
    }
    if let Some(ref updated_after) = filter.updated_after {
        where_clauses.push(format!("updated_at >= ?{param_idx}"));
        param_values.push(Box::new(format_datetime(updated_after)));
        param_idx += 1;
    }
    if let Some(ref source_repo) = filter.source_repo {
        where_clauses.push(format!("source_repo = ?{param_idx}"));
        param_values.push(Box::new(source_repo.clone()));
        param_idx += 1;
    }
    if let Some(ref after_id) = filter.after_id {
        where_clauses.push(format!("id > ?{param_idx}"));
        param_values.push(Box::new(after_id.clone()));
        param_idx += 1;
    }
    if !filter.ids.is_empty() {
        where_clauses.push(format!(
            "id IN ({})",
            placeholders(filter.ids.len(), param_idx)
        ));
        for id in &filter.ids {
            param_values.push(Box::new(id.clone()));
        }
        param_idx += filter.ids.len();
    }

    // Labels AND.
    for label in &filter.labels {
        where_clauses.push(format!(
            "EXISTS (SELECT 1 FROM labels WHERE labels.issue_id = issues.id AND labels.label = ?{param_idx})"
        ));
        param_values.push(Box::new(label.clone()));
        param_idx += 1;
    }
    // Labels OR.
    if !filter.labels_any.is_empty() {
        where_clauses.push(format!(
            "EXISTS (SELECT 1 FROM labels WHERE labels.issue_id = issues.id AND labels.label IN ({}))",
            placeholders(filter.labels_any.len(), param_idx)
        ));
        for label in &filter.labels_any {
            param_values.push(Box::new(label.clone()));
        }
        param_idx += filter.labels_any.len();
    }

    let limit_sql = filter
        .limit
        .map(|l| format!(" LIMIT {l}"))
        .unwrap_or_default();
    let sql = format!(
        "SELECT {ISSUE_COLUMNS} FROM issues WHERE {} ORDER BY id ASC{limit_sql}",
        where_clauses.join(" AND ")
    );

    let param_refs: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&sql).map_err(map_engine_error)?;
    let rows = stmt
        .query_map(param_refs.as_slice(), scan_issue)
        .map_err(map_engine_error)?;

    let mut issues = Vec::new();
    for row in rows {
        issues.push(row.map_err(map_engine_error)?);
    }

    let _ = param_idx;
    Ok(issues)
}

// ---------------------------------------------------------------------------
// SqliteStore issue methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    /// Runs a write group atomically on a fresh transaction.
    pub(crate) fn with_tx<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StorageError::Transaction(format!("failed to begin: {e}")))?;
        let value = f(&tx)?;
        tx.commit()
            .map_err(|e| StorageError::Transaction(format!("failed to commit: {e}")))?;
        Ok(value)
    }

    pub fn create_issue_impl(&self, issue: &Issue, actor: &str) -> Result<()> {
        self.with_tx(|conn| insert_issue(conn, issue, actor))
    }

    pub fn create_issues_impl(&self, issues: &[Issue], actor: &str) -> Result<()> {
        self.with_tx(|conn| {
            for issue in issues {
                insert_issue(conn, issue, actor)?;
            }
            Ok(())
        })
    }

    pub fn get_issue_impl(&self, id: &str) -> Result<Issue> {
        let conn = self.lock_conn()?;
        get_issue_on_conn(&conn, id)
    }

    pub fn get_issues_by_ids_impl(&self, ids: &[String]) -> Result<Vec<Issue>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.lock_conn()?;
        let mut issues = Vec::new();
        // IN-clauses stay under the batching ceiling.
        for chunk in crate::batch::id_chunks(ids) {
            let sql = format!(
                "SELECT {ISSUE_COLUMNS} FROM issues
                 WHERE status != 'tombstone' AND id IN ({})",
                placeholders(chunk.len(), 1)
            );
            let mut stmt = conn.prepare(&sql).map_err(map_engine_error)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(chunk.iter()), scan_issue)
                .map_err(map_engine_error)?;
            for row in rows {
                issues.push(row.map_err(map_engine_error)?);
            }
        }
        Ok(issues)
    }

    pub fn update_issue_impl(
        &self,
        id: &str,
        updates: &IssueUpdates,
        actor: &str,
    ) -> Result<Issue> {
        self.with_tx(|conn| update_issue_on_conn(conn, id, updates, actor))
    }

    pub fn close_issue_impl(
        &self,
        id: &str,
        reason: &str,
        actor: &str,
        session: &str,
    ) -> Result<()> {
        self.with_tx(|conn| close_issue_on_conn(conn, id, reason, actor, session))
    }

    pub fn reopen_issue_impl(&self, id: &str, actor: &str) -> Result<()> {
        self.with_tx(|conn| reopen_issue_on_conn(conn, id, actor))
    }

    pub fn tombstone_issue_impl(&self, id: &str, actor: &str) -> Result<()> {
        self.with_tx(|conn| tombstone_issue_on_conn(conn, id, actor))
    }

    pub fn list_issues_impl(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        let conn = self.lock_conn()?;
        let _watchdog = self.arm_watchdog(&conn);
        list_issues_on_conn(&conn, filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;

    fn test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn create_and_get_issue() {
        let store = test_store();
        let issue = IssueBuilder::new("Test issue")
            .id("bd-test1")
            .description("A test description")
            .priority(2)
            .build();

        store.create_issue_impl(&issue, "mayor").unwrap();

        let got = store.get_issue_impl("bd-test1").unwrap();
        assert_eq!(got.title, "Test issue");
        assert_eq!(got.description, "A test description");
        assert_eq!(got.priority, 2);
        assert!(!got.content_hash.is_empty());
    }

    #[test]
    fn duplicate_id_rejected() {
        let store = test_store();
        let issue = IssueBuilder::new("First").id("bd-dup1").build();
        store.create_issue_impl(&issue, "mayor").unwrap();

        let again = IssueBuilder::new("Second").id("bd-dup1").build();
        let err = store.create_issue_impl(&again, "mayor").unwrap_err();
        assert!(matches!(err, StorageError::Duplicate { .. }));
    }

    #[test]
    fn get_nonexistent_issue_returns_not_found() {
        let store = test_store();
        let err = store.get_issue_impl("bd-nope").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn update_issue_partial() {
        let store = test_store();
        let issue = IssueBuilder::new("Original title").id("bd-upd1").build();
        store.create_issue_impl(&issue, "mayor").unwrap();

        let updates = IssueUpdates {
            title: Some("Updated title".into()),
            priority: Some(3),
            ..Default::default()
        };
        let after = store.update_issue_impl("bd-upd1", &updates, "bob").unwrap();
        assert_eq!(after.title, "Updated title");
        assert_eq!(after.priority, 3);
    }

    #[test]
    fn update_changes_content_hash() {
        let store = test_store();
        let issue = IssueBuilder::new("Hash me").id("bd-hash1").build();
        store.create_issue_impl(&issue, "mayor").unwrap();
        let before = store.get_issue_impl("bd-hash1").unwrap();

        let updates = IssueUpdates {
            description: Some("new text".into()),
            ..Default::default()
        };
        let after = store.update_issue_impl("bd-hash1", &updates, "mayor").unwrap();
        assert_ne!(before.content_hash, after.content_hash);
    }

    #[test]
    fn stale_expected_version_conflicts() {
        let store = test_store();
        let issue = IssueBuilder::new("Contended").id("bd-ver1").build();
        store.create_issue_impl(&issue, "mayor").unwrap();

        let stale = Utc::now() - chrono::Duration::hours(1);
        let updates = IssueUpdates {
            title: Some("Rewritten".into()),
            expected_updated_at: Some(stale),
            ..Default::default()
        };
        let err = store.update_issue_impl("bd-ver1", &updates, "bob").unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[test]
    fn close_issue_sets_fields() {
        let store = test_store();
        let issue = IssueBuilder::new("To close").id("bd-close1").build();
        store.create_issue_impl(&issue, "mayor").unwrap();

        store
            .close_issue_impl("bd-close1", "completed", "mayor", "session-1")
            .unwrap();

        let got = store.get_issue_impl("bd-close1").unwrap();
        assert_eq!(got.status, Status::Closed);
        assert!(got.closed_at.is_some());
        assert_eq!(got.close_reason, "completed");
    }

    #[test]
    fn reopen_issue() {
        let store = test_store();
        let issue = IssueBuilder::new("Cycle me").id("bd-ro1").build();
        store.create_issue_impl(&issue, "mayor").unwrap();
        store.close_issue_impl("bd-ro1", "done", "mayor", "").unwrap();
        store.reopen_issue_impl("bd-ro1", "mayor").unwrap();

        let got = store.get_issue_impl("bd-ro1").unwrap();
        assert_eq!(got.status, Status::Open);
        assert!(got.closed_at.is_none());
    }

    #[test]
    fn reopen_open_issue_fails() {
        let store = test_store();
        let issue = IssueBuilder::new("Open").id("bd-ro2").build();
        store.create_issue_impl(&issue, "mayor").unwrap();
        let err = store.reopen_issue_impl("bd-ro2", "mayor").unwrap_err();
        assert!(matches!(err, StorageError::Validation { .. }));
    }

    #[test]
    fn tombstone_disappears_from_queries() {
        let store = test_store();
        let issue = IssueBuilder::new("Ghost").id("bd-ts1").build();
        store.create_issue_impl(&issue, "mayor").unwrap();
        store.tombstone_issue_impl("bd-ts1", "mayor").unwrap();

        assert!(store.get_issue_impl("bd-ts1").unwrap_err().is_not_found());
        let all = store.list_issues_impl(&IssueFilter::default()).unwrap();
        assert!(all.is_empty());
        assert!(store.get_issues_by_ids_impl(&["bd-ts1".into()]).unwrap().is_empty());
    }

    #[test]
    fn list_filters_and_cursor() {
        let store = test_store();
        for (id, title) in [("bd-a", "alpha"), ("bd-b", "beta"), ("bd-c", "gamma")] {
            let issue = IssueBuilder::new(title).id(id).build();
            store.create_issue_impl(&issue, "mayor").unwrap();
        }

        let all = store.list_issues_impl(&IssueFilter::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, "bd-a"); // id-ordered

        let filter = IssueFilter {
            after_id: Some("bd-a".into()),
            limit: Some(1),
            ..Default::default()
        };
        let page = store.list_issues_impl(&filter).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "bd-b");

        let filter = IssueFilter {
            text: Some("gam".into()),
            ..Default::default()
        };
        let found = store.list_issues_impl(&filter).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "bd-c");
    }

    #[test]
    fn list_excludes_templates_by_default() {
        let store = test_store();
        let template = IssueBuilder::new("Template")
            .id("bd-tpl")
            .is_template(true)
            .build();
        store.create_issue_impl(&template, "mayor").unwrap();

        assert!(store.list_issues_impl(&IssueFilter::default()).unwrap().is_empty());
        let filter = IssueFilter {
            include_templates: true,
            ..Default::default()
        };
        assert_eq!(store.list_issues_impl(&filter).unwrap().len(), 1);
    }

    #[test]
    fn batched_lookup_over_20_ids() {
        let store = test_store();
        let mut ids = Vec::new();
        for i in 0..45 {
            let id = format!("bd-n{i:02}");
            let issue = IssueBuilder::new(format!("Issue {i}")).id(id.as_str()).build();
            store.create_issue_impl(&issue, "mayor").unwrap();
            ids.push(id);
        }
        let got = store.get_issues_by_ids_impl(&ids).unwrap();
        assert_eq!(got.len(), 45);
    }
}
