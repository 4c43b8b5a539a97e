//! Dependency CRUD operations and cycle detection for [`SqliteStore`].

use std::collections::{HashSet, VecDeque};

use chrono::Utc;
use rusqlite::{Connection, params};

use beads_core::dependency::Dependency;
use beads_core::enums::{DependencyType, EventType};
use beads_core::issue::Issue;

use crate::error::{Result, StorageError};
use crate::sqlite::cache;
use crate::sqlite::issues::{
    ISSUE_COLUMNS_PREFIXED, emit_event, format_datetime, map_engine_error, parse_datetime,
    scan_issue,
};
use crate::sqlite::store::SqliteStore;

// ---------------------------------------------------------------------------
// Connection-level helpers
// ---------------------------------------------------------------------------

/// Inserts a dependency edge with cycle detection for structural types, then
/// refreshes the blocked cache for the source issue.
pub(crate) fn add_dependency_on_conn(conn: &Connection, dep: &Dependency, actor: &str) -> Result<()> {
    if dep.issue_id == dep.depends_on_id {
        return Err(StorageError::validation("an issue cannot depend on itself"));
    }

    // Both endpoints must exist (tombstones count as absent).
    for id in [&dep.issue_id, &dep.depends_on_id] {
        crate::sqlite::issues::get_issue_on_conn(conn, id)?;
    }

    if dep.dep_type.is_structural() {
        detect_cycle(conn, &dep.issue_id, &dep.depends_on_id)?;
    }

    let now_str = format_datetime(&Utc::now());
    conn.execute(
        "INSERT OR REPLACE INTO dependencies
         (issue_id, depends_on_id, type, created_at, created_by)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            dep.issue_id,
            dep.depends_on_id,
            dep.dep_type.as_str(),
            format_datetime(&dep.created_at),
            dep.created_by,
        ],
    )
    .map_err(map_engine_error)?;

    emit_event(
        conn,
        &dep.issue_id,
        EventType::DependencyAdded,
        actor,
        None,
        Some(&dep.depends_on_id),
        Some(dep.dep_type.as_str()),
        &now_str,
    )?;

    if dep.dep_type.affects_ready_work() {
        cache::refresh_for_issue(conn, &dep.issue_id)?;
    }

    Ok(())
}

/// Removes a dependency edge and refreshes the blocked cache.
pub(crate) fn remove_dependency_on_conn(
    conn: &Connection,
    issue_id: &str,
    depends_on_id: &str,
    actor: &str,
) -> Result<()> {
    let now_str = format_datetime(&Utc::now());

    let affected = conn
        .execute(
            "DELETE FROM dependencies WHERE issue_id = ?1 AND depends_on_id = ?2",
            params![issue_id, depends_on_id],
        )
        .map_err(map_engine_error)?;
    if affected == 0 {
        return Err(StorageError::not_found(
            "dependency",
            format!("{issue_id} -> {depends_on_id}"),
        ));
    }

    emit_event(
        conn,
        issue_id,
        EventType::DependencyRemoved,
        actor,
        Some(depends_on_id),
        None,
        None,
        &now_str,
    )?;

    cache::refresh_for_issue(conn, issue_id)?;

    Ok(())
}

/// Returns raw dependency records for an issue.
pub(crate) fn get_dependency_records_on_conn(
    conn: &Connection,
    issue_id: &str,
) -> Result<Vec<Dependency>> {
    let mut stmt = conn
        .prepare(
            "SELECT issue_id, depends_on_id, type, created_at, created_by
             FROM dependencies WHERE issue_id = ?1",
        )
        .map_err(map_engine_error)?;
    let rows = stmt
        .query_map(params![issue_id], |row| {
            Ok(Dependency {
                issue_id: row.get("issue_id")?,
                depends_on_id: row.get("depends_on_id")?,
                dep_type: DependencyType::from(row.get::<_, String>("type")?),
                created_at: parse_datetime(&row.get::<_, String>("created_at")?),
                created_by: row.get("created_by")?,
            })
        })
        .map_err(map_engine_error)?;

    let mut deps = Vec::new();
    for row in rows {
        deps.push(row.map_err(map_engine_error)?);
    }
    Ok(deps)
}

// ---------------------------------------------------------------------------
// Cycle detection
// ---------------------------------------------------------------------------

/// Rejects an edge `issue_id -> depends_on_id` that would close a cycle in
/// the structural dependency graph. BFS from `depends_on_id`; if `issue_id`
/// is reachable, the edge is rejected and the graph is left unchanged.
fn detect_cycle(conn: &Connection, issue_id: &str, depends_on_id: &str) -> Result<()> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    queue.push_back(depends_on_id.to_string());

    while let Some(current) = queue.pop_front() {
        if current == issue_id {
            return Err(StorageError::CycleDetected);
        }
        if !visited.insert(current.clone()) {
            continue;
        }
        let mut stmt = conn
            .prepare_cached(
                "SELECT depends_on_id FROM dependencies
                 WHERE issue_id = ?1 AND type IN ('blocks', 'parent-child')",
            )
            .map_err(map_engine_error)?;
        let rows = stmt
            .query_map(params![current], |row| row.get::<_, String>(0))
            .map_err(map_engine_error)?;
        for row in rows {
            let next = row.map_err(map_engine_error)?;
            if !visited.contains(&next) {
                queue.push_back(next);
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// SqliteStore methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    pub fn add_dependency_impl(&self, dep: &Dependency, actor: &str) -> Result<()> {
        self.with_tx(|conn| add_dependency_on_conn(conn, dep, actor))
    }

    pub fn remove_dependency_impl(
        &self,
        issue_id: &str,
        depends_on_id: &str,
        actor: &str,
    ) -> Result<()> {
        self.with_tx(|conn| remove_dependency_on_conn(conn, issue_id, depends_on_id, actor))
    }

    pub fn get_dependencies_impl(&self, issue_id: &str) -> Result<Vec<Issue>> {
        let conn = self.lock_conn()?;
        let sql = format!(
            "SELECT {ISSUE_COLUMNS_PREFIXED} FROM issues
             INNER JOIN dependencies d ON issues.id = d.depends_on_id
             WHERE d.issue_id = ?1 AND issues.status != 'tombstone'"
        );
        let mut stmt = conn.prepare(&sql).map_err(map_engine_error)?;
        let rows = stmt
            .query_map(params![issue_id], scan_issue)
            .map_err(map_engine_error)?;
        let mut issues = Vec::new();
        for row in rows {
            issues.push(row.map_err(map_engine_error)?);
        }
        Ok(issues)
    }

    pub fn get_dependents_impl(&self, issue_id: &str) -> Result<Vec<Issue>> {
        let conn = self.lock_conn()?;
        let sql = format!(
            "SELECT {ISSUE_COLUMNS_PREFIXED} FROM issues
             INNER JOIN dependencies d ON issues.id = d.issue_id
             WHERE d.depends_on_id = ?1 AND issues.status != 'tombstone'"
        );
        let mut stmt = conn.prepare(&sql).map_err(map_engine_error)?;
        let rows = stmt
            .query_map(params![issue_id], scan_issue)
            .map_err(map_engine_error)?;
        let mut issues = Vec::new();
        for row in rows {
            issues.push(row.map_err(map_engine_error)?);
        }
        Ok(issues)
    }

    pub fn get_dependency_records_impl(&self, issue_id: &str) -> Result<Vec<Dependency>> {
        let conn = self.lock_conn()?;
        get_dependency_records_on_conn(&conn, issue_id)
    }

    /// Ids of open issues blocked (via `blocks`) on the given issue. Used by
    /// the daemon's close-safety policy.
    pub fn open_blocking_dependents_impl(&self, issue_id: &str) -> Result<Vec<String>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT d.issue_id FROM dependencies d
                 JOIN issues i ON i.id = d.issue_id
                 WHERE d.depends_on_id = ?1
                   AND d.type = 'blocks'
                   AND i.status IN ('open', 'in_progress', 'blocked')
                 ORDER BY d.issue_id",
            )
            .map_err(map_engine_error)?;
        let rows = stmt
            .query_map(params![issue_id], |row| row.get::<_, String>(0))
            .map_err(map_engine_error)?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.map_err(map_engine_error)?);
        }
        Ok(ids)
    }
}
