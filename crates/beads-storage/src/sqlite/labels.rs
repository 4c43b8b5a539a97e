//! Label CRUD operations for [`SqliteStore`].

use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{Connection, params};

use beads_core::comment::normalize_label;
use beads_core::enums::EventType;

use crate::batch::{id_chunks, placeholders};
use crate::error::{Result, StorageError};
use crate::sqlite::cache;
use crate::sqlite::issues::{emit_event, format_datetime, map_engine_error};
use crate::sqlite::store::SqliteStore;

// ---------------------------------------------------------------------------
// Connection-level helpers (shared with Transaction)
// ---------------------------------------------------------------------------

/// Inserts a label row and bumps the derived count; no event.
pub(crate) fn add_label_row(conn: &Connection, issue_id: &str, label: &str) -> Result<()> {
    let label = normalize_label(label);
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO labels (issue_id, label) VALUES (?1, ?2)",
            params![issue_id, label],
        )
        .map_err(map_engine_error)?;
    if inserted > 0 {
        cache::bump_label_count(conn, &label, 1)?;
    }
    Ok(())
}

pub(crate) fn add_label_on_conn(
    conn: &Connection,
    issue_id: &str,
    label: &str,
    actor: &str,
) -> Result<()> {
    let label = normalize_label(label);
    let now_str = format_datetime(&Utc::now());

    add_label_row(conn, issue_id, &label)?;
    emit_event(
        conn,
        issue_id,
        EventType::LabelAdded,
        actor,
        None,
        Some(&label),
        None,
        &now_str,
    )?;
    Ok(())
}

pub(crate) fn remove_label_on_conn(
    conn: &Connection,
    issue_id: &str,
    label: &str,
    actor: &str,
) -> Result<()> {
    let label = normalize_label(label);
    let now_str = format_datetime(&Utc::now());

    let affected = conn
        .execute(
            "DELETE FROM labels WHERE issue_id = ?1 AND label = ?2",
            params![issue_id, label],
        )
        .map_err(map_engine_error)?;
    if affected == 0 {
        return Err(StorageError::not_found(
            "label",
            format!("{issue_id}:{label}"),
        ));
    }
    cache::bump_label_count(conn, &label, -1)?;

    emit_event(
        conn,
        issue_id,
        EventType::LabelRemoved,
        actor,
        Some(&label),
        None,
        None,
        &now_str,
    )?;
    Ok(())
}

pub(crate) fn get_labels_on_conn(conn: &Connection, issue_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT label FROM labels WHERE issue_id = ?1 ORDER BY label")
        .map_err(map_engine_error)?;
    let rows = stmt
        .query_map(params![issue_id], |row| row.get::<_, String>(0))
        .map_err(map_engine_error)?;
    let mut labels = Vec::new();
    for row in rows {
        labels.push(row.map_err(map_engine_error)?);
    }
    Ok(labels)
}

// ---------------------------------------------------------------------------
// SqliteStore methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    pub fn add_label_impl(&self, issue_id: &str, label: &str, actor: &str) -> Result<()> {
        self.with_tx(|conn| add_label_on_conn(conn, issue_id, label, actor))
    }

    pub fn remove_label_impl(&self, issue_id: &str, label: &str, actor: &str) -> Result<()> {
        self.with_tx(|conn| remove_label_on_conn(conn, issue_id, label, actor))
    }

    pub fn get_labels_impl(&self, issue_id: &str) -> Result<Vec<String>> {
        let conn = self.lock_conn()?;
        get_labels_on_conn(&conn, issue_id)
    }

    /// Returns labels for many issues at once, batching IN-clauses to the
    /// hard ceiling. A single unbounded IN is never issued.
    pub fn get_labels_for_issues_impl(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, Vec<String>>> {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        if ids.is_empty() {
            return Ok(map);
        }
        let conn = self.lock_conn()?;
        for chunk in id_chunks(ids) {
            let sql = format!(
                "SELECT issue_id, label FROM labels WHERE issue_id IN ({}) ORDER BY label",
                placeholders(chunk.len(), 1)
            );
            let mut stmt = conn.prepare(&sql).map_err(map_engine_error)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(map_engine_error)?;
            for row in rows {
                let (issue_id, label) = row.map_err(map_engine_error)?;
                map.entry(issue_id).or_default().push(label);
            }
        }
        Ok(map)
    }

    /// Returns `(label, count)` pairs from the derived counts table.
    pub fn label_counts_impl(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare("SELECT label, count FROM label_counts ORDER BY count DESC, label ASC")
            .map_err(map_engine_error)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(map_engine_error)?;
        let mut counts = Vec::new();
        for row in rows {
            counts.push(row.map_err(map_engine_error)?);
        }
        Ok(counts)
    }
}
