//! Inbox operations for [`SqliteStore`].
//!
//! The inbox is the authoritative tier of the three-tier delivery pipeline.
//! Rows stay after delivery (with `delivered_at` set) for audit; a reaper
//! trims delivered+expired rows past the retention window.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

use beads_core::inbox::InboxMessage;

use crate::batch::{id_chunks, placeholders};
use crate::error::Result;
use crate::sqlite::issues::{format_datetime, map_engine_error, parse_datetime};
use crate::sqlite::store::SqliteStore;

const INBOX_COLUMNS: &str = "id, agent_name, rig, session_id, msg_type, source, content, \
                             priority, created_at, delivered_at, expires_at, dedup_key";

fn scan_message(row: &Row<'_>) -> rusqlite::Result<InboxMessage> {
    let created_at_str: String = row.get("created_at")?;
    let delivered_at_str: Option<String> = row.get("delivered_at")?;
    let expires_at_str: Option<String> = row.get("expires_at")?;
    Ok(InboxMessage {
        id: row.get("id")?,
        agent_name: row.get("agent_name")?,
        rig: row.get("rig")?,
        session_id: row.get("session_id")?,
        msg_type: row.get("msg_type")?,
        source: row.get("source")?,
        content: row.get("content")?,
        priority: row.get("priority")?,
        created_at: parse_datetime(&created_at_str),
        delivered_at: delivered_at_str.as_deref().map(parse_datetime),
        expires_at: expires_at_str.as_deref().map(parse_datetime),
        dedup_key: row.get("dedup_key")?,
    })
}

// ---------------------------------------------------------------------------
// Connection-level helpers (shared with Transaction)
// ---------------------------------------------------------------------------

/// Inserts a message. Duplicate `dedup_key` is a silent no-op. Returns
/// `true` when a row was actually inserted.
pub(crate) fn inbox_push_on_conn(conn: &Connection, msg: &InboxMessage) -> Result<bool> {
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO inbox
             (agent_name, rig, session_id, msg_type, source, content, priority,
              created_at, delivered_at, expires_at, dedup_key)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                msg.agent_name,
                msg.rig,
                msg.session_id,
                msg.msg_type,
                msg.source,
                msg.content,
                msg.priority,
                format_datetime(&msg.created_at),
                msg.delivered_at.as_ref().map(format_datetime),
                msg.expires_at.as_ref().map(format_datetime),
                msg.dedup_key,
            ],
        )
        .map_err(map_engine_error)?;
    Ok(inserted > 0)
}

// ---------------------------------------------------------------------------
// SqliteStore methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    pub fn inbox_push_impl(&self, msg: &InboxMessage) -> Result<bool> {
        let conn = self.lock_conn()?;
        inbox_push_on_conn(&conn, msg)
    }

    /// Returns undelivered messages for an agent name, oldest first.
    pub fn inbox_undelivered_impl(&self, agent_name: &str) -> Result<Vec<InboxMessage>> {
        let conn = self.lock_conn()?;
        let sql = format!(
            "SELECT {INBOX_COLUMNS} FROM inbox
             WHERE agent_name = ?1 AND delivered_at IS NULL
             ORDER BY priority ASC, created_at ASC"
        );
        let mut stmt = conn.prepare(&sql).map_err(map_engine_error)?;
        let rows = stmt
            .query_map(params![agent_name], scan_message)
            .map_err(map_engine_error)?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row.map_err(map_engine_error)?);
        }
        Ok(messages)
    }

    pub fn inbox_mark_delivered_impl(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = self.lock_conn()?;
        let now_str = format_datetime(&Utc::now());
        for chunk in id_chunks(ids) {
            let sql = format!(
                "UPDATE inbox SET delivered_at = ?1 WHERE delivered_at IS NULL AND id IN ({})",
                placeholders(chunk.len(), 2)
            );
            let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> =
                vec![Box::new(now_str.clone())];
            for id in chunk {
                param_values.push(Box::new(*id));
            }
            let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                param_values.iter().map(|p| p.as_ref()).collect();
            conn.execute(&sql, param_refs.as_slice())
                .map_err(map_engine_error)?;
        }
        Ok(())
    }

    pub fn inbox_list_impl(&self, agent_name: &str, limit: i32) -> Result<Vec<InboxMessage>> {
        let conn = self.lock_conn()?;
        let sql = format!(
            "SELECT {INBOX_COLUMNS} FROM inbox
             WHERE agent_name = ?1
             ORDER BY created_at DESC LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql).map_err(map_engine_error)?;
        let rows = stmt
            .query_map(params![agent_name, limit], scan_message)
            .map_err(map_engine_error)?;
        let mut messages = Vec::new();
        for row in rows {
            messages.push(row.map_err(map_engine_error)?);
        }
        Ok(messages)
    }

    /// Deletes delivered rows whose delivery or expiry is older than the
    /// cutoff. Returns the number of rows reaped.
    pub fn inbox_reap_impl(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock_conn()?;
        let cutoff = format_datetime(&older_than);
        let reaped = conn
            .execute(
                "DELETE FROM inbox
                 WHERE (delivered_at IS NOT NULL AND delivered_at < ?1)
                    OR (expires_at IS NOT NULL AND expires_at < ?1)",
                params![cutoff],
            )
            .map_err(map_engine_error)?;
        Ok(reaped)
    }
}
