//! Comment and Event operations for [`SqliteStore`].

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use beads_core::comment::{Comment, Event};
use beads_core::enums::EventType;

use crate::error::Result;
use crate::sqlite::issues::{emit_event, format_datetime, map_engine_error, parse_datetime};
use crate::sqlite::store::SqliteStore;

// ---------------------------------------------------------------------------
// Connection-level helpers (shared with Transaction)
// ---------------------------------------------------------------------------

/// Adds a comment, emitting a "commented" event.
pub(crate) fn add_comment_on_conn(
    conn: &Connection,
    issue_id: &str,
    author: &str,
    text: &str,
) -> Result<Comment> {
    // Comments attach to live issues only.
    crate::sqlite::issues::get_issue_on_conn(conn, issue_id)?;

    let now = Utc::now();
    let now_str = format_datetime(&now);

    conn.execute(
        "INSERT INTO comments (issue_id, author, text, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![issue_id, author, text, now_str],
    )
    .map_err(map_engine_error)?;

    let id = conn.last_insert_rowid();

    emit_event(
        conn,
        issue_id,
        EventType::Commented,
        author,
        None,
        None,
        Some(text),
        &now_str,
    )?;

    Ok(Comment {
        id,
        issue_id: issue_id.to_string(),
        author: author.to_string(),
        text: text.to_string(),
        created_at: now,
    })
}

/// Imports a comment with a specific created_at timestamp (federation).
/// No event: the source repo already recorded one.
pub(crate) fn import_comment_on_conn(
    conn: &Connection,
    issue_id: &str,
    author: &str,
    text: &str,
    created_at: DateTime<Utc>,
) -> Result<Comment> {
    let created_at_str = format_datetime(&created_at);

    conn.execute(
        "INSERT INTO comments (issue_id, author, text, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![issue_id, author, text, created_at_str],
    )
    .map_err(map_engine_error)?;

    Ok(Comment {
        id: conn.last_insert_rowid(),
        issue_id: issue_id.to_string(),
        author: author.to_string(),
        text: text.to_string(),
        created_at,
    })
}

/// Returns all comments for an issue, oldest first.
pub(crate) fn get_comments_on_conn(conn: &Connection, issue_id: &str) -> Result<Vec<Comment>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, issue_id, author, text, created_at
             FROM comments WHERE issue_id = ?1 ORDER BY created_at ASC, id ASC",
        )
        .map_err(map_engine_error)?;
    let rows = stmt
        .query_map(params![issue_id], |row| {
            let created_at_str: String = row.get(4)?;
            Ok(Comment {
                id: row.get(0)?,
                issue_id: row.get(1)?,
                author: row.get(2)?,
                text: row.get(3)?,
                created_at: parse_datetime(&created_at_str),
            })
        })
        .map_err(map_engine_error)?;
    let mut comments = Vec::new();
    for row in rows {
        comments.push(row.map_err(map_engine_error)?);
    }
    Ok(comments)
}

/// Scans a row from the events table into an [`Event`].
fn scan_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    let created_at_str: String = row.get(7)?;
    let event_type_str: String = row.get(2)?;
    Ok(Event {
        id: row.get(0)?,
        issue_id: row.get(1)?,
        event_type: EventType::from(event_type_str),
        actor: row.get(3)?,
        old_value: row.get(4)?,
        new_value: row.get(5)?,
        comment: row.get(6)?,
        created_at: parse_datetime(&created_at_str),
    })
}

// ---------------------------------------------------------------------------
// SqliteStore methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    pub fn add_comment_impl(&self, issue_id: &str, author: &str, text: &str) -> Result<Comment> {
        self.with_tx(|conn| add_comment_on_conn(conn, issue_id, author, text))
    }

    pub fn get_comments_impl(&self, issue_id: &str) -> Result<Vec<Comment>> {
        let conn = self.lock_conn()?;
        get_comments_on_conn(&conn, issue_id)
    }

    pub fn get_events_impl(&self, issue_id: &str, limit: i32) -> Result<Vec<Event>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, issue_id, event_type, actor, old_value, new_value, comment, created_at
                 FROM events WHERE issue_id = ?1
                 ORDER BY created_at DESC, id DESC LIMIT ?2",
            )
            .map_err(map_engine_error)?;
        let rows = stmt
            .query_map(params![issue_id, limit], scan_event)
            .map_err(map_engine_error)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row.map_err(map_engine_error)?);
        }
        Ok(events)
    }

    pub fn get_all_events_since_impl(&self, since_id: i64) -> Result<Vec<Event>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, issue_id, event_type, actor, old_value, new_value, comment, created_at
                 FROM events WHERE id > ?1
                 ORDER BY id ASC",
            )
            .map_err(map_engine_error)?;
        let rows = stmt
            .query_map(params![since_id], scan_event)
            .map_err(map_engine_error)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row.map_err(map_engine_error)?);
        }
        Ok(events)
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
    fn add_and_get_comment() {
        let store = test_store();
        let issue = IssueBuilder::new("Issue").id("bd-cmt1").build();
        store.create_issue_impl(&issue, "mayor").unwrap();

        let comment = store.add_comment_impl("bd-cmt1", "mayor", "Looks good").unwrap();
        assert_eq!(comment.author, "mayor");
        assert!(comment.id > 0);

        let comments = store.get_comments_impl("bd-cmt1").unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].text, "Looks good");
    }

    #[test]
    fn comment_on_missing_issue_fails() {
        let store = test_store();
        let err = store.add_comment_impl("bd-ghost", "a", "b").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn events_accumulate_per_mutation() {
        let store = test_store();
        let issue = IssueBuilder::new("Issue").id("bd-evt1").build();
        store.create_issue_impl(&issue, "mayor").unwrap();
        store.add_comment_impl("bd-evt1", "bob", "A comment").unwrap();
        store.close_issue_impl("bd-evt1", "done", "mayor", "").unwrap();

        let events = store.get_events_impl("bd-evt1", 10).unwrap();
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert!(types.contains(&"created"));
        assert!(types.contains(&"commented"));
        assert!(types.contains(&"closed"));
    }

    #[test]
    fn get_all_events_since_is_a_cursor() {
        let store = test_store();
        let issue = IssueBuilder::new("Issue").id("bd-evt2").build();
        store.create_issue_impl(&issue, "mayor").unwrap();

        let events = store.get_all_events_since_impl(0).unwrap();
        assert!(!events.is_empty());

        let last_id = events.last().unwrap().id;
        assert!(store.get_all_events_since_impl(last_id).unwrap().is_empty());
    }
}
