//! Derived-cache maintenance: `blocked_issues_cache` and `label_counts`.
//!
//! Cache invariant: a `(issue_id, blocker_id)` row exists iff `issue_id` is
//! open and `blocker_id` is an unresolved `blocks` predecessor. Readiness
//! queries then reduce to a NOT EXISTS probe. Both caches are rebuildable
//! from base tables.

use rusqlite::{Connection, params};

use crate::error::Result;
use crate::sqlite::issues::map_engine_error;

/// Recomputes cache rows for one issue in its role as the blocked party.
pub(crate) fn refresh_for_issue(conn: &Connection, issue_id: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM blocked_issues_cache WHERE issue_id = ?1",
        params![issue_id],
    )
    .map_err(map_engine_error)?;

    conn.execute(
        "INSERT INTO blocked_issues_cache (issue_id, blocker_id)
         SELECT d.issue_id, d.depends_on_id
         FROM dependencies d
         JOIN issues i ON i.id = d.issue_id
         JOIN issues b ON b.id = d.depends_on_id
         WHERE d.issue_id = ?1
           AND d.type = 'blocks'
           AND i.status = 'open'
           AND b.status NOT IN ('closed', 'tombstone')",
        params![issue_id],
    )
    .map_err(map_engine_error)?;

    Ok(())
}

/// Recomputes cache rows for every issue that depends on `blocker_id`.
pub(crate) fn refresh_for_dependents(conn: &Connection, blocker_id: &str) -> Result<()> {
    let dependents: Vec<String> = {
        let mut stmt = conn
            .prepare("SELECT issue_id FROM dependencies WHERE depends_on_id = ?1 AND type = 'blocks'")
            .map_err(map_engine_error)?;
        let rows = stmt
            .query_map(params![blocker_id], |row| row.get::<_, String>(0))
            .map_err(map_engine_error)?;
        rows.filter_map(|r| r.ok()).collect()
    };
    for dependent in dependents {
        refresh_for_issue(conn, &dependent)?;
    }
    Ok(())
}

/// Rebuilds both caches from base tables. Returns the number of blocked-cache
/// rows that differed from the stored state (drift).
pub(crate) fn rebuild_all(conn: &Connection) -> Result<usize> {
    // Count rows that would change: stale rows plus missing rows.
    let stale: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM blocked_issues_cache c
             WHERE NOT EXISTS (
                 SELECT 1 FROM dependencies d
                 JOIN issues i ON i.id = d.issue_id
                 JOIN issues b ON b.id = d.depends_on_id
                 WHERE d.issue_id = c.issue_id
                   AND d.depends_on_id = c.blocker_id
                   AND d.type = 'blocks'
                   AND i.status = 'open'
                   AND b.status NOT IN ('closed', 'tombstone')
             )",
            [],
            |row| row.get(0),
        )
        .map_err(map_engine_error)?;
    let missing: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM dependencies d
             JOIN issues i ON i.id = d.issue_id
             JOIN issues b ON b.id = d.depends_on_id
             WHERE d.type = 'blocks'
               AND i.status = 'open'
               AND b.status NOT IN ('closed', 'tombstone')
               AND NOT EXISTS (
                   SELECT 1 FROM blocked_issues_cache c
                   WHERE c.issue_id = d.issue_id AND c.blocker_id = d.depends_on_id
               )",
            [],
            |row| row.get(0),
        )
        .map_err(map_engine_error)?;

    conn.execute_batch(
        "DELETE FROM blocked_issues_cache;
         INSERT INTO blocked_issues_cache (issue_id, blocker_id)
         SELECT d.issue_id, d.depends_on_id
         FROM dependencies d
         JOIN issues i ON i.id = d.issue_id
         JOIN issues b ON b.id = d.depends_on_id
         WHERE d.type = 'blocks'
           AND i.status = 'open'
           AND b.status NOT IN ('closed', 'tombstone');
         DELETE FROM label_counts;
         INSERT INTO label_counts (label, count)
         SELECT label, COUNT(*) FROM labels GROUP BY label;",
    )
    .map_err(map_engine_error)?;

    Ok((stale + missing) as usize)
}

/// Bumps the count for a label after an insert.
pub(crate) fn bump_label_count(conn: &Connection, label: &str, delta: i64) -> Result<()> {
    if delta > 0 {
        conn.execute(
            "INSERT INTO label_counts (label, count) VALUES (?1, ?2)
             ON CONFLICT(label) DO UPDATE SET count = count + ?2",
            params![label, delta],
        )
        .map_err(map_engine_error)?;
    } else {
        conn.execute(
            "UPDATE label_counts SET count = count + ?2 WHERE label = ?1",
            params![label, delta],
        )
        .map_err(map_engine_error)?;
        conn.execute("DELETE FROM label_counts WHERE count <= 0", [])
            .map_err(map_engine_error)?;
    }
    Ok(())
}
