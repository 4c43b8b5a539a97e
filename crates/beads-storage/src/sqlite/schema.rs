//! DDL statements and migrations for the SQLite schema.
//!
//! Timestamps are stored as TEXT in ISO 8601 form (SQLite has no native
//! datetime type). Booleans are INTEGER (0/1). JSON blobs are TEXT.

/// Current schema version. Bumped whenever DDL or migrations change.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Core DDL statements executed during `init_schema`.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    // -- Issues table --------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS issues (
        id             TEXT PRIMARY KEY,
        content_hash   TEXT NOT NULL DEFAULT '',
        title          TEXT NOT NULL,
        description    TEXT NOT NULL DEFAULT '',
        status         TEXT NOT NULL DEFAULT 'open',
        priority       INTEGER NOT NULL DEFAULT 2,
        issue_type     TEXT NOT NULL DEFAULT 'task',
        assignee       TEXT NOT NULL DEFAULT '',
        created_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        created_by     TEXT NOT NULL DEFAULT '',
        updated_at     TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        closed_at      TEXT,
        close_reason   TEXT NOT NULL DEFAULT '',
        metadata       TEXT NOT NULL DEFAULT '{}',
        source_repo    TEXT NOT NULL DEFAULT '',
        source_formula TEXT NOT NULL DEFAULT '',
        is_template    INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status)",
    "CREATE INDEX IF NOT EXISTS idx_issues_priority ON issues(priority)",
    "CREATE INDEX IF NOT EXISTS idx_issues_issue_type ON issues(issue_type)",
    "CREATE INDEX IF NOT EXISTS idx_issues_assignee ON issues(assignee)",
    "CREATE INDEX IF NOT EXISTS idx_issues_created_at ON issues(created_at)",
    "CREATE INDEX IF NOT EXISTS idx_issues_content_hash ON issues(content_hash)",
    // -- Dependencies table --------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS dependencies (
        issue_id      TEXT NOT NULL,
        depends_on_id TEXT NOT NULL,
        type          TEXT NOT NULL DEFAULT 'blocks',
        created_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        created_by    TEXT NOT NULL DEFAULT '',
        PRIMARY KEY (issue_id, depends_on_id),
        FOREIGN KEY (issue_id) REFERENCES issues(id) ON DELETE CASCADE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_dependencies_depends_on ON dependencies(depends_on_id)",
    "CREATE INDEX IF NOT EXISTS idx_dependencies_depends_on_type ON dependencies(depends_on_id, type)",
    // -- Labels table --------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS labels (
        issue_id TEXT NOT NULL,
        label    TEXT NOT NULL,
        PRIMARY KEY (issue_id, label),
        FOREIGN KEY (issue_id) REFERENCES issues(id) ON DELETE CASCADE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_labels_label ON labels(label)",
    // -- Label counts (derived) ----------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS label_counts (
        label TEXT PRIMARY KEY,
        count INTEGER NOT NULL DEFAULT 0
    )
    "#,
    // -- Comments table ------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS comments (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        issue_id   TEXT NOT NULL,
        author     TEXT NOT NULL,
        text       TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        FOREIGN KEY (issue_id) REFERENCES issues(id) ON DELETE CASCADE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_comments_issue ON comments(issue_id)",
    // -- Events table (audit trail, append-only) -----------------------------
    r#"
    CREATE TABLE IF NOT EXISTS events (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        issue_id    TEXT NOT NULL,
        event_type  TEXT NOT NULL,
        actor       TEXT NOT NULL,
        old_value   TEXT,
        new_value   TEXT,
        comment     TEXT,
        created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_events_issue ON events(issue_id)",
    "CREATE INDEX IF NOT EXISTS idx_events_created_at ON events(created_at)",
    // -- Inbox table ---------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS inbox (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        agent_name   TEXT NOT NULL,
        rig          TEXT NOT NULL DEFAULT '',
        session_id   TEXT NOT NULL DEFAULT '',
        msg_type     TEXT NOT NULL DEFAULT '',
        source       TEXT NOT NULL DEFAULT '',
        content      TEXT NOT NULL,
        priority     INTEGER NOT NULL DEFAULT 2,
        created_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        delivered_at TEXT,
        expires_at   TEXT,
        dedup_key    TEXT NOT NULL UNIQUE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_inbox_agent ON inbox(agent_name)",
    "CREATE INDEX IF NOT EXISTS idx_inbox_delivered ON inbox(delivered_at)",
    // -- Blocked issues cache (derived) --------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS blocked_issues_cache (
        issue_id   TEXT NOT NULL,
        blocker_id TEXT NOT NULL,
        PRIMARY KEY (issue_id, blocker_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_blocked_cache_blocker ON blocked_issues_cache(blocker_id)",
    // -- External bus handlers -----------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS bus_handlers (
        id          TEXT PRIMARY KEY,
        event_types TEXT NOT NULL,
        command     TEXT NOT NULL,
        priority    INTEGER NOT NULL DEFAULT 100,
        enabled     INTEGER NOT NULL DEFAULT 1,
        timeout_s   INTEGER NOT NULL DEFAULT 10
    )
    "#,
    // -- Config table --------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS config (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
    // -- Metadata table ------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS metadata (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
];

/// Default configuration values inserted on first init.
pub const DEFAULT_CONFIG: &[(&str, &str)] = &[
    ("issue_prefix", "bd"),
    ("types.custom", ""),
    ("statuses.custom", ""),
    ("inbox.retention_hours", "24"),
    ("gate.check_interval_secs", "60"),
];

/// Schema migrations applied after initial DDL.
///
/// Each migration is a `(name, sql)` pair tracked in the `metadata` table
/// under `migration:<name>` so it runs at most once.
pub const MIGRATIONS: &[(&str, &str)] = &[
    // Future migrations go here, e.g.:
    // ("001_add_foo_column", "ALTER TABLE issues ADD COLUMN foo TEXT DEFAULT ''"),
];
