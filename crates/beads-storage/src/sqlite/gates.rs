//! Gate and bus-handler queries for [`SqliteStore`].

use rusqlite::params;

use beads_core::issue::Issue;

use crate::error::{Result, StorageError};
use crate::sqlite::issues::{ISSUE_COLUMNS, map_engine_error, scan_issue};
use crate::sqlite::store::SqliteStore;
use crate::traits::BusHandlerRow;

impl SqliteStore {
    /// Returns all open gate-type issues. The daemon's gate loop evaluates
    /// these on a timer; a gate resolves by closing its issue.
    pub fn open_gates_impl(&self) -> Result<Vec<Issue>> {
        let conn = self.lock_conn()?;
        let sql = format!(
            "SELECT {ISSUE_COLUMNS} FROM issues
             WHERE issue_type IN ('gate', 'decision')
               AND status NOT IN ('closed', 'tombstone')
             ORDER BY created_at ASC"
        );
        let mut stmt = conn.prepare(&sql).map_err(map_engine_error)?;
        let rows = stmt.query_map([], scan_issue).map_err(map_engine_error)?;
        let mut gates = Vec::new();
        for row in rows {
            gates.push(row.map_err(map_engine_error)?);
        }
        Ok(gates)
    }

    // -- Bus handler registry ------------------------------------------------

    pub fn register_bus_handler_impl(&self, row: &BusHandlerRow) -> Result<()> {
        if row.id.is_empty() || row.command.is_empty() {
            return Err(StorageError::validation("handler id and command are required"));
        }
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO bus_handlers
             (id, event_types, command, priority, enabled, timeout_s)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.id,
                row.event_types,
                row.command,
                row.priority,
                row.enabled as i32,
                row.timeout_s,
            ],
        )
        .map_err(map_engine_error)?;
        Ok(())
    }

    pub fn unregister_bus_handler_impl(&self, id: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        let affected = conn
            .execute("DELETE FROM bus_handlers WHERE id = ?1", params![id])
            .map_err(map_engine_error)?;
        if affected == 0 {
            return Err(StorageError::not_found("bus_handler", id));
        }
        Ok(())
    }

    pub fn list_bus_handlers_impl(&self) -> Result<Vec<BusHandlerRow>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, event_types, command, priority, enabled, timeout_s
                 FROM bus_handlers ORDER BY priority ASC, id ASC",
            )
            .map_err(map_engine_error)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(BusHandlerRow {
                    id: row.get(0)?,
                    event_types: row.get(1)?,
                    command: row.get(2)?,
                    priority: row.get(3)?,
                    enabled: row.get::<_, i32>(4)? != 0,
                    timeout_s: row.get(5)?,
                })
            })
            .map_err(map_engine_error)?;
        let mut handlers = Vec::new();
        for row in rows {
            handlers.push(row.map_err(map_engine_error)?);
        }
        Ok(handlers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::enums::IssueType;
    use beads_core::issue::IssueBuilder;

    fn test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn open_gates_includes_decisions() {
        let store = test_store();
        let gate = IssueBuilder::new("Wait for CI")
            .id("bd-g1")
            .issue_type(IssueType::Gate)
            .build();
        let decision = IssueBuilder::new("Ship it?")
            .id("bd-d1")
            .issue_type(IssueType::Decision)
            .build();
        let task = IssueBuilder::new("Ordinary").id("bd-t1").build();
        store.create_issue_impl(&gate, "mayor").unwrap();
        store.create_issue_impl(&decision, "mayor").unwrap();
        store.create_issue_impl(&task, "mayor").unwrap();

        let gates = store.open_gates_impl().unwrap();
        let ids: Vec<&str> = gates.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["bd-g1", "bd-d1"]);

        store.close_issue_impl("bd-g1", "resolved", "mayor", "").unwrap();
        assert_eq!(store.open_gates_impl().unwrap().len(), 1);
    }

    #[test]
    fn bus_handler_registry_roundtrip() {
        let store = test_store();
        let row = BusHandlerRow {
            id: "notify-slack".into(),
            event_types: "Stop,SessionEnd".into(),
            command: "/usr/local/bin/notify".into(),
            priority: 50,
            enabled: true,
            timeout_s: 10,
        };
        store.register_bus_handler_impl(&row).unwrap();

        let handlers = store.list_bus_handlers_impl().unwrap();
        assert_eq!(handlers, vec![row]);

        store.unregister_bus_handler_impl("notify-slack").unwrap();
        assert!(store.list_bus_handlers_impl().unwrap().is_empty());
        assert!(store
            .unregister_bus_handler_impl("notify-slack")
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn handler_registration_validates() {
        let store = test_store();
        let row = BusHandlerRow {
            id: String::new(),
            event_types: "Stop".into(),
            command: "x".into(),
            priority: 1,
            enabled: true,
            timeout_s: 5,
        };
        assert!(matches!(
            store.register_bus_handler_impl(&row).unwrap_err(),
            StorageError::Validation { .. }
        ));
    }
}
