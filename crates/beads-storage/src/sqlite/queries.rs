//! Work queries: ready work, blocked issues, epic rollups, statistics.

use rusqlite::params;

use beads_core::filter::WorkFilter;
use beads_core::issue::Issue;

use crate::batch::placeholders;
use crate::error::{Result, StorageError};
use crate::sqlite::issues::{ISSUE_COLUMNS, map_engine_error, scan_issue};
use crate::sqlite::store::SqliteStore;
use crate::traits::{BlockedIssue, EpicRollup, Statistics};

impl SqliteStore {
    /// Returns issues that are ready to work on.
    ///
    /// Ready means: status open, not a template, and no row in the blocked
    /// cache (the cache holds exactly the open issues with at least one
    /// unresolved blocking predecessor). Ordered by priority asc, then
    /// created_at asc, then id asc.
    pub fn get_ready_work_impl(&self, filter: &WorkFilter) -> Result<Vec<Issue>> {
        let conn = self.lock_conn()?;
        let _watchdog = self.arm_watchdog(&conn);

        let mut where_clauses: Vec<String> = vec![
            "i.status = 'open'".to_string(),
            "i.is_template = 0".to_string(),
            "NOT EXISTS (SELECT 1 FROM blocked_issues_cache c WHERE c.issue_id = i.id)".to_string(),
        ];
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        let mut param_idx = 1;

        if let Some(ref issue_type) = filter.issue_type {
            where_clauses.push(format!("i.issue_type = ?{param_idx}"));
            param_values.push(Box::new(issue_type.as_str().to_string()));
            param_idx += 1;
        }
        if let Some(priority) = filter.priority {
            where_clauses.push(format!("i.priority = ?{param_idx}"));
            param_values.push(Box::new(priority));
            param_idx += 1;
        }
        if let Some(ref assignee) = filter.assignee {
            where_clauses.push(format!("i.assignee = ?{param_idx}"));
            param_values.push(Box::new(assignee.clone()));
            param_idx += 1;
        }
        if filter.unassigned {
            where_clauses.push("i.assignee = ''".to_string());
        }
        if let Some(ref epic_id) = filter.epic_id {
            // Direct parent-child children of the epic.
            where_clauses.push(format!(
                "EXISTS (SELECT 1 FROM dependencies d
                         WHERE d.issue_id = i.id AND d.depends_on_id = ?{param_idx}
                           AND d.type = 'parent-child')"
            ));
            param_values.push(Box::new(epic_id.clone()));
            param_idx += 1;
        }

        // Label filters (AND).
        for label in &filter.labels {
            where_clauses.push(format!(
                "EXISTS (SELECT 1 FROM labels WHERE labels.issue_id = i.id AND labels.label = ?{param_idx})"
            ));
            param_values.push(Box::new(label.clone()));
            param_idx += 1;
        }
        // Label filters (OR).
        if !filter.labels_any.is_empty() {
            where_clauses.push(format!(
                "EXISTS (SELECT 1 FROM labels WHERE labels.issue_id = i.id AND labels.label IN ({}))",
                placeholders(filter.labels_any.len(), param_idx)
            ));
            for label in &filter.labels_any {
                param_values.push(Box::new(label.clone()));
            }
            param_idx += filter.labels_any.len();
        }

        let order_sql = match filter.sort_policy {
            beads_core::enums::SortPolicy::Oldest => "i.created_at ASC, i.id ASC",
            _ => "i.priority ASC, i.created_at ASC, i.id ASC",
        };
        let limit_sql = filter
            .limit
            .map(|l| format!(" LIMIT {l}"))
            .unwrap_or_default();

        let sql = format!(
            "SELECT {ISSUE_COLUMNS} FROM issues i WHERE {} ORDER BY {order_sql}{limit_sql}",
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

    /// Returns issues with at least one open blocker, with the blocker ids.
    pub fn get_blocked_issues_impl(&self, filter: &WorkFilter) -> Result<Vec<BlockedIssue>> {
        let conn = self.lock_conn()?;
        let _watchdog = self.arm_watchdog(&conn);

        let limit_sql = filter
            .limit
            .map(|l| format!(" LIMIT {l}"))
            .unwrap_or_default();
        let sql = format!(
            "SELECT {ISSUE_COLUMNS} FROM issues i
             WHERE EXISTS (SELECT 1 FROM blocked_issues_cache c WHERE c.issue_id = i.id)
             ORDER BY i.priority ASC, i.created_at ASC, i.id ASC{limit_sql}"
        );

        let mut stmt = conn.prepare(&sql).map_err(map_engine_error)?;
        let rows = stmt.query_map([], scan_issue).map_err(map_engine_error)?;

        let mut result = Vec::new();
        for row in rows {
            let issue = row.map_err(map_engine_error)?;
            let mut blocker_stmt = conn
                .prepare_cached(
                    "SELECT blocker_id FROM blocked_issues_cache WHERE issue_id = ?1 ORDER BY blocker_id",
                )
                .map_err(map_engine_error)?;
            let blockers: Vec<String> = blocker_stmt
                .query_map(params![issue.id], |row| row.get(0))
                .map_err(map_engine_error)?
                .filter_map(|r| r.ok())
                .collect();
            result.push(BlockedIssue { issue, blockers });
        }
        Ok(result)
    }

    /// Returns the rollup for one epic: child counts plus the ready subset
    /// of its parent-child children.
    pub fn get_epic_rollup_impl(&self, epic_id: &str) -> Result<EpicRollup> {
        let epic = self.get_issue_impl(epic_id)?;
        if epic.issue_type != beads_core::enums::IssueType::Epic {
            return Err(StorageError::validation(format!(
                "{epic_id} is not an epic (type: {})",
                epic.issue_type
            )));
        }

        let conn = self.lock_conn()?;
        let total_children: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM dependencies d
                 JOIN issues child ON child.id = d.issue_id
                 WHERE d.depends_on_id = ?1 AND d.type = 'parent-child'
                   AND child.status != 'tombstone'",
                params![epic_id],
                |row| row.get(0),
            )
            .map_err(map_engine_error)?;
        let closed_children: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM dependencies d
                 JOIN issues child ON child.id = d.issue_id
                 WHERE d.depends_on_id = ?1 AND d.type = 'parent-child'
                   AND child.status = 'closed'",
                params![epic_id],
                |row| row.get(0),
            )
            .map_err(map_engine_error)?;

        let sql = format!(
            "SELECT {ISSUE_COLUMNS} FROM issues i
             WHERE i.status = 'open' AND i.is_template = 0
               AND EXISTS (SELECT 1 FROM dependencies d
                           WHERE d.issue_id = i.id AND d.depends_on_id = ?1
                             AND d.type = 'parent-child')
               AND NOT EXISTS (SELECT 1 FROM blocked_issues_cache c WHERE c.issue_id = i.id)
             ORDER BY i.priority ASC, i.created_at ASC, i.id ASC"
        );
        let mut stmt = conn.prepare(&sql).map_err(map_engine_error)?;
        let rows = stmt
            .query_map(params![epic_id], scan_issue)
            .map_err(map_engine_error)?;
        let mut ready = Vec::new();
        for row in rows {
            ready.push(row.map_err(map_engine_error)?);
        }

        Ok(EpicRollup {
            epic,
            total_children,
            closed_children,
            ready,
        })
    }

    /// Returns aggregate statistics.
    pub fn get_statistics_impl(&self) -> Result<Statistics> {
        let conn = self.lock_conn()?;
        let mut stats = Statistics::default();

        let mut count_by_status = |status: &str| -> Result<i64> {
            conn.query_row(
                "SELECT COUNT(*) FROM issues WHERE status = ?1",
                params![status],
                |row| row.get(0),
            )
            .map_err(map_engine_error)
        };

        stats.open_issues = count_by_status("open")?;
        stats.in_progress_issues = count_by_status("in_progress")?;
        stats.blocked_issues = count_by_status("blocked")?;
        stats.closed_issues = count_by_status("closed")?;
        stats.tombstoned_issues = count_by_status("tombstone")?;
        stats.total_issues = conn
            .query_row("SELECT COUNT(*) FROM issues", [], |row| row.get(0))
            .map_err(map_engine_error)?;

        let mut stmt = conn
            .prepare(
                "SELECT issue_type, COUNT(*) FROM issues
                 WHERE status != 'tombstone'
                 GROUP BY issue_type ORDER BY COUNT(*) DESC",
            )
            .map_err(map_engine_error)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(map_engine_error)?;
        for row in rows {
            stats.by_type.push(row.map_err(map_engine_error)?);
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::dependency::Dependency;
    use beads_core::enums::{DependencyType, IssueType};
    use beads_core::issue::IssueBuilder;

    fn test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn create(store: &SqliteStore, id: &str, priority: i32) {
        let issue = IssueBuilder::new(format!("Issue {id}"))
            .id(id)
            .priority(priority)
            .build();
        store.create_issue_impl(&issue, "mayor").unwrap();
    }

    fn blocks(issue_id: &str, depends_on_id: &str) -> Dependency {
        Dependency::new(issue_id, depends_on_id, DependencyType::Blocks, "mayor")
    }

    #[test]
    fn readiness_gating_chain() {
        let store = test_store();
        create(&store, "bd-a", 2);
        create(&store, "bd-b", 2);
        create(&store, "bd-c", 2);
        store.add_dependency_impl(&blocks("bd-b", "bd-a"), "mayor").unwrap();
        store.add_dependency_impl(&blocks("bd-c", "bd-b"), "mayor").unwrap();

        let ready_ids = |store: &SqliteStore| -> Vec<String> {
            store
                .get_ready_work_impl(&WorkFilter::default())
                .unwrap()
                .into_iter()
                .map(|i| i.id)
                .collect()
        };

        assert_eq!(ready_ids(&store), vec!["bd-a"]);
        store.close_issue_impl("bd-a", "done", "mayor", "").unwrap();
        assert_eq!(ready_ids(&store), vec!["bd-b"]);
        store.close_issue_impl("bd-b", "done", "mayor", "").unwrap();
        assert_eq!(ready_ids(&store), vec!["bd-c"]);
    }

    #[test]
    fn ready_ordering_priority_then_age_then_id() {
        let store = test_store();
        create(&store, "bd-z", 2);
        create(&store, "bd-m", 0);
        create(&store, "bd-a", 2);

        let ready = store.get_ready_work_impl(&WorkFilter::default()).unwrap();
        assert_eq!(ready[0].id, "bd-m"); // P0 first
        // Same priority falls back to created_at; identical timestamps fall
        // back to id order.
        let rest: Vec<&str> = ready[1..].iter().map(|i| i.id.as_str()).collect();
        assert!(rest == vec!["bd-z", "bd-a"] || rest == vec!["bd-a", "bd-z"]);
    }

    #[test]
    fn templates_never_ready() {
        let store = test_store();
        let template = IssueBuilder::new("Template")
            .id("bd-tpl")
            .is_template(true)
            .build();
        store.create_issue_impl(&template, "mayor").unwrap();
        assert!(store.get_ready_work_impl(&WorkFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn blocked_issues_report_blockers() {
        let store = test_store();
        create(&store, "bd-x", 2);
        create(&store, "bd-y", 2);
        store.add_dependency_impl(&blocks("bd-y", "bd-x"), "mayor").unwrap();

        let blocked = store.get_blocked_issues_impl(&WorkFilter::default()).unwrap();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].issue.id, "bd-y");
        assert_eq!(blocked[0].blockers, vec!["bd-x"]);
    }

    #[test]
    fn epic_rollup_counts_and_ready_subset() {
        let store = test_store();
        let epic = IssueBuilder::new("Big epic")
            .id("bd-epic")
            .issue_type(IssueType::Epic)
            .build();
        store.create_issue_impl(&epic, "mayor").unwrap();
        create(&store, "bd-ch1", 1);
        create(&store, "bd-ch2", 2);
        for child in ["bd-ch1", "bd-ch2"] {
            store
                .add_dependency_impl(
                    &Dependency::new(child, "bd-epic", DependencyType::ParentChild, "mayor"),
                    "mayor",
                )
                .unwrap();
        }
        // ch2 is blocked by ch1.
        store.add_dependency_impl(&blocks("bd-ch2", "bd-ch1"), "mayor").unwrap();
        store.close_issue_impl("bd-ch1", "done", "mayor", "").unwrap();

        let rollup = store.get_epic_rollup_impl("bd-epic").unwrap();
        assert_eq!(rollup.total_children, 2);
        assert_eq!(rollup.closed_children, 1);
        let ready_ids: Vec<&str> = rollup.ready.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ready_ids, vec!["bd-ch2"]);
    }

    #[test]
    fn rollup_of_non_epic_fails() {
        let store = test_store();
        create(&store, "bd-task", 2);
        assert!(matches!(
            store.get_epic_rollup_impl("bd-task").unwrap_err(),
            StorageError::Validation { .. }
        ));
    }

    #[test]
    fn statistics_counts() {
        let store = test_store();
        create(&store, "bd-s1", 2);
        create(&store, "bd-s2", 2);
        store.close_issue_impl("bd-s2", "done", "mayor", "").unwrap();

        let stats = store.get_statistics_impl().unwrap();
        assert_eq!(stats.total_issues, 2);
        assert_eq!(stats.open_issues, 1);
        assert_eq!(stats.closed_issues, 1);
    }
}
