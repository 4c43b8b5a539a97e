//! Filter types for querying issues.

use chrono::{DateTime, Utc};

use crate::enums::{IssueType, SortPolicy, Status};

/// Filter for issue list/search queries.
#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    pub status: Option<Status>,
    pub priority: Option<i32>,
    pub issue_type: Option<IssueType>,
    pub assignee: Option<String>,

    /// AND semantics: issue must have ALL these labels.
    pub labels: Vec<String>,
    /// OR semantics: issue must have AT LEAST ONE of these labels.
    pub labels_any: Vec<String>,

    /// Filter by specific issue IDs.
    pub ids: Vec<String>,

    /// Full-text query over title and description.
    pub text: Option<String>,

    // Date ranges
    pub created_after: Option<DateTime<Utc>>,
    pub updated_after: Option<DateTime<Utc>>,

    /// Pagination: only ids lexicographically greater than the cursor.
    pub after_id: Option<String>,

    pub limit: Option<i32>,

    /// Include closed issues (tombstones are never included).
    pub include_closed: bool,

    /// Include template issues.
    pub include_templates: bool,

    /// Filter by source_repo field (None = any).
    pub source_repo: Option<String>,
}

/// Filter for ready-work queries.
#[derive(Debug, Clone, Default)]
pub struct WorkFilter {
    pub issue_type: Option<IssueType>,
    pub priority: Option<i32>,
    pub assignee: Option<String>,
    /// Filter for issues with no assignee.
    pub unassigned: bool,

    /// AND semantics: issue must have ALL these labels.
    pub labels: Vec<String>,
    /// OR semantics: issue must have AT LEAST ONE of these labels.
    pub labels_any: Vec<String>,

    /// Restrict to parent-child descendants of this epic.
    pub epic_id: Option<String>,

    pub limit: Option<i32>,
    pub sort_policy: SortPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_filter_defaults() {
        let f = IssueFilter::default();
        assert!(f.status.is_none());
        assert!(f.labels.is_empty());
        assert!(!f.include_closed);
        assert!(f.after_id.is_none());
    }

    #[test]
    fn work_filter_defaults() {
        let f = WorkFilter::default();
        assert_eq!(f.sort_policy, SortPolicy::Hybrid);
        assert!(!f.unassigned);
        assert!(f.epic_id.is_none());
    }
}
