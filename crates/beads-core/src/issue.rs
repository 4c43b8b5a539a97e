//! Issue struct -- the universal record of the beads system.
//!
//! Every workflow concept (task, bug, epic, advice, gate, decision, formula,
//! event, agent, message, role, skill) is an [`Issue`] with a discriminating
//! [`IssueType`] and a type-specific metadata blob (see [`crate::metadata`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::comment::Comment;
use crate::dependency::Dependency;
use crate::enums::{IssueType, Status};

/// Helper for `skip_serializing_if` on `bool` fields.
fn is_false(b: &bool) -> bool {
    !b
}

/// Helper for `skip_serializing_if` on `i32` priority (0 is valid, never skip).
fn never_skip(_p: &i32) -> bool {
    false
}

/// Helper for `skip_serializing_if` on `Vec` fields.
fn is_empty_vec<T>(v: &Vec<T>) -> bool {
    v.is_empty()
}

/// Represents a trackable work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    // ===== Identity =====
    #[serde(default)]
    pub id: String,

    /// SHA-256 of canonical content. Recomputed on every write; carried on
    /// federation lines separately, never read back from JSONL.
    #[serde(skip)]
    pub content_hash: String,

    // ===== Content =====
    #[serde(default)]
    pub title: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    // ===== Status & Workflow =====
    #[serde(default, skip_serializing_if = "Status::is_default")]
    pub status: Status,

    /// Priority 0-4, 0 highest. No skip: 0 is valid (P0/critical).
    #[serde(default, skip_serializing_if = "never_skip")]
    pub priority: i32,

    #[serde(default, skip_serializing_if = "IssueType::is_default")]
    pub issue_type: IssueType,

    // ===== Assignment =====
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub assignee: String,

    // ===== Timestamps =====
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_by: String,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub close_reason: String,

    // ===== Type-specific metadata =====
    /// Opaque JSON blob. Gate, decision, advice and formula issues carry
    /// their typed sub-schemas here (see [`crate::metadata`]).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Box<serde_json::value::RawValue>>,

    // ===== Provenance =====
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_repo: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_formula: String,

    // ===== Template flag =====
    /// Templates never appear in readiness queries.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_template: bool,

    // ===== Relational data (populated for export/import) =====
    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub labels: Vec<String>,

    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub dependencies: Vec<Dependency>,

    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub comments: Vec<Comment>,
}

impl Default for Issue {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            content_hash: String::new(),
            title: String::new(),
            description: String::new(),
            status: Status::Open,
            priority: 2,
            issue_type: IssueType::Task,
            assignee: String::new(),
            created_at: now,
            created_by: String::new(),
            updated_at: now,
            closed_at: None,
            close_reason: String::new(),
            metadata: None,
            source_repo: String::new(),
            source_formula: String::new(),
            is_template: false,
            labels: Vec::new(),
            dependencies: Vec::new(),
            comments: Vec::new(),
        }
    }
}

impl Issue {
    /// Applies default values for fields omitted during JSONL import.
    pub fn set_defaults(&mut self) {
        if self.status.as_str().is_empty() {
            self.status = Status::Open;
        }
        if self.issue_type.as_str().is_empty() {
            self.issue_type = IssueType::Task;
        }
    }

    /// Returns the parsed metadata blob, or `Value::Null` when absent.
    pub fn metadata_value(&self) -> serde_json::Value {
        self.metadata
            .as_ref()
            .and_then(|raw| serde_json::from_str(raw.get()).ok())
            .unwrap_or(serde_json::Value::Null)
    }

    /// Replaces the metadata blob with the serialization of `value`.
    pub fn set_metadata<T: Serialize>(&mut self, value: &T) -> Result<(), serde_json::Error> {
        let text = serde_json::to_string(value)?;
        self.metadata = Some(serde_json::value::RawValue::from_string(text)?);
        Ok(())
    }

    /// Returns `true` if this issue can appear in readiness queries at all.
    pub fn is_workable(&self) -> bool {
        self.status == Status::Open && !self.is_template
    }
}

/// Builder for constructing an [`Issue`] with a fluent API.
pub struct IssueBuilder {
    issue: Issue,
}

impl IssueBuilder {
    /// Creates a new builder with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        let mut issue = Issue::default();
        issue.title = title.into();
        Self { issue }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.issue.id = id.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.issue.description = description.into();
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.issue.status = status;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.issue.priority = priority;
        self
    }

    pub fn issue_type(mut self, issue_type: IssueType) -> Self {
        self.issue.issue_type = issue_type;
        self
    }

    pub fn assignee(mut self, assignee: impl Into<String>) -> Self {
        self.issue.assignee = assignee.into();
        self
    }

    pub fn created_at(mut self, t: DateTime<Utc>) -> Self {
        self.issue.created_at = t;
        self
    }

    pub fn created_by(mut self, by: impl Into<String>) -> Self {
        self.issue.created_by = by.into();
        self
    }

    pub fn updated_at(mut self, t: DateTime<Utc>) -> Self {
        self.issue.updated_at = t;
        self
    }

    pub fn closed_at(mut self, t: DateTime<Utc>) -> Self {
        self.issue.closed_at = Some(t);
        self
    }

    pub fn close_reason(mut self, reason: impl Into<String>) -> Self {
        self.issue.close_reason = reason.into();
        self
    }

    pub fn metadata_json(mut self, json: impl Into<String>) -> Self {
        self.issue.metadata = serde_json::value::RawValue::from_string(json.into()).ok();
        self
    }

    pub fn source_repo(mut self, repo: impl Into<String>) -> Self {
        self.issue.source_repo = repo.into();
        self
    }

    pub fn source_formula(mut self, formula: impl Into<String>) -> Self {
        self.issue.source_formula = formula.into();
        self
    }

    pub fn is_template(mut self, is_template: bool) -> Self {
        self.issue.is_template = is_template;
        self
    }

    pub fn labels(mut self, labels: Vec<String>) -> Self {
        self.issue.labels = labels;
        self
    }

    /// Consumes the builder and returns the constructed [`Issue`].
    pub fn build(self) -> Issue {
        self.issue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_issue() {
        let issue = Issue::default();
        assert_eq!(issue.status, Status::Open);
        assert_eq!(issue.issue_type, IssueType::Task);
        assert_eq!(issue.priority, 2);
        assert!(!issue.is_template);
    }

    #[test]
    fn builder_basic() {
        let issue = IssueBuilder::new("Fix the bug")
            .priority(0)
            .status(Status::InProgress)
            .issue_type(IssueType::Bug)
            .assignee("mayor")
            .build();

        assert_eq!(issue.title, "Fix the bug");
        assert_eq!(issue.priority, 0);
        assert_eq!(issue.status, Status::InProgress);
        assert_eq!(issue.issue_type, IssueType::Bug);
        assert_eq!(issue.assignee, "mayor");
    }

    #[test]
    fn issue_serde_roundtrip() {
        let issue = IssueBuilder::new("Test issue")
            .id("bd-abc123")
            .priority(1)
            .description("A test description")
            .build();

        let json = serde_json::to_string(&issue).unwrap();
        let back: Issue = serde_json::from_str(&json).unwrap();

        assert_eq!(back.title, "Test issue");
        assert_eq!(back.id, "bd-abc123");
        assert_eq!(back.priority, 1);
        assert_eq!(back.description, "A test description");
    }

    #[test]
    fn serde_omits_empty_fields() {
        let issue = IssueBuilder::new("Minimal").id("bd-1").build();
        let json = serde_json::to_string(&issue).unwrap();
        assert!(!json.contains("description"));
        assert!(!json.contains("assignee"));
        assert!(!json.contains("close_reason"));
        // Priority is always present, even at zero.
        assert!(json.contains("priority"));
    }

    #[test]
    fn metadata_roundtrip() {
        let mut issue = IssueBuilder::new("Gate").issue_type(IssueType::Gate).build();
        issue
            .set_metadata(&serde_json::json!({"await_type": "timer"}))
            .unwrap();
        let value = issue.metadata_value();
        assert_eq!(value["await_type"], "timer");
    }

    #[test]
    fn workable_excludes_templates() {
        let mut issue = IssueBuilder::new("T").build();
        assert!(issue.is_workable());
        issue.is_template = true;
        assert!(!issue.is_workable());
        issue.is_template = false;
        issue.status = Status::Closed;
        assert!(!issue.is_workable());
    }
}
