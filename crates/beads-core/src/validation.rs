//! Issue validation rules.

use crate::enums::{IssueType, Status};
use crate::issue::Issue;
use crate::metadata::{DecisionMeta, GateMeta};

/// Error type for validation failures.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("title is required")]
    TitleRequired,

    #[error("title must be 500 characters or less (got {0})")]
    TitleTooLong(usize),

    #[error("priority must be between 0 and 4 (got {0})")]
    InvalidPriority(i32),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("invalid issue type: {0}")]
    InvalidIssueType(String),

    #[error("invalid id format: {0}")]
    InvalidId(String),

    #[error("closed issues must have closed_at timestamp")]
    ClosedWithoutTimestamp,

    #[error("non-closed issues cannot have closed_at timestamp")]
    NotClosedWithTimestamp,

    #[error("metadata must be valid JSON")]
    InvalidMetadata,

    #[error("timer gate requires a timeout")]
    TimerWithoutTimeout,

    #[error("decision response needs selected and/or text")]
    EmptyDecisionResponse,

    #[error("selected option '{0}' does not exist on the decision")]
    UnknownDecisionOption(String),

    #[error("decision already responded")]
    DecisionAlreadyResponded,
}

/// Validates an issue using built-in rules only.
pub fn validate(issue: &Issue) -> Result<(), ValidationError> {
    validate_with_custom(issue, &[], &[])
}

/// Validates an issue, allowing configured custom statuses and types.
pub fn validate_with_custom(
    issue: &Issue,
    custom_statuses: &[&str],
    custom_types: &[&str],
) -> Result<(), ValidationError> {
    if issue.title.trim().is_empty() {
        return Err(ValidationError::TitleRequired);
    }
    if issue.title.len() > 500 {
        return Err(ValidationError::TitleTooLong(issue.title.len()));
    }
    if issue.priority < 0 || issue.priority > 4 {
        return Err(ValidationError::InvalidPriority(issue.priority));
    }
    if !issue.status.is_valid_with_custom(custom_statuses) {
        return Err(ValidationError::InvalidStatus(
            issue.status.as_str().to_owned(),
        ));
    }
    if !issue.issue_type.is_valid_with_custom(custom_types) {
        return Err(ValidationError::InvalidIssueType(
            issue.issue_type.as_str().to_owned(),
        ));
    }
    if issue.status == Status::Closed && issue.closed_at.is_none() {
        return Err(ValidationError::ClosedWithoutTimestamp);
    }
    if issue.status != Status::Closed
        && issue.status != Status::Tombstone
        && issue.closed_at.is_some()
    {
        return Err(ValidationError::NotClosedWithTimestamp);
    }
    if let Some(ref meta) = issue.metadata {
        if serde_json::from_str::<serde_json::Value>(meta.get()).is_err() {
            return Err(ValidationError::InvalidMetadata);
        }
    }
    // Gate-specific invariant: timer gates must define their deadline.
    if issue.issue_type == IssueType::Gate {
        if let Some(gate) = GateMeta::from_issue(issue) {
            if gate.await_type == crate::enums::AwaitType::Timer && gate.timeout_secs.is_none() {
                return Err(ValidationError::TimerWithoutTimeout);
            }
        }
    }

    Ok(())
}

/// Validates an issue for federation import.
///
/// Built-in statuses are checked (to catch corruption); custom issue types
/// from source repos are trusted since they already validated them.
pub fn validate_for_import(issue: &Issue, custom_statuses: &[&str]) -> Result<(), ValidationError> {
    if issue.title.trim().is_empty() {
        return Err(ValidationError::TitleRequired);
    }
    if issue.title.len() > 500 {
        return Err(ValidationError::TitleTooLong(issue.title.len()));
    }
    if issue.priority < 0 || issue.priority > 4 {
        return Err(ValidationError::InvalidPriority(issue.priority));
    }
    if !issue.status.is_valid_with_custom(custom_statuses) {
        return Err(ValidationError::InvalidStatus(
            issue.status.as_str().to_owned(),
        ));
    }
    if issue.status == Status::Closed && issue.closed_at.is_none() {
        return Err(ValidationError::ClosedWithoutTimestamp);
    }
    if let Some(ref meta) = issue.metadata {
        if serde_json::from_str::<serde_json::Value>(meta.get()).is_err() {
            return Err(ValidationError::InvalidMetadata);
        }
    }
    Ok(())
}

/// Validates a decision response payload against the decision's metadata.
///
/// Exactly one of `selected`/`text` (or both) must be non-empty; `selected`
/// must name an existing option; responding twice is rejected.
pub fn validate_decision_response(
    meta: &DecisionMeta,
    selected: &str,
    text: &str,
) -> Result<(), ValidationError> {
    if meta.is_responded() {
        return Err(ValidationError::DecisionAlreadyResponded);
    }
    if selected.is_empty() && text.is_empty() {
        return Err(ValidationError::EmptyDecisionResponse);
    }
    if !selected.is_empty() && !meta.has_option(selected) {
        return Err(ValidationError::UnknownDecisionOption(selected.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::AwaitType;
    use crate::issue::IssueBuilder;
    use crate::metadata::DecisionOption;

    #[test]
    fn valid_issue_passes() {
        let issue = IssueBuilder::new("Valid issue").priority(2).build();
        assert!(validate(&issue).is_ok());
    }

    #[test]
    fn empty_title_fails() {
        let issue = IssueBuilder::new("   ").build();
        assert!(matches!(
            validate(&issue),
            Err(ValidationError::TitleRequired)
        ));
    }

    #[test]
    fn long_title_fails() {
        let issue = IssueBuilder::new("x".repeat(501)).build();
        assert!(matches!(
            validate(&issue),
            Err(ValidationError::TitleTooLong(501))
        ));
    }

    #[test]
    fn invalid_priority_fails() {
        let issue = IssueBuilder::new("Test").priority(5).build();
        assert!(matches!(
            validate(&issue),
            Err(ValidationError::InvalidPriority(5))
        ));
        let issue = IssueBuilder::new("Test").priority(-1).build();
        assert!(matches!(
            validate(&issue),
            Err(ValidationError::InvalidPriority(-1))
        ));
    }

    #[test]
    fn custom_status_needs_allowlist() {
        let issue = IssueBuilder::new("Test")
            .status(Status::Custom("my_status".into()))
            .build();
        assert!(matches!(
            validate(&issue),
            Err(ValidationError::InvalidStatus(_))
        ));
        assert!(validate_with_custom(&issue, &["my_status"], &[]).is_ok());
    }

    #[test]
    fn closed_at_invariants() {
        let issue = IssueBuilder::new("Test").status(Status::Closed).build();
        assert!(matches!(
            validate(&issue),
            Err(ValidationError::ClosedWithoutTimestamp)
        ));

        let issue = IssueBuilder::new("Test")
            .status(Status::Open)
            .closed_at(chrono::Utc::now())
            .build();
        assert!(matches!(
            validate(&issue),
            Err(ValidationError::NotClosedWithTimestamp)
        ));

        let issue = IssueBuilder::new("Test")
            .status(Status::Closed)
            .closed_at(chrono::Utc::now())
            .build();
        assert!(validate(&issue).is_ok());
    }

    #[test]
    fn timer_gate_without_timeout_fails() {
        let mut issue = IssueBuilder::new("Wait")
            .issue_type(IssueType::Gate)
            .build();
        issue
            .set_metadata(&GateMeta {
                await_type: AwaitType::Timer,
                ..Default::default()
            })
            .unwrap();
        assert!(matches!(
            validate(&issue),
            Err(ValidationError::TimerWithoutTimeout)
        ));
    }

    #[test]
    fn import_trusts_custom_types() {
        let issue = IssueBuilder::new("From elsewhere")
            .issue_type(IssueType::Custom("convoy".into()))
            .build();
        assert!(validate_for_import(&issue, &[]).is_ok());
    }

    fn decision_meta() -> DecisionMeta {
        DecisionMeta {
            prompt: "Pick one".into(),
            options: vec![DecisionOption {
                id: "a".into(),
                label: "A".into(),
                description: String::new(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn decision_response_rules() {
        let meta = decision_meta();
        assert!(matches!(
            validate_decision_response(&meta, "", ""),
            Err(ValidationError::EmptyDecisionResponse)
        ));
        assert!(matches!(
            validate_decision_response(&meta, "z", ""),
            Err(ValidationError::UnknownDecisionOption(_))
        ));
        assert!(validate_decision_response(&meta, "a", "").is_ok());
        assert!(validate_decision_response(&meta, "", "free text").is_ok());
        assert!(validate_decision_response(&meta, "a", "both").is_ok());

        let mut responded = decision_meta();
        responded.selected = "a".into();
        responded.responded_at = Some(chrono::Utc::now());
        assert!(matches!(
            validate_decision_response(&responded, "a", ""),
            Err(ValidationError::DecisionAlreadyResponded)
        ));
    }
}
