//! Typed metadata sub-schemas carried in the issue metadata blob.
//!
//! The issue row stores metadata as opaque JSON; gate, decision, advice and
//! formula issues parse it into one of these structs. Keeping the blob opaque
//! in storage keeps the canonical serialization (and therefore the content
//! hash) stable across schema additions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::AwaitType;
use crate::issue::Issue;

/// Helper for `skip_serializing_if` on `Vec` fields.
fn is_empty_vec<T>(v: &Vec<T>) -> bool {
    v.is_empty()
}

// ===========================================================================
// Gates
// ===========================================================================

/// Metadata for `gate` issues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GateMeta {
    /// What the gate waits on.
    #[serde(default, skip_serializing_if = "AwaitType::is_default")]
    pub await_type: AwaitType,

    /// Identifier of the awaited thing (run id, PR number, bead id, ...).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub await_id: String,

    /// Max wait before a timer gate resolves, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Agent names notified when the gate resolves.
    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub waiters: Vec<String>,
}

impl GateMeta {
    /// Parses gate metadata out of an issue's blob.
    pub fn from_issue(issue: &Issue) -> Option<Self> {
        let raw = issue.metadata.as_ref()?;
        serde_json::from_str(raw.get()).ok()
    }

    /// Returns the deadline for a timer gate, if one is defined.
    pub fn deadline(&self, created_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let secs = self.timeout_secs?;
        Some(created_at + chrono::Duration::seconds(secs as i64))
    }
}

// ===========================================================================
// Decisions
// ===========================================================================

/// One selectable option on a decision point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionOption {
    pub id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Metadata for `decision` issues (gates resolved by a human choice).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DecisionMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prompt: String,

    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub options: Vec<DecisionOption>,

    /// Option id applied when the decision expires unanswered.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default: String,

    /// Agent that asked for the decision; receives the response notification.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub requested_by: String,

    // -- Response (set exactly once) ----------------------------------------
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub selected: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub responded_by: String,
}

impl DecisionMeta {
    /// Parses decision metadata out of an issue's blob.
    pub fn from_issue(issue: &Issue) -> Option<Self> {
        let raw = issue.metadata.as_ref()?;
        serde_json::from_str(raw.get()).ok()
    }

    /// Returns `true` once a response has been recorded. Responses are final.
    pub fn is_responded(&self) -> bool {
        self.responded_at.is_some()
    }

    /// Returns `true` if `selected` names one of the configured options.
    pub fn has_option(&self, selected: &str) -> bool {
        self.options.iter().any(|o| o.id == selected)
    }
}

// ===========================================================================
// Advice
// ===========================================================================

/// Metadata for `advice` issues. Targeting is advice-side only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AdviceMeta {
    /// Agent names or role names this advice applies to; empty = everyone.
    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub targets: Vec<String>,
}

// ===========================================================================
// Formulas
// ===========================================================================

/// One step of a formula definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaStep {
    pub title: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Titles of steps this step depends on (becomes `blocks` edges when the
    /// formula is materialized).
    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub needs: Vec<String>,
}

/// Metadata for `formula` issues (workflow templates).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FormulaMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub formula_name: String,

    #[serde(default, skip_serializing_if = "is_empty_vec")]
    pub steps: Vec<FormulaStep>,
}

impl FormulaMeta {
    /// Parses formula metadata out of an issue's blob.
    pub fn from_issue(issue: &Issue) -> Option<Self> {
        let raw = issue.metadata.as_ref()?;
        serde_json::from_str(raw.get()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::IssueType;
    use crate::issue::IssueBuilder;

    #[test]
    fn gate_meta_roundtrip_through_issue() {
        let mut issue = IssueBuilder::new("Wait for CI")
            .issue_type(IssueType::Gate)
            .build();
        issue
            .set_metadata(&GateMeta {
                await_type: AwaitType::GhRun,
                await_id: "12345".into(),
                timeout_secs: Some(3600),
                waiters: vec!["mayor".into()],
            })
            .unwrap();

        let meta = GateMeta::from_issue(&issue).unwrap();
        assert_eq!(meta.await_type, AwaitType::GhRun);
        assert_eq!(meta.await_id, "12345");
        assert_eq!(meta.waiters, vec!["mayor"]);
    }

    #[test]
    fn timer_deadline() {
        let created = Utc::now();
        let meta = GateMeta {
            await_type: AwaitType::Timer,
            timeout_secs: Some(60),
            ..Default::default()
        };
        let deadline = meta.deadline(created).unwrap();
        assert_eq!(deadline - created, chrono::Duration::seconds(60));

        let no_timeout = GateMeta::default();
        assert!(no_timeout.deadline(created).is_none());
    }

    #[test]
    fn decision_meta_option_lookup() {
        let meta = DecisionMeta {
            prompt: "Ship it?".into(),
            options: vec![
                DecisionOption {
                    id: "a".into(),
                    label: "yes".into(),
                    description: String::new(),
                },
                DecisionOption {
                    id: "b".into(),
                    label: "no".into(),
                    description: String::new(),
                },
            ],
            default: "a".into(),
            ..Default::default()
        };
        assert!(meta.has_option("a"));
        assert!(!meta.has_option("c"));
        assert!(!meta.is_responded());
    }

    #[test]
    fn decision_response_is_recorded() {
        let mut meta = DecisionMeta::default();
        meta.selected = "a".into();
        meta.responded_at = Some(Utc::now());
        meta.responded_by = "human".into();
        assert!(meta.is_responded());
    }

    #[test]
    fn formula_meta_serde() {
        let meta = FormulaMeta {
            formula_name: "release".into(),
            steps: vec![FormulaStep {
                title: "tag".into(),
                description: String::new(),
                needs: vec!["test".into()],
            }],
        };
        let json = serde_json::to_string(&meta).unwrap();
        let back: FormulaMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(back.steps[0].needs, vec!["test"]);
    }
}
