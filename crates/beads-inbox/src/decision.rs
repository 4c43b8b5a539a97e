//! Decision points: gates resolved by a human choice.
//!
//! Create appends a decision-typed issue carrying [`DecisionMeta`].
//! Respond runs in a strict order: (1) resolve in the database, (2) push
//! the inbox notification, (3) only then may the caller fire the
//! DecisionResponded hook. Firing earlier can wake the agent before the
//! message exists.

use chrono::Utc;
use tracing::debug;

use beads_core::enums::{IssueType, Status};
use beads_core::inbox::InboxMessage;
use beads_core::issue::{Issue, IssueBuilder};
use beads_core::metadata::{DecisionMeta, DecisionOption};
use beads_core::validation::validate_decision_response;
use beads_storage::{IssueUpdates, Storage, StorageError};

use crate::Result;

/// Creates a decision point issue.
pub fn create_decision(
    store: &dyn Storage,
    id: &str,
    title: &str,
    prompt: &str,
    options: Vec<DecisionOption>,
    default: &str,
    requested_by: &str,
    actor: &str,
) -> Result<Issue> {
    let meta = DecisionMeta {
        prompt: prompt.to_string(),
        options,
        default: default.to_string(),
        requested_by: requested_by.to_string(),
        ..Default::default()
    };

    let mut issue = IssueBuilder::new(title)
        .id(id)
        .issue_type(IssueType::Decision)
        .created_by(actor)
        .build();
    issue.set_metadata(&meta)?;

    store.create_issue(&issue, actor)?;
    debug!(id, requested_by, "decision created");
    store.get_issue(id).map_err(Into::into)
}

/// The recorded response, returned so the caller can fire the hook (step 3).
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionResponse {
    pub decision_id: String,
    pub selected: String,
    pub text: String,
    pub requested_by: String,
}

/// Responds to a decision point.
///
/// Validation: exactly one of `selected`/`text` (or both) non-empty,
/// `selected` must name an option, and a decision answers only once.
pub fn respond(
    store: &dyn Storage,
    decision_id: &str,
    selected: &str,
    text: &str,
    responded_by: &str,
) -> Result<DecisionResponse> {
    let issue = store.get_issue(decision_id)?;
    if issue.issue_type != IssueType::Decision {
        return Err(StorageError::validation(format!(
            "{decision_id} is not a decision (type: {})",
            issue.issue_type
        ))
        .into());
    }
    if issue.status == Status::Closed {
        return Err(StorageError::validation(format!(
            "decision {decision_id} is already resolved"
        ))
        .into());
    }

    let mut meta = DecisionMeta::from_issue(&issue).unwrap_or_default();
    validate_decision_response(&meta, selected, text)?;

    meta.selected = selected.to_string();
    meta.text = text.to_string();
    meta.responded_at = Some(Utc::now());
    meta.responded_by = responded_by.to_string();

    // Step 1: database resolve -- metadata update and close in one
    // transaction.
    let meta_json = serde_json::to_string(&meta)?;
    store.run_in_transaction(&|tx| {
        let updates = IssueUpdates {
            metadata: Some(Some(meta_json.clone())),
            ..Default::default()
        };
        tx.update_issue(decision_id, &updates, responded_by)?;
        tx.close_issue(
            decision_id,
            &format!("responded: {}", if selected.is_empty() { text } else { selected }),
            responded_by,
            "",
        )?;
        Ok(())
    })?;

    // Step 2: inbox push to the requester.
    if !meta.requested_by.is_empty() {
        let mut msg = InboxMessage::new(
            meta.requested_by.clone(),
            format!(
                "decision {decision_id} answered by {responded_by}: {}",
                if selected.is_empty() { text } else { selected }
            ),
            format!("decision:{decision_id}"),
        );
        msg.msg_type = "decision".into();
        msg.source = decision_id.to_string();
        msg.priority = 1;
        store.inbox_push(&msg)?;
    }

    debug!(decision_id, selected, "decision responded");
    // Step 3 (hook fire) belongs to the caller, strictly after this return.
    Ok(DecisionResponse {
        decision_id: decision_id.to_string(),
        selected: selected.to_string(),
        text: text.to_string(),
        requested_by: meta.requested_by,
    })
}

/// Decisions awaiting a response.
pub fn list_pending(store: &dyn Storage) -> Result<Vec<Issue>> {
    Ok(store
        .open_gates()?
        .into_iter()
        .filter(|i| i.issue_type == IssueType::Decision)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::dependency::Dependency;
    use beads_core::enums::DependencyType;
    use beads_core::filter::WorkFilter;
    use beads_core::issue::IssueBuilder;
    use beads_storage::SqliteStore;

    fn options() -> Vec<DecisionOption> {
        vec![
            DecisionOption {
                id: "a".into(),
                label: "ship".into(),
                description: String::new(),
            },
            DecisionOption {
                id: "b".into(),
                label: "hold".into(),
                description: String::new(),
            },
        ]
    }

    fn store_with_decision() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        create_decision(
            &store,
            "bd-dec1",
            "Ship the release?",
            "CI is green; ship now?",
            options(),
            "a",
            "mayor",
            "mayor",
        )
        .unwrap();
        store
    }

    #[test]
    fn create_then_respond_closes_and_notifies() {
        let store = store_with_decision();
        assert_eq!(list_pending(&store).unwrap().len(), 1);

        let response = respond(&store, "bd-dec1", "a", "", "human").unwrap();
        assert_eq!(response.selected, "a");
        assert_eq!(response.requested_by, "mayor");

        // Closed and recorded.
        let issue = store.get_issue("bd-dec1").unwrap();
        assert_eq!(issue.status, Status::Closed);
        let meta = DecisionMeta::from_issue(&issue).unwrap();
        assert!(meta.is_responded());
        assert_eq!(meta.responded_by, "human");

        // Inbox push with the canonical dedup key.
        let pending = store.inbox_undelivered("mayor").unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].dedup_key, "decision:bd-dec1");

        assert!(list_pending(&store).unwrap().is_empty());
    }

    #[test]
    fn empty_response_is_invalid() {
        let store = store_with_decision();
        assert!(respond(&store, "bd-dec1", "", "", "human").is_err());
        // Still open.
        assert_eq!(list_pending(&store).unwrap().len(), 1);
    }

    #[test]
    fn unknown_option_is_invalid() {
        let store = store_with_decision();
        assert!(respond(&store, "bd-dec1", "zzz", "", "human").is_err());
    }

    #[test]
    fn text_only_response_is_valid() {
        let store = store_with_decision();
        let response = respond(&store, "bd-dec1", "", "do neither, wait a week", "human").unwrap();
        assert!(response.selected.is_empty());
        assert_eq!(response.text, "do neither, wait a week");
    }

    #[test]
    fn response_is_final() {
        let store = store_with_decision();
        respond(&store, "bd-dec1", "a", "", "human").unwrap();
        assert!(respond(&store, "bd-dec1", "b", "", "human").is_err());
    }

    #[test]
    fn downstream_unblocks_on_response() {
        let store = store_with_decision();
        let task = IssueBuilder::new("Blocked on the call").id("bd-task").build();
        store.create_issue(&task, "mayor").unwrap();
        store
            .add_dependency(
                &Dependency::new("bd-task", "bd-dec1", DependencyType::Blocks, "mayor"),
                "mayor",
            )
            .unwrap();

        let ready: Vec<String> = store
            .get_ready_work(&WorkFilter::default())
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert!(!ready.contains(&"bd-task".to_string()));

        respond(&store, "bd-dec1", "a", "", "human").unwrap();

        let ready: Vec<String> = store
            .get_ready_work(&WorkFilter::default())
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert!(ready.contains(&"bd-task".to_string()));
    }
}
