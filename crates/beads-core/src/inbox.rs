//! Inbox message type -- per-agent-name mailbox rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A directed notification addressed to an agent name.
///
/// `dedup_key` is unique in the database; inserting a duplicate is a silent
/// no-op, which makes producer retries idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxMessage {
    /// Database row id; 0 until persisted.
    #[serde(default)]
    pub id: i64,

    /// Routing address: a stable agent name, not a session id.
    pub agent_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rig: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_id: String,

    /// Message kind (alert, decision, gate, mail, ...).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub msg_type: String,

    /// Producer identity.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,

    pub content: String,

    /// Priority 0-4, 0 highest. Priority 0 is never dropped by the drain cap.
    #[serde(default)]
    pub priority: i32,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Idempotency key, unique per database.
    pub dedup_key: String,
}

impl InboxMessage {
    /// Creates an undelivered message addressed to `agent_name`.
    pub fn new(
        agent_name: impl Into<String>,
        content: impl Into<String>,
        dedup_key: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            agent_name: agent_name.into(),
            rig: String::new(),
            session_id: String::new(),
            msg_type: String::new(),
            source: String::new(),
            content: content.into(),
            priority: 2,
            created_at: Utc::now(),
            delivered_at: None,
            expires_at: None,
            dedup_key: dedup_key.into(),
        }
    }

    /// Returns `true` if the message has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbox_message_serde_roundtrip() {
        let msg = InboxMessage {
            msg_type: "alert".into(),
            source: "ci".into(),
            priority: 0,
            ..InboxMessage::new("mayor", "ci failed", "alert:ci:1")
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: InboxMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.agent_name, "mayor");
        assert_eq!(back.dedup_key, "alert:ci:1");
        assert_eq!(back.priority, 0);
        assert!(back.delivered_at.is_none());
    }

    #[test]
    fn expiry_check() {
        let mut msg = InboxMessage::new("mayor", "x", "k");
        let now = Utc::now();
        assert!(!msg.is_expired(now));
        msg.expires_at = Some(now - chrono::Duration::seconds(1));
        assert!(msg.is_expired(now));
        msg.expires_at = Some(now + chrono::Duration::seconds(60));
        assert!(!msg.is_expired(now));
    }
}
