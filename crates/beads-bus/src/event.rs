//! The lifecycle event taxonomy and event envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// The fixed set of lifecycle events the bus dispatches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HookEventType {
    SessionStart,
    SessionEnd,
    Stop,
    PreCompact,
    PreToolUse,
    PostToolUse,
    UserPromptSubmit,
    SubagentStart,
    SubagentStop,
    DecisionCreated,
    DecisionResponded,
    DecisionEscalated,
    DecisionExpired,
    BeadStatusChanged,
    WorkCompleted,
    MailSent,
    GateCreated,
    GateResolved,
    JobStarted,
    JobFinished,
    /// Catch-all for events from newer peers.
    Other(String),
}

impl HookEventType {
    /// Returns the wire name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::SessionStart => "SessionStart",
            Self::SessionEnd => "SessionEnd",
            Self::Stop => "Stop",
            Self::PreCompact => "PreCompact",
            Self::PreToolUse => "PreToolUse",
            Self::PostToolUse => "PostToolUse",
            Self::UserPromptSubmit => "UserPromptSubmit",
            Self::SubagentStart => "SubagentStart",
            Self::SubagentStop => "SubagentStop",
            Self::DecisionCreated => "DecisionCreated",
            Self::DecisionResponded => "DecisionResponded",
            Self::DecisionEscalated => "DecisionEscalated",
            Self::DecisionExpired => "DecisionExpired",
            Self::BeadStatusChanged => "BeadStatusChanged",
            Self::WorkCompleted => "WorkCompleted",
            Self::MailSent => "MailSent",
            Self::GateCreated => "GateCreated",
            Self::GateResolved => "GateResolved",
            Self::JobStarted => "JobStarted",
            Self::JobFinished => "JobFinished",
            Self::Other(s) => s.as_str(),
        }
    }
}

impl From<&str> for HookEventType {
    fn from(s: &str) -> Self {
        match s {
            "SessionStart" => Self::SessionStart,
            "SessionEnd" => Self::SessionEnd,
            "Stop" => Self::Stop,
            "PreCompact" => Self::PreCompact,
            "PreToolUse" => Self::PreToolUse,
            "PostToolUse" => Self::PostToolUse,
            "UserPromptSubmit" => Self::UserPromptSubmit,
            "SubagentStart" => Self::SubagentStart,
            "SubagentStop" => Self::SubagentStop,
            "DecisionCreated" => Self::DecisionCreated,
            "DecisionResponded" => Self::DecisionResponded,
            "DecisionEscalated" => Self::DecisionEscalated,
            "DecisionExpired" => Self::DecisionExpired,
            "BeadStatusChanged" => Self::BeadStatusChanged,
            "WorkCompleted" => Self::WorkCompleted,
            "MailSent" => Self::MailSent,
            "GateCreated" => Self::GateCreated,
            "GateResolved" => Self::GateResolved,
            "JobStarted" => Self::JobStarted,
            "JobFinished" => Self::JobFinished,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for HookEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for HookEventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HookEventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

/// One lifecycle event travelling through the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookEvent {
    pub event_type: HookEventType,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub agent_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rig: String,

    /// Event-specific payload.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl HookEvent {
    /// Creates an event for a session.
    pub fn new(event_type: HookEventType, session_id: impl Into<String>) -> Self {
        Self {
            event_type,
            session_id: session_id.into(),
            agent_name: String::new(),
            rig: String::new(),
            payload: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_agent(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = agent_name.into();
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_roundtrip() {
        for name in ["SessionStart", "Stop", "DecisionResponded", "GateResolved"] {
            let parsed = HookEventType::from(name);
            assert_eq!(parsed.as_str(), name);
        }
    }

    #[test]
    fn unknown_event_preserved() {
        let parsed = HookEventType::from("FutureEvent");
        assert_eq!(parsed, HookEventType::Other("FutureEvent".into()));
        assert_eq!(parsed.as_str(), "FutureEvent");
    }

    #[test]
    fn event_serde_roundtrip() {
        let event = HookEvent::new(HookEventType::Stop, "sess-1")
            .with_agent("mayor")
            .with_payload(serde_json::json!({"reason": "idle"}));
        let json = serde_json::to_string(&event).unwrap();
        let back: HookEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type, HookEventType::Stop);
        assert_eq!(back.agent_name, "mayor");
        assert_eq!(back.payload["reason"], "idle");
    }
}
