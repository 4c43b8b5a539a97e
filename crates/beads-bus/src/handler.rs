//! Handler contract and result aggregation.

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::event::{HookEvent, HookEventType};

/// What one handler (or the whole chain) decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HandlerResult {
    /// Block the triggering event (e.g. refuse an agent "stop").
    #[serde(default)]
    pub block: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Text blocks injected into the agent's context, in chain order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inject: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl HandlerResult {
    /// A result that neither blocks nor says anything.
    pub fn pass() -> Self {
        Self::default()
    }

    /// A blocking result with a reason.
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self {
            block: true,
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    /// Folds another handler's result into the aggregate: block = OR,
    /// inject and warnings concatenate in chain order, the first blocking
    /// reason wins.
    pub fn merge(&mut self, other: HandlerResult) {
        if other.block {
            self.block = true;
            if self.reason.is_none() {
                self.reason = other.reason;
            }
        }
        self.inject.extend(other.inject);
        self.warnings.extend(other.warnings);
    }
}

/// A registered event handler.
///
/// Handlers declare which events they care about and a priority; lower
/// priorities run first. Handlers sharing a priority run in undefined
/// relative order.
pub trait Handler: Send + Sync {
    /// Stable handler id, used in error reporting.
    fn id(&self) -> &str;

    /// Event types this handler receives.
    fn handled_events(&self) -> Vec<HookEventType>;

    /// Chain position; lower runs first.
    fn priority(&self) -> i32;

    /// Handles one event.
    fn handle(&self, event: &HookEvent) -> Result<HandlerResult>;

    /// Returns `true` if this handler wants the given event.
    fn handles(&self, event_type: &HookEventType) -> bool {
        self.handled_events().contains(event_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_aggregates_block_or() {
        let mut agg = HandlerResult::pass();
        agg.merge(HandlerResult::pass());
        assert!(!agg.block);

        agg.merge(HandlerResult::blocked("gate open"));
        assert!(agg.block);
        assert_eq!(agg.reason.as_deref(), Some("gate open"));

        // A later block does not overwrite the first reason.
        agg.merge(HandlerResult::blocked("second"));
        assert_eq!(agg.reason.as_deref(), Some("gate open"));
    }

    #[test]
    fn merge_concatenates_in_order() {
        let mut agg = HandlerResult::pass();
        agg.merge(HandlerResult {
            inject: vec!["first".into()],
            warnings: vec!["w1".into()],
            ..Default::default()
        });
        agg.merge(HandlerResult {
            inject: vec!["second".into()],
            ..Default::default()
        });
        assert_eq!(agg.inject, vec!["first", "second"]);
        assert_eq!(agg.warnings, vec!["w1"]);
    }

    #[test]
    fn result_serde_roundtrip() {
        let result = HandlerResult {
            block: true,
            reason: Some("nope".into()),
            inject: vec!["ctx".into()],
            warnings: vec![],
        };
        let json = serde_json::to_string(&result).unwrap();
        let back: HandlerResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn empty_stdout_parses_as_pass() {
        // External handlers may print nothing meaningful; defaults apply.
        let parsed: HandlerResult = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, HandlerResult::pass());
    }
}
