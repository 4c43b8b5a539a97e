//! The mandatory built-in handlers.
//!
//! Priorities are fixed: 14 StopLoopDetector, 15 StopDecisionHandler,
//! 20 GateHandler, 30 InboxDrainHandler. Each built-in reaches its
//! subsystem (decisions, gates, inbox) through a backend trait the daemon
//! implements, which keeps this crate free of storage dependencies.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::Result;
use crate::event::{HookEvent, HookEventType};
use crate::handler::{Handler, HandlerResult};

// ---------------------------------------------------------------------------
// Backend seams
// ---------------------------------------------------------------------------

/// Decision operations the StopDecisionHandler needs.
pub trait DecisionBackend: Send + Sync {
    /// Is a decision already pending for this session?
    fn has_pending_decision(&self, session_id: &str) -> bool;

    /// Creates a stop decision; returns the new decision id.
    fn create_stop_decision(&self, event: &HookEvent) -> std::result::Result<String, String>;
}

/// One unresolved gate as seen by the GateHandler.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedGate {
    pub id: String,
    pub description: String,
    /// Strict gates block; soft gates warn.
    pub strict: bool,
}

/// Gate evaluation the GateHandler needs.
pub trait GateBackend: Send + Sync {
    /// All gates unresolved for this event (session markers + DB gates).
    fn unresolved_gates(&self, event: &HookEvent) -> Vec<UnresolvedGate>;
}

/// Inbox operations the InboxDrainHandler needs.
pub trait InboxBackend: Send + Sync {
    /// Drains the local buffer, returning wrapped notification blocks.
    fn drain(&self, event: &HookEvent) -> std::result::Result<Vec<String>, String>;

    /// Merges database undelivereds into the buffer (SessionStart only).
    fn reconcile(&self, event: &HookEvent) -> std::result::Result<(), String>;
}

// ---------------------------------------------------------------------------
// StopLoopDetector (priority 14)
// ---------------------------------------------------------------------------

/// Detects an agent looping on Stop: too many Stop events for one session
/// inside a short window sets a break flag so downstream handlers stand
/// aside and the agent actually stops.
pub struct StopLoopDetector {
    window: Duration,
    threshold: usize,
    seen: Mutex<HashMap<String, Vec<Instant>>>,
}

impl StopLoopDetector {
    pub fn new() -> Self {
        Self {
            window: Duration::from_secs(60),
            threshold: 3,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` when the loop break flag is set for a session.
    pub fn is_breaking(&self, session_id: &str) -> bool {
        let seen = self.seen.lock().unwrap();
        seen.get(session_id)
            .map(|hits| hits.len() >= self.threshold)
            .unwrap_or(false)
    }
}

impl Default for StopLoopDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler for StopLoopDetector {
    fn id(&self) -> &str {
        "stop-loop-detector"
    }

    fn handled_events(&self) -> Vec<HookEventType> {
        vec![HookEventType::Stop]
    }

    fn priority(&self) -> i32 {
        14
    }

    fn handle(&self, event: &HookEvent) -> Result<HandlerResult> {
        let now = Instant::now();
        let mut seen = self.seen.lock().unwrap();
        let hits = seen.entry(event.session_id.clone()).or_default();
        hits.retain(|t| now.duration_since(*t) < self.window);
        hits.push(now);

        if hits.len() >= self.threshold {
            return Ok(HandlerResult {
                warnings: vec![format!(
                    "stop loop detected for session {} ({} stops in {}s); break flag set",
                    event.session_id,
                    hits.len(),
                    self.window.as_secs()
                )],
                ..Default::default()
            });
        }
        Ok(HandlerResult::pass())
    }
}

// ---------------------------------------------------------------------------
// StopDecisionHandler (priority 15)
// ---------------------------------------------------------------------------

/// On Stop, when configured and no decision is pending, creates one and
/// injects the instruction block telling the agent to wait for it.
pub struct StopDecisionHandler<B: DecisionBackend> {
    backend: B,
    enabled: bool,
}

impl<B: DecisionBackend> StopDecisionHandler<B> {
    pub fn new(backend: B, enabled: bool) -> Self {
        Self { backend, enabled }
    }
}

impl<B: DecisionBackend> Handler for StopDecisionHandler<B> {
    fn id(&self) -> &str {
        "stop-decision"
    }

    fn handled_events(&self) -> Vec<HookEventType> {
        vec![HookEventType::Stop]
    }

    fn priority(&self) -> i32 {
        15
    }

    fn handle(&self, event: &HookEvent) -> Result<HandlerResult> {
        if !self.enabled || self.backend.has_pending_decision(&event.session_id) {
            return Ok(HandlerResult::pass());
        }
        match self.backend.create_stop_decision(event) {
            Ok(decision_id) => Ok(HandlerResult {
                inject: vec![format!(
                    "A decision point ({decision_id}) was created for this stop. \
                     Wait for a response before ending the session."
                )],
                ..Default::default()
            }),
            Err(message) => Err(crate::BusError::Handler {
                id: self.id().to_string(),
                message,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// GateHandler (priority 20)
// ---------------------------------------------------------------------------

/// Evaluates session and DB gates for the event: strict gates block, soft
/// gates warn.
pub struct GateHandler<B: GateBackend> {
    backend: B,
}

impl<B: GateBackend> GateHandler<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

impl<B: GateBackend> Handler for GateHandler<B> {
    fn id(&self) -> &str {
        "gate"
    }

    fn handled_events(&self) -> Vec<HookEventType> {
        vec![
            HookEventType::Stop,
            HookEventType::SessionEnd,
            HookEventType::SubagentStop,
        ]
    }

    fn priority(&self) -> i32 {
        20
    }

    fn handle(&self, event: &HookEvent) -> Result<HandlerResult> {
        let mut result = HandlerResult::pass();
        for gate in self.backend.unresolved_gates(event) {
            if gate.strict {
                result.merge(HandlerResult::blocked(format!(
                    "gate {} unresolved: {}",
                    gate.id, gate.description
                )));
            } else {
                result
                    .warnings
                    .push(format!("gate {} unresolved: {}", gate.id, gate.description));
            }
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// InboxDrainHandler (priority 30)
// ---------------------------------------------------------------------------

/// Drains the local inbox buffer into inject blocks; on SessionStart it
/// first reconciles the buffer with the database.
pub struct InboxDrainHandler<B: InboxBackend> {
    backend: B,
}

impl<B: InboxBackend> InboxDrainHandler<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

impl<B: InboxBackend> Handler for InboxDrainHandler<B> {
    fn id(&self) -> &str {
        "inbox-drain"
    }

    fn handled_events(&self) -> Vec<HookEventType> {
        vec![
            HookEventType::SessionStart,
            HookEventType::Stop,
            HookEventType::UserPromptSubmit,
        ]
    }

    fn priority(&self) -> i32 {
        30
    }

    fn handle(&self, event: &HookEvent) -> Result<HandlerResult> {
        if event.event_type == HookEventType::SessionStart {
            if let Err(message) = self.backend.reconcile(event) {
                return Err(crate::BusError::Handler {
                    id: self.id().to_string(),
                    message,
                });
            }
        }
        match self.backend.drain(event) {
            Ok(blocks) => Ok(HandlerResult {
                inject: blocks,
                ..Default::default()
            }),
            Err(message) => Err(crate::BusError::Handler {
                id: self.id().to_string(),
                message,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[test]
    fn stop_loop_detector_sets_break_flag() {
        let detector = StopLoopDetector::new();
        let event = HookEvent::new(HookEventType::Stop, "sess-loop");

        assert!(detector.handle(&event).unwrap().warnings.is_empty());
        assert!(detector.handle(&event).unwrap().warnings.is_empty());
        assert!(!detector.is_breaking("sess-loop"));

        let third = detector.handle(&event).unwrap();
        assert!(!third.warnings.is_empty());
        assert!(detector.is_breaking("sess-loop"));
        assert!(!detector.is_breaking("other-session"));
    }

    struct FakeDecisions {
        pending: AtomicBool,
        created: AtomicUsize,
    }

    impl DecisionBackend for &FakeDecisions {
        fn has_pending_decision(&self, _session_id: &str) -> bool {
            self.pending.load(Ordering::SeqCst)
        }
        fn create_stop_decision(&self, _event: &HookEvent) -> std::result::Result<String, String> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok("bd-dec1".into())
        }
    }

    #[test]
    fn stop_decision_creates_once() {
        let backend = FakeDecisions {
            pending: AtomicBool::new(false),
            created: AtomicUsize::new(0),
        };
        let handler = StopDecisionHandler::new(&backend, true);
        let event = HookEvent::new(HookEventType::Stop, "s1");

        let result = handler.handle(&event).unwrap();
        assert_eq!(result.inject.len(), 1);
        assert!(result.inject[0].contains("bd-dec1"));
        assert_eq!(backend.created.load(Ordering::SeqCst), 1);

        // Pending decision short-circuits.
        backend.pending.store(true, Ordering::SeqCst);
        let result = handler.handle(&event).unwrap();
        assert!(result.inject.is_empty());
        assert_eq!(backend.created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_decision_disabled_is_a_pass() {
        let backend = FakeDecisions {
            pending: AtomicBool::new(false),
            created: AtomicUsize::new(0),
        };
        let handler = StopDecisionHandler::new(&backend, false);
        let result = handler
            .handle(&HookEvent::new(HookEventType::Stop, "s1"))
            .unwrap();
        assert_eq!(result, HandlerResult::pass());
        assert_eq!(backend.created.load(Ordering::SeqCst), 0);
    }

    struct FakeGates(Vec<UnresolvedGate>);

    impl GateBackend for FakeGates {
        fn unresolved_gates(&self, _event: &HookEvent) -> Vec<UnresolvedGate> {
            self.0.clone()
        }
    }

    #[test]
    fn strict_gates_block_soft_gates_warn() {
        let handler = GateHandler::new(FakeGates(vec![
            UnresolvedGate {
                id: "bd-g1".into(),
                description: "waiting on CI".into(),
                strict: true,
            },
            UnresolvedGate {
                id: "bd-g2".into(),
                description: "optional review".into(),
                strict: false,
            },
        ]));
        let result = handler
            .handle(&HookEvent::new(HookEventType::Stop, "s1"))
            .unwrap();
        assert!(result.block);
        assert!(result.reason.as_deref().unwrap().contains("bd-g1"));
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("bd-g2"));
    }

    struct FakeInbox {
        reconciled: AtomicUsize,
    }

    impl InboxBackend for &FakeInbox {
        fn drain(&self, _event: &HookEvent) -> std::result::Result<Vec<String>, String> {
            Ok(vec!["<notification>ci failed</notification>".into()])
        }
        fn reconcile(&self, _event: &HookEvent) -> std::result::Result<(), String> {
            self.reconciled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn inbox_drain_reconciles_only_on_session_start() {
        let backend = FakeInbox {
            reconciled: AtomicUsize::new(0),
        };
        let handler = InboxDrainHandler::new(&backend);

        let result = handler
            .handle(&HookEvent::new(HookEventType::SessionStart, "s1"))
            .unwrap();
        assert_eq!(result.inject.len(), 1);
        assert_eq!(backend.reconciled.load(Ordering::SeqCst), 1);

        handler
            .handle(&HookEvent::new(HookEventType::Stop, "s1"))
            .unwrap();
        assert_eq!(backend.reconciled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn builtin_priorities_are_fixed() {
        assert_eq!(StopLoopDetector::new().priority(), 14);
        let decisions = FakeDecisions {
            pending: AtomicBool::new(false),
            created: AtomicUsize::new(0),
        };
        assert_eq!(StopDecisionHandler::new(&decisions, true).priority(), 15);
        assert_eq!(GateHandler::new(FakeGates(vec![])).priority(), 20);
        let inbox = FakeInbox {
            reconciled: AtomicUsize::new(0),
        };
        assert_eq!(InboxDrainHandler::new(&inbox).priority(), 30);
    }
}
