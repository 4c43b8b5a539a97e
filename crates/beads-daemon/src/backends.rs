//! Bridges from the built-in bus handlers to the daemon's subsystems.
//!
//! The bus crate defines backend traits so it stays free of storage
//! dependencies; this module implements them over the daemon context and
//! wires the four mandatory built-ins (plus the external registry) into
//! the chain.

use std::sync::Arc;

use beads_bus::builtin::{
    DecisionBackend, GateBackend, GateHandler, InboxBackend, InboxDrainHandler, StopDecisionHandler,
    StopLoopDetector, UnresolvedGate,
};
use beads_bus::event::HookEvent;
use beads_bus::external::reload_external_handlers;
use beads_core::enums::IssueType;
use beads_core::metadata::DecisionOption;
use beads_inbox::gates::SessionGates;
use beads_inbox::{MergeBuffer, decision, drain_session, reconcile};

use crate::context::DaemonContext;

/// Backend adapter owned by each built-in handler.
///
/// The context outlives the bus (both live for the daemon process), so the
/// Arc cycle context -> bus -> handler -> context is deliberate.
pub struct ContextBackend {
    ctx: Arc<DaemonContext>,
}

impl ContextBackend {
    pub fn new(ctx: Arc<DaemonContext>) -> Self {
        Self { ctx }
    }
}

impl DecisionBackend for ContextBackend {
    fn has_pending_decision(&self, _session_id: &str) -> bool {
        decision::list_pending(self.ctx.store.as_ref())
            .map(|pending| !pending.is_empty())
            .unwrap_or(false)
    }

    fn create_stop_decision(&self, event: &HookEvent) -> Result<String, String> {
        let requested_by = if event.agent_name.is_empty() {
            "operator"
        } else {
            &event.agent_name
        };
        let title = format!("Stop requested by session {}", event.session_id);
        let id = self
            .ctx
            .generate_issue_id(&title, "", requested_by)
            .map_err(|e| e.to_string())?;
        decision::create_decision(
            self.ctx.store.as_ref(),
            &id,
            &title,
            "The agent wants to stop. Let it?",
            vec![
                DecisionOption {
                    id: "stop".into(),
                    label: "Let the agent stop".into(),
                    description: String::new(),
                },
                DecisionOption {
                    id: "continue".into(),
                    label: "Keep working".into(),
                    description: String::new(),
                },
            ],
            "stop",
            requested_by,
            "daemon",
        )
        .map_err(|e| e.to_string())?;
        self.ctx.after_write(&[id.clone()]);
        Ok(id)
    }
}

impl GateBackend for ContextBackend {
    fn unresolved_gates(&self, event: &HookEvent) -> Vec<UnresolvedGate> {
        let mut unresolved = Vec::new();

        // Session gates: markers in the runtime directory.
        if !event.session_id.is_empty() {
            let session_gates = SessionGates::new(self.ctx.runtime.gates_dir(&event.session_id));
            if let Ok(gates) = session_gates.unresolved() {
                for gate in gates {
                    unresolved.push(UnresolvedGate {
                        id: gate.id,
                        description: gate.description,
                        strict: gate.strict,
                    });
                }
            }
        }

        // DB gates whose waiters include this agent block its stop.
        if let Ok(open) = self.ctx.store.open_gates() {
            for gate in open {
                if gate.issue_type != IssueType::Gate {
                    continue;
                }
                let meta = beads_core::metadata::GateMeta::from_issue(&gate).unwrap_or_default();
                let waiting_on_agent = meta.waiters.is_empty()
                    || meta.waiters.iter().any(|w| w == &event.agent_name);
                if waiting_on_agent {
                    unresolved.push(UnresolvedGate {
                        id: gate.id.clone(),
                        description: gate.title.clone(),
                        strict: true,
                    });
                }
            }
        }

        unresolved
    }
}

impl InboxBackend for ContextBackend {
    fn drain(&self, event: &HookEvent) -> Result<Vec<String>, String> {
        if event.agent_name.is_empty() || event.session_id.is_empty() {
            return Ok(Vec::new());
        }
        let buffer = MergeBuffer::new(self.ctx.runtime.inject_queue(&event.session_id));
        drain_session(
            self.ctx.store.as_ref(),
            &buffer,
            &event.agent_name,
            event.event_type == beads_bus::HookEventType::SessionStart,
            chrono::Utc::now(),
        )
        .map_err(|e| e.to_string())
    }

    fn reconcile(&self, event: &HookEvent) -> Result<(), String> {
        if event.agent_name.is_empty() || event.session_id.is_empty() {
            return Ok(());
        }
        let buffer = MergeBuffer::new(self.ctx.runtime.inject_queue(&event.session_id));
        reconcile(self.ctx.store.as_ref(), &buffer, &event.agent_name)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// Registers the mandatory built-ins and the external registry into the
/// context's bus.
pub fn install_handlers(ctx: &Arc<DaemonContext>) {
    let mut bus = ctx.bus.lock().unwrap();

    bus.register(Arc::new(StopLoopDetector::new()));
    bus.register(Arc::new(StopDecisionHandler::new(
        ContextBackend::new(ctx.clone()),
        ctx.config
            .extra
            .get("stop_decision")
            .is_some_and(|v| v == "true"),
    )));
    bus.register(Arc::new(GateHandler::new(ContextBackend::new(ctx.clone()))));
    bus.register(Arc::new(InboxDrainHandler::new(ContextBackend::new(
        ctx.clone(),
    ))));

    if let Ok(rows) = ctx.store.list_bus_handlers() {
        reload_external_handlers(&mut bus, &rows);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::init_test_workspace;
    use beads_bus::HookEventType;
    use beads_core::inbox::InboxMessage;
    use beads_core::issue::IssueBuilder;
    use beads_core::metadata::GateMeta;

    fn ctx() -> (tempfile::TempDir, Arc<DaemonContext>) {
        let dir = tempfile::tempdir().unwrap();
        let root = init_test_workspace(dir.path());
        let ctx = Arc::new(DaemonContext::open(&root).unwrap());
        (dir, ctx)
    }

    #[test]
    fn install_wires_builtins_in_priority_order() {
        let (_dir, ctx) = ctx();
        install_handlers(&ctx);
        let ids = ctx.bus.lock().unwrap().handler_ids();
        assert_eq!(
            ids,
            vec!["stop-loop-detector", "stop-decision", "gate", "inbox-drain"]
        );
    }

    #[test]
    fn stop_event_blocked_by_db_gate() {
        let (_dir, ctx) = ctx();
        install_handlers(&ctx);

        let mut gate = IssueBuilder::new("Wait for review")
            .id("tt-gate1")
            .issue_type(IssueType::Gate)
            .build();
        gate.set_metadata(&GateMeta {
            waiters: vec!["mayor".into()],
            ..Default::default()
        })
        .unwrap();
        ctx.store.create_issue(&gate, "mayor").unwrap();

        let event = HookEvent::new(HookEventType::Stop, "sess-1").with_agent("mayor");
        let outcome = ctx.bus.lock().unwrap().dispatch(&event);
        assert!(outcome.result.block);
        assert!(outcome.result.reason.unwrap().contains("tt-gate1"));
    }

    #[test]
    fn session_start_drains_inbox_through_chain() {
        let (_dir, ctx) = ctx();
        install_handlers(&ctx);

        ctx.store
            .inbox_push(&InboxMessage::new("mayor", "welcome back", "hello:1"))
            .unwrap();

        let event = HookEvent::new(HookEventType::SessionStart, "sess-1").with_agent("mayor");
        let outcome = ctx.bus.lock().unwrap().dispatch(&event);
        assert!(!outcome.result.block);
        assert_eq!(outcome.result.inject.len(), 1);
        assert!(outcome.result.inject[0].contains("welcome back"));

        // Drained exactly once.
        let again = ctx.bus.lock().unwrap().dispatch(&event);
        assert!(again.result.inject.is_empty());
    }
}
