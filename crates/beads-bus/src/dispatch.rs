//! Synchronous, prioritized handler dispatch.

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::event::HookEvent;
use crate::handler::{Handler, HandlerResult};
use crate::{BusError, Result};

/// Default per-handler timeout.
const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one dispatch: the aggregate result plus per-handler errors.
///
/// Handler errors never fail the dispatch; they are recorded here and the
/// chain continues.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub result: HandlerResult,
    pub errors: Vec<BusError>,
}

/// The in-daemon event bus: a prioritized chain of synchronous handlers.
pub struct EventBus {
    handlers: Vec<Arc<dyn Handler>>,
    handler_timeout: Duration,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    /// Overrides the per-handler timeout.
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Registers a handler; the chain re-sorts by priority.
    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.push(handler);
        // Stable sort: equal priorities keep registration order, but that
        // order is not contractual.
        self.handlers.sort_by_key(|h| h.priority());
    }

    /// Drops all handlers whose id satisfies the predicate. Used by the
    /// reload path to replace external handlers without restart.
    pub fn retain(&mut self, keep: impl Fn(&str) -> bool) {
        self.handlers.retain(|h| keep(h.id()));
    }

    /// Registered handler ids in chain order.
    pub fn handler_ids(&self) -> Vec<String> {
        self.handlers.iter().map(|h| h.id().to_string()).collect()
    }

    /// Dispatches one event through the chain.
    ///
    /// Sequential, in priority order. A handler error or timeout is
    /// recorded and the chain continues; even after a `block=true` the
    /// remaining handlers still run so they can add warnings. The aggregate
    /// blocks if any handler blocked.
    pub fn dispatch(&self, event: &HookEvent) -> DispatchOutcome {
        let mut aggregate = HandlerResult::pass();
        let mut errors = Vec::new();

        for handler in &self.handlers {
            if !handler.handles(&event.event_type) {
                continue;
            }
            debug!(handler = handler.id(), event = %event.event_type, "dispatching");
            match run_with_timeout(handler.clone(), event.clone(), self.handler_timeout) {
                Ok(result) => aggregate.merge(result),
                Err(e) => {
                    warn!(handler = handler.id(), error = %e, "handler failed");
                    errors.push(e);
                }
            }
        }

        DispatchOutcome {
            result: aggregate,
            errors,
        }
    }
}

/// Runs one handler under a timeout. A timeout counts as a handler error;
/// the abandoned thread finishes (or leaks) on its own without holding the
/// chain.
fn run_with_timeout(
    handler: Arc<dyn Handler>,
    event: HookEvent,
    timeout: Duration,
) -> Result<HandlerResult> {
    let id = handler.id().to_string();
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let result = handler.handle(&event);
        let _ = tx.send(result);
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(_) => Err(BusError::HandlerTimeout {
            id,
            seconds: timeout.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::HookEventType;
    use std::sync::Mutex;

    struct Recording {
        id: String,
        priority: i32,
        result: HandlerResult,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Handler for Recording {
        fn id(&self) -> &str {
            &self.id
        }
        fn handled_events(&self) -> Vec<HookEventType> {
            vec![HookEventType::Stop]
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn handle(&self, _event: &HookEvent) -> Result<HandlerResult> {
            self.log.lock().unwrap().push(self.id.clone());
            Ok(self.result.clone())
        }
    }

    fn recording(
        id: &str,
        priority: i32,
        result: HandlerResult,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Arc<dyn Handler> {
        Arc::new(Recording {
            id: id.into(),
            priority,
            result,
            log: log.clone(),
        })
    }

    #[test]
    fn priority_order_is_respected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.register(recording("late", 30, HandlerResult::pass(), &log));
        bus.register(recording("early", 10, HandlerResult::pass(), &log));
        bus.register(recording("middle", 20, HandlerResult::pass(), &log));

        bus.dispatch(&HookEvent::new(HookEventType::Stop, "s1"));
        assert_eq!(*log.lock().unwrap(), vec!["early", "middle", "late"]);
    }

    #[test]
    fn block_does_not_short_circuit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.register(recording("blocker", 10, HandlerResult::blocked("no"), &log));
        bus.register(recording(
            "warner",
            20,
            HandlerResult {
                warnings: vec!["heads up".into()],
                ..Default::default()
            },
            &log,
        ));

        let outcome = bus.dispatch(&HookEvent::new(HookEventType::Stop, "s1"));
        assert!(outcome.result.block);
        assert_eq!(outcome.result.warnings, vec!["heads up"]);
        assert_eq!(log.lock().unwrap().len(), 2, "chain ran to completion");
    }

    #[test]
    fn inject_concatenates_in_priority_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.register(recording(
            "b",
            20,
            HandlerResult {
                inject: vec!["second".into()],
                ..Default::default()
            },
            &log,
        ));
        bus.register(recording(
            "a",
            10,
            HandlerResult {
                inject: vec!["first".into()],
                ..Default::default()
            },
            &log,
        ));

        let outcome = bus.dispatch(&HookEvent::new(HookEventType::Stop, "s1"));
        assert_eq!(outcome.result.inject, vec!["first", "second"]);
    }

    #[test]
    fn unhandled_events_skip_handlers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.register(recording("stop-only", 10, HandlerResult::pass(), &log));

        bus.dispatch(&HookEvent::new(HookEventType::SessionStart, "s1"));
        assert!(log.lock().unwrap().is_empty());
    }

    struct Slow;
    impl Handler for Slow {
        fn id(&self) -> &str {
            "slow"
        }
        fn handled_events(&self) -> Vec<HookEventType> {
            vec![HookEventType::Stop]
        }
        fn priority(&self) -> i32 {
            10
        }
        fn handle(&self, _event: &HookEvent) -> Result<HandlerResult> {
            std::thread::sleep(Duration::from_secs(5));
            Ok(HandlerResult::pass())
        }
    }

    #[test]
    fn timeout_counts_as_error_and_chain_continues() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new().with_handler_timeout(Duration::from_millis(50));
        bus.register(Arc::new(Slow));
        bus.register(recording("after", 20, HandlerResult::pass(), &log));

        let outcome = bus.dispatch(&HookEvent::new(HookEventType::Stop, "s1"));
        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(outcome.errors[0], BusError::HandlerTimeout { .. }));
        assert_eq!(*log.lock().unwrap(), vec!["after"]);
    }

    #[test]
    fn retain_drops_handlers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        bus.register(recording("keep", 10, HandlerResult::pass(), &log));
        bus.register(recording("drop", 20, HandlerResult::pass(), &log));

        bus.retain(|id| id != "drop");
        assert_eq!(bus.handler_ids(), vec!["keep"]);
    }
}
