//! Event bus and durable stream.
//!
//! The synchronous half dispatches lifecycle events through registered
//! handlers in priority order and aggregates their results; the
//! asynchronous half publishes events onto per-subject durable streams with
//! per-consumer offsets and at-least-once delivery.

pub mod builtin;
pub mod dispatch;
pub mod event;
pub mod external;
pub mod handler;
pub mod stream;

pub use dispatch::{DispatchOutcome, EventBus};
pub use event::{HookEvent, HookEventType};
pub use handler::{Handler, HandlerResult};
pub use stream::{Consumer, Stream, StreamEntry};

/// Errors that can occur in bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("handler {id} failed: {message}")]
    Handler { id: String, message: String },

    #[error("handler {id} timed out after {seconds}s")]
    HandlerTimeout { id: String, seconds: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
