//! Inbox delivery, gates, and decision points.
//!
//! Messages route by stable agent name through three tiers: the
//! authoritative database, a per-session merge buffer file, and periodic
//! reconciliation. Gates block agent "stop" events until conditions
//! resolve; decision points are gates resolved by a human choice.

pub mod buffer;
pub mod decision;
pub mod drain;
pub mod gates;

pub use buffer::MergeBuffer;
pub use drain::{drain_session, reconcile, wrap_block};
pub use gates::{GateDisposition, GithubProbe, HttpGithubProbe, SessionGates, check_db_gates};

/// Errors that can occur in inbox/gate operations.
#[derive(Debug, thiserror::Error)]
pub enum InboxError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] beads_storage::StorageError),

    #[error("validation error: {0}")]
    Validation(#[from] beads_core::validation::ValidationError),

    /// Gate evaluation failed upstream (network, API); the gate stays open
    /// and is retried with backoff.
    #[error("gate evaluation failed: {0}")]
    External(String),
}

/// Result alias for inbox operations.
pub type Result<T> = std::result::Result<T, InboxError>;
