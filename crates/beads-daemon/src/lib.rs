//! The workspace daemon: single-writer front for storage, RPC surface,
//! event bus host, and background timers.
//!
//! Every client routes mutations through a daemon (or the in-process
//! executor in no-daemon testing mode); the daemon holds the only live
//! storage handle for its workspace.

pub mod backends;
pub mod client;
pub mod context;
pub mod handlers;
pub mod lifecycle;
pub mod protocol;
pub mod server;

pub use client::DaemonClient;
pub use context::DaemonContext;
pub use protocol::{PROTOCOL_VERSION, Request, Response, RpcErrorInfo};

/// Environment variable that disables daemon routing (testing mode).
pub const NO_DAEMON_ENV: &str = "BEADS_NO_DAEMON";

/// Errors raised by daemon plumbing (not by operations themselves --
/// those travel as [`RpcErrorInfo`] in responses).
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("daemon unavailable at {0}")]
    Unavailable(String),

    #[error("another daemon already serves this workspace (pid {0:?})")]
    AlreadyRunning(Option<u32>),

    #[error("frame too large: {0} bytes")]
    FrameTooLarge(u32),

    #[error(transparent)]
    Lock(#[from] beads_lockfile::LockError),

    #[error(transparent)]
    Config(#[from] beads_config::ConfigError),

    #[error(transparent)]
    Storage(#[from] beads_storage::StorageError),
}

/// Result alias for daemon plumbing.
pub type Result<T> = std::result::Result<T, DaemonError>;
