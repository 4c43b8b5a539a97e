//! Git integration for the beads system.
//!
//! A thin subprocess wrapper plus the sync choreography: committing the
//! federation files, pulling (which may rewrite them via the merge driver),
//! and installing the union merge driver into the repository config.

pub mod commands;
pub mod sync;

pub use commands::{GitError, git_command};
