//! Versioned backend: a content-addressed commit graph layered over the
//! embedded engine.

mod store;

pub use store::{CommitInfo, VersionedStore};
