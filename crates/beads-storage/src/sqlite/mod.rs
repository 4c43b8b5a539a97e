//! SQLite (embedded) backend.

pub(crate) mod cache;
pub(crate) mod comments;
pub(crate) mod config;
pub(crate) mod dependencies;
pub(crate) mod gates;
pub(crate) mod inbox;
pub(crate) mod issues;
pub(crate) mod labels;
pub(crate) mod queries;
pub(crate) mod schema;
pub(crate) mod store;
pub(crate) mod transaction;

pub use store::SqliteStore;

pub(crate) use issues::{format_datetime, parse_datetime};
