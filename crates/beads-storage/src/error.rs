//! Storage error types.
//!
//! One enum covers the full error taxonomy of the control plane. The daemon
//! maps these onto RPC error kinds and never exposes raw engine errors.

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested entity was not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g., "issue", "config").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// An id or dedup key is already present.
    #[error("duplicate {entity}: {id}")]
    Duplicate { entity: String, id: String },

    /// A validation constraint was violated.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Adding a dependency would create a cycle in the dependency graph.
    #[error("adding this dependency would create a cycle")]
    CycleDetected,

    /// Optimistic-version mismatch or concurrent cell-level conflict.
    #[error("conflict on {entity} {id}: {reason}")]
    Conflict {
        entity: String,
        id: String,
        reason: String,
    },

    /// The database is momentarily locked by another writer; retryable.
    #[error("database locked: {0}")]
    DatabaseLocked(String),

    /// A query exceeded its deadline and was interrupted.
    #[error("query timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A daemon policy rejected the operation (close-safety, version floor).
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    /// Derived state is inconsistent with events; requires repair.
    #[error("integrity error: {0} (run 'bd doctor' to repair)")]
    Integrity(String),

    /// Failed to establish or maintain a database connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// A transaction operation failed.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// A schema migration failed.
    #[error("migration {name} failed: {reason}")]
    Migration { name: String, reason: String },

    /// A raw SQLite query error.
    #[error("query error: {0}")]
    Query(#[from] rusqlite::Error),

    /// JSON serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all for unexpected internal errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the storage crate.
pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    // -- Constructors --------------------------------------------------------

    /// Creates a [`StorageError::NotFound`] for the given entity kind and id.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a [`StorageError::Duplicate`] for the given entity kind and id.
    pub fn duplicate(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Duplicate {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a [`StorageError::Validation`] with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a [`StorageError::Conflict`] for a stale-version write.
    pub fn conflict(
        entity: impl Into<String>,
        id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            entity: entity.into(),
            id: id.into(),
            reason: reason.into(),
        }
    }

    // -- Predicates ----------------------------------------------------------

    /// Returns `true` if this is a [`StorageError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if the error is transient and the operation may succeed
    /// on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DatabaseLocked(_) | Self::Connection(_) | Self::Transaction(_)
        )
    }

    /// Stable kind name used by the RPC layer and JSON error output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Duplicate { .. } => "duplicate",
            Self::Validation { .. } => "invalid",
            Self::CycleDetected => "cycle",
            Self::Conflict { .. } => "conflict",
            Self::DatabaseLocked(_) => "locked",
            Self::Timeout(_) => "timeout",
            Self::PolicyViolation(_) => "policy_violation",
            Self::Integrity(_) => "integrity",
            Self::Connection(_) | Self::Transaction(_) | Self::Migration { .. } => "external",
            Self::Query(_) | Self::Serialization(_) | Self::Internal(_) => "internal",
        }
    }
}
