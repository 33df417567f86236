//! Service Layer Error Types
//!
//! This module defines error types for service-layer operations, providing
//! detailed error handling for tree lifecycle and transport failures.

use crate::db::DatabaseError;
use thiserror::Error;

/// Service operation errors
///
/// Provides high-level error types for all service operations,
/// with detailed context and proper error chaining.
#[derive(Error, Debug)]
pub enum TreeServiceError {
    /// Tree identity missing, or present but not hydratable
    #[error("Tree not found: {tree_id}")]
    TreeNotFound { tree_id: i64 },

    /// No kind registered for a stored handle
    #[error("Unknown tree kind: {handle}")]
    UnknownKind { handle: String },

    /// Database operation failed
    #[error("Database operation failed: {0}")]
    DatabaseError(#[from] DatabaseError),

    /// Import envelope missing or malformed
    #[error("Import failed: {0}")]
    ImportFailed(String),

    /// Query execution error
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Access bootstrap could not complete
    #[error("Access bootstrap failed: {context}")]
    AccessBootstrapFailed { context: String },
}

impl TreeServiceError {
    /// Create a tree not found error
    pub fn tree_not_found(tree_id: i64) -> Self {
        Self::TreeNotFound { tree_id }
    }

    /// Create an unknown kind error
    pub fn unknown_kind(handle: impl Into<String>) -> Self {
        Self::UnknownKind {
            handle: handle.into(),
        }
    }

    /// Create an import failed error
    pub fn import_failed(msg: impl Into<String>) -> Self {
        Self::ImportFailed(msg.into())
    }

    /// Create a query failed error
    pub fn query_failed(msg: impl Into<String>) -> Self {
        Self::QueryFailed(msg.into())
    }

    /// Create an access bootstrap failed error
    pub fn access_bootstrap_failed(context: impl Into<String>) -> Self {
        Self::AccessBootstrapFailed {
            context: context.into(),
        }
    }
}
