//! Database Error Types
//!
//! Error surface for the storage layer: connection setup, schema
//! initialization, and the SQL behind tree, kind and access rows.

use std::path::PathBuf;
use thiserror::Error;

/// Storage layer errors
///
/// One variant per failure class the `db_*` operations can hit. Service
/// errors wrap this via `#[from]`; lookups that merely miss a row return
/// `Ok(None)` rather than an error.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Opening the database file failed
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Schema creation or permission key seeding failed
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// Database path is not writable
    #[error("Permission denied for database path: {path}")]
    PermissionDenied { path: PathBuf },

    /// Parent directory could not be created
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// libsql operation error
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// SQL statement failed; context names the operation
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// A timestamp column held neither SQLite nor RFC3339 format
    #[error("Unable to parse timestamp '{value}' from database row")]
    TimestampParseFailed { value: String },
}

impl DatabaseError {
    /// Connection failure at the given path
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Initialization failure with a message
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Permission denial at the given path
    pub fn permission_denied(path: PathBuf) -> Self {
        Self::PermissionDenied { path }
    }

    /// SQL failure with operation context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    /// Undecodable timestamp value
    pub fn timestamp_parse(value: impl Into<String>) -> Self {
        Self::TimestampParseFailed {
            value: value.into(),
        }
    }
}
