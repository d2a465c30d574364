//! Core error types for focusflow-core.
//!
//! Every layer has its own thiserror enum; the service surface is
//! [`SessionError`], which is what request layers match on.

use std::path::PathBuf;
use thiserror::Error;

use crate::session::SessionId;

/// Core error type for focusflow-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Session lifecycle errors
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by the session service and the daily goal aggregator.
///
/// These are returned unchanged to the caller; the core never retries.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Session is absent, owned by another user, or soft-deleted.
    #[error("session {session_id} not found")]
    NotFound { session_id: SessionId },

    /// Event is not legal in the session's current state.
    #[error("cannot {event} session {session_id}: {reason}")]
    InvalidTransition {
        session_id: SessionId,
        event: &'static str,
        reason: String,
    },

    /// Another writer updated the session between read and write.
    #[error("session {session_id} was modified concurrently")]
    Conflict { session_id: SessionId },

    /// A persistence step exceeded its bound.
    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// Malformed input.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Underlying storage failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SessionError {
    /// Short machine-readable error kind, used by the CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::NotFound { .. } => "not_found",
            SessionError::InvalidTransition { .. } => "invalid_transition",
            SessionError::Conflict { .. } => "conflict",
            SessionError::Timeout { .. } => "timeout",
            SessionError::Validation(_) => "validation",
            SessionError::Storage(_) => "storage",
        }
    }
}

/// Errors returned by a [`SessionRepository`](crate::storage::SessionRepository).
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Row missing, foreign or soft-deleted.
    #[error("row not found")]
    NotFound,

    /// Row version moved since it was read.
    #[error("row version conflict")]
    Conflict,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be mapped back into the domain
    #[error("Corrupt value in column '{column}': {value}")]
    Corrupt { column: &'static str, value: String },

    /// The blocking storage task panicked or was cancelled
    #[error("Storage task failed: {0}")]
    Join(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Could not determine the data directory
    #[error("Cannot resolve data directory: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// Invalid date range
    #[error("Invalid date range: {from} .. {to}: {message}")]
    InvalidRange {
        from: chrono::NaiveDate,
        to: chrono::NaiveDate,
        message: String,
    },
}

impl ValidationError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Map a repository failure for `session_id` into the service error taxonomy.
pub(crate) fn from_repository(session_id: SessionId, err: RepositoryError) -> SessionError {
    match err {
        RepositoryError::NotFound => SessionError::NotFound { session_id },
        RepositoryError::Conflict => SessionError::Conflict { session_id },
        RepositoryError::Storage(e) => SessionError::Storage(e),
    }
}

pub(crate) fn locked_or_query(err: rusqlite::Error) -> StorageError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::DatabaseLocked
                || e.code == rusqlite::ErrorCode::DatabaseBusy =>
        {
            StorageError::Locked
        }
        _ => StorageError::Sqlite(err),
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
