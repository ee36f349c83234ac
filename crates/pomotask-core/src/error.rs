//! Core error types for pomotask-core.
//!
//! This module defines the error hierarchy used across the library,
//! built on thiserror. Engine errors (`InvalidTransition`, `NotFound`,
//! `StaleSession`) never carry partial mutations: a failed operation leaves
//! the session it was applied to untouched.

use std::path::PathBuf;
use thiserror::Error;

use crate::session::{SessionAction, SessionStatus};

/// Core error type for pomotask-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Event is not legal for the session's current status.
    #[error("Invalid transition: cannot {action} a session that is {from}")]
    InvalidTransition {
        from: SessionStatus,
        action: SessionAction,
    },

    /// Network or backend call failed.
    #[error("Remote failure: {0}")]
    Remote(#[from] RemoteError),

    /// Referenced task or session id is absent.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A tick fired for a session that is no longer current.
    #[error("Stale tick for session {session_id}")]
    StaleSession { session_id: String },

    /// The operation needs a current session and there is none.
    #[error("No active session")]
    NoActiveSession,

    /// `confirm_replace`/`cancel_replace` without a create awaiting confirmation.
    #[error("No session creation is awaiting confirmation")]
    NothingToConfirm,

    /// The same operation is already waiting on a network round trip.
    #[error("Operation '{operation}' is already in flight")]
    OperationPending { operation: String },

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

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

/// Errors raised by session/task backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Request never produced a response (connect, timeout, TLS...).
    #[error("transport error: {0}")]
    Transport(String),

    /// Backend answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
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
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// Parallel sequences of differing length
    #[error("Length mismatch: {left} has {left_len} items, {right} has {right_len}")]
    LengthMismatch {
        left: &'static str,
        left_len: usize,
        right: &'static str,
        right_len: usize,
    },
}

// Helper implementations for converting from other error types

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            RemoteError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
