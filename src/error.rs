//! Error types for taskmaster
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (validation, bad args, bad config, not signed in)
//! - 3: Auth rejected (invalid credentials, account already exists)
//! - 4: Operation failed (io, serialization, lock, backend failure)

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the tm CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const AUTH_REJECTED: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for taskmaster operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Validation(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Not signed in")]
    NotSignedIn,

    // Auth rejections (exit code 3)
    #[error("Authentication failed: {0}")]
    AuthRejected(String),

    // Operation failures (exit code 4)
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidConfig(_)
            | Error::InvalidArgument(_)
            | Error::Validation(_)
            | Error::TaskNotFound(_)
            | Error::NotSignedIn => exit_codes::USER_ERROR,

            Error::AuthRejected(_) => exit_codes::AUTH_REJECTED,

            Error::Backend(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::Watch(_)
            | Error::LockFailed(_)
            | Error::OperationFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Structured context for JSON error output.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::InvalidConfig(message)
            | Error::InvalidArgument(message)
            | Error::Validation(message)
            | Error::AuthRejected(message)
            | Error::Backend(message) => Some(serde_json::json!({ "message": message })),
            Error::TaskNotFound(id) => Some(serde_json::json!({ "task_id": id })),
            Error::LockFailed(path) => Some(serde_json::json!({
                "path": path.to_string_lossy(),
            })),
            _ => None,
        }
    }
}

/// Result type alias for taskmaster operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            error: err.to_string(),
            code: err.exit_code(),
            details: err.details(),
        }
    }
}
