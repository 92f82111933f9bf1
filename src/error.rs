//! Error types for tasks
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad markup, unknown task, duplicate id, bad args)
//! - 3: Busy (a log or counter file is locked by another invocation)
//! - 4: Operation failed (I/O, corrupt log)

use std::path::PathBuf;
use thiserror::Error;

use crate::markup::ParseError;

/// Exit codes for the tasks CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const BUSY: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for task operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("Task not found: {0}")]
    NotFound(u64),

    #[error("Task id already in use: {0}")]
    DuplicateId(u64),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // Busy (exit code 3)
    #[error("File is locked by another process: {0}")]
    Locked(PathBuf),

    // Operation failures (exit code 4)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt log {}:{line}: {source}", path.display())]
    CorruptLog {
        path: PathBuf,
        line: usize,
        source: ParseError,
    },

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            // User errors
            Error::Parse(_)
            | Error::NotFound(_)
            | Error::DuplicateId(_)
            | Error::InvalidArgument(_)
            | Error::InvalidConfig(_)
            | Error::TomlParse(_) => exit_codes::USER_ERROR,

            Error::Locked(_) => exit_codes::BUSY,

            // Operation failures
            Error::Io(_)
            | Error::Json(_)
            | Error::CorruptLog { .. }
            | Error::OperationFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Structured details for JSON error output
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::Parse(err) => Some(serde_json::json!({
                "kind": err.kind.as_str(),
                "offset": err.offset,
                "token": err.token,
            })),
            Error::NotFound(id) | Error::DuplicateId(id) => Some(serde_json::json!({ "id": id })),
            Error::Locked(path) => Some(serde_json::json!({ "path": path })),
            Error::CorruptLog { path, line, source } => Some(serde_json::json!({
                "path": path,
                "line": line,
                "kind": source.kind.as_str(),
                "token": source.token,
            })),
            _ => None,
        }
    }
}

/// Result type alias for task operations
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
