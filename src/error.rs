//! Error taxonomy shared across the session engine.
//!
//! Every fallible core operation returns [`GdbError`]. The variant is the
//! programmatic discriminant; the message is for humans (logs, MCP error
//! payloads).

use thiserror::Error;

/// Errors produced by the GDB session engine.
#[derive(Debug, Error)]
pub enum GdbError {
    #[error("no session with id '{0}'")]
    SessionNotFound(String),

    #[error("session '{0}' is not ready to accept commands")]
    SessionNotReady(String),

    #[error("too many sessions ({current}/{max})")]
    SessionLimit { current: usize, max: usize },

    #[error("failed to spawn gdb: {0}")]
    SpawnFailed(String),

    #[error("command timed out after {0}ms")]
    Timeout(u64),

    #[error("command failed: {msg}")]
    CommandFailed { msg: String },

    #[error("failed to parse MI line: {reason}")]
    ParseError {
        reason: String,
        column: Option<usize>,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("failed to attach: {0}")]
    AttachFailed(String),

    #[error("session '{0}' already has a command in flight")]
    AlreadyRunning(String),

    #[error("session '{0}' is not running")]
    NotRunning(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for GdbError {
    fn from(e: std::io::Error) -> Self {
        GdbError::Internal(e.to_string())
    }
}

pub type GdbResult<T> = Result<T, GdbError>;
