//! MCP error types.

use crate::session::HandshakePhase;
use std::time::Duration;
use thiserror::Error;

/// Result type for MCP operations.
pub type McpResult<T> = Result<T, McpError>;

/// Errors that can occur while verifying or enumerating a server.
#[derive(Debug, Error)]
pub enum McpError {
    /// Launch command rejected by the security gate; nothing was spawned.
    #[error("command not allowed: {0}")]
    CommandNotAllowed(String),

    /// The operation budget was exhausted.
    #[error("timed out after {}ms {phase}", after.as_millis())]
    Timeout {
        phase: HandshakePhase,
        after: Duration,
    },

    /// Connection refused, non-2xx status, stream closed, process exited.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed or uncorrelated JSON-RPC response.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Descriptor failed validation and was never attempted.
    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    /// IO error.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("protocol error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Category of an [`McpError`], as shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    CommandNotAllowed,
    Timeout,
    Transport,
    Protocol,
    ConfigInvalid,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::CommandNotAllowed => "command not allowed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Transport => "transport error",
            ErrorKind::Protocol => "protocol error",
            ErrorKind::ConfigInvalid => "invalid config",
        }
    }
}

impl McpError {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Create a config error.
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::ConfigInvalid(message.into())
    }

    /// Create a timeout error.
    pub fn timeout(phase: HandshakePhase, after: Duration) -> Self {
        Self::Timeout { phase, after }
    }

    /// The user-facing category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            McpError::CommandNotAllowed(_) => ErrorKind::CommandNotAllowed,
            McpError::Timeout { .. } => ErrorKind::Timeout,
            McpError::Transport(_) | McpError::Io(_) => ErrorKind::Transport,
            McpError::Protocol(_) | McpError::Json(_) => ErrorKind::Protocol,
            McpError::ConfigInvalid(_) => ErrorKind::ConfigInvalid,
        }
    }

    /// Map a reqwest error, keeping timeouts and refused connections apart.
    pub(crate) fn from_request(
        err: reqwest::Error,
        phase: HandshakePhase,
        budget: Duration,
    ) -> Self {
        if err.is_timeout() {
            Self::timeout(phase, budget)
        } else if err.is_connect() {
            Self::Transport(format!("connection failed: {err}"))
        } else {
            Self::Transport(format!("request failed: {err}"))
        }
    }
}
