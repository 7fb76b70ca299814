//! Protocol-client error types.

use std::io;
use std::time::Duration;

use thiserror::Error;

use super::client::SessionState;
use crate::error::ErrorKind;

/// Result type for protocol-client operations.
pub type McpResult<T> = Result<T, McpError>;

/// Errors that can occur while talking to the tool server.
#[derive(Error, Debug)]
pub enum McpError {
    /// Failed to spawn the server process.
    #[error("failed to spawn tool server '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The server is unreachable, exited, or closed its output stream.
    #[error("connection to tool server lost: {0}")]
    Connection(String),

    /// The server sent a message with an unexpected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server (or the tool it runs) reported a failure.
    #[error("tool error: {message}{}", code.map(|c| format!(" (code: {c})")).unwrap_or_default())]
    Tool {
        /// JSON-RPC error code, when the failure came as an error object.
        code: Option<i64>,
        message: String,
    },

    /// No response arrived before the caller's deadline.
    #[error("'{method}' timed out after {after:?}")]
    Timeout { method: String, after: Duration },

    /// The client is not in a state that allows the operation.
    #[error("client is {actual:?}, expected {expected:?}")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },

    /// Failed to serialize a request.
    #[error("failed to serialize request: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl McpError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn tool(code: Option<i64>, message: impl Into<String>) -> Self {
        Self::Tool {
            code,
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Spawn { .. } | Self::Connection(_) | Self::InvalidState { .. } => {
                ErrorKind::Connection
            }
            Self::Protocol(_) | Self::Serialize(_) => ErrorKind::Protocol,
            Self::Tool { .. } => ErrorKind::Tool,
            Self::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Check if this error means the session is unusable.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Connection
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for McpError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::Connection("response channel closed unexpectedly".to_string())
    }
}
