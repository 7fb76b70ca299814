//! Crate-level error types.
//!
//! Each subsystem keeps its own error enum (`McpError` for the protocol
//! client, `SettingsError` for configuration). Parsing failures from every
//! producer share [`ParseError`] so callers see one shape regardless of
//! whether the model came from a definition folder, a JSON document or a
//! remote tool record. [`Error`] ties them together for session-level APIs.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::SettingsError;
use crate::mcp::McpError;

/// Result type for parse operations.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Result type for session-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of every failure the crate can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Subprocess unreachable, crashed, or closed its stream.
    Connection,
    /// Malformed or unexpected JSON-RPC message.
    Protocol,
    /// The remote tool reported a failure.
    Tool,
    /// Definition text, document or tool payload did not match its schema.
    Parse,
    /// A call exceeded its deadline.
    Timeout,
    /// Configuration could not be loaded.
    Config,
    /// The input path does not exist.
    NotFound,
}

/// Errors raised while decoding definition inputs or tool payloads.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The path matched none of the known input layouts.
    #[error("unrecognized input shape: {path}")]
    UnrecognizedInput { path: PathBuf },

    /// A structurally required field is absent.
    #[error("missing required field '{field}' in {context} (tried: {})", candidates.join(", "))]
    MissingField {
        field: String,
        context: String,
        candidates: Vec<String>,
    },

    /// A field is present but holds the wrong kind of value.
    #[error("invalid value for '{field}' in {context}: {message}")]
    InvalidValue {
        field: String,
        context: String,
        message: String,
    },

    /// An enumeration (cardinality, cross-filter direction) has an unknown value.
    #[error("unrecognized {kind} '{value}' in {context}")]
    UnknownEnumValue {
        kind: &'static str,
        value: String,
        context: String,
    },

    /// Literal text could not be decoded.
    #[error("malformed literal at offset {offset}: {message}")]
    MalformedLiteral { offset: usize, message: String },

    /// A JSON document failed to parse.
    #[error("invalid JSON in {file}: {source}")]
    Json {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    /// A definition file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Block syntax error in a definition file.
    #[error("syntax error in {file} at line {line}: {message}")]
    Syntax {
        file: String,
        line: usize,
        message: String,
    },

    /// An entity names a table or column that is not part of the model.
    #[error("undefined reference in {context}: '{name}'")]
    UndefinedReference { context: String, name: String },

    /// Two entities share a name within the same scope.
    #[error("duplicate {kind} '{name}' in {scope}")]
    Duplicate {
        kind: &'static str,
        name: String,
        scope: String,
    },
}

impl ParseError {
    /// Create a missing-field error.
    pub fn missing(field: impl Into<String>, context: impl Into<String>, candidates: &[&str]) -> Self {
        Self::MissingField {
            field: field.into(),
            context: context.into(),
            candidates: candidates.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Create an invalid-value error.
    pub fn invalid(
        field: impl Into<String>,
        context: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create an undefined-reference error.
    pub fn undefined(context: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UndefinedReference {
            context: context.into(),
            name: name.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Top-level error for ingestion sessions.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Mcp(#[from] McpError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// The input file or directory does not exist.
    #[error("input not found: {0}")]
    NotFound(PathBuf),
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Mcp(e) => e.kind(),
            Error::Parse(_) => ErrorKind::Parse,
            Error::Settings(_) => ErrorKind::Config,
            Error::NotFound(_) => ErrorKind::NotFound,
        }
    }
}
