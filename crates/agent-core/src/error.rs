//! Error Types

use std::io;

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// Inference endpoint could not be reached
    #[error("Endpoint unavailable: {0}")]
    EndpointUnavailable(String),

    /// Inference endpoint answered but the request failed
    #[error("Endpoint error: {message}")]
    Endpoint {
        /// HTTP status, when the failure carried one
        status: Option<u16>,
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AgentError {
    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::EndpointUnavailable(_) => {
                "The model server is not reachable. Is `ollama serve` running?".into()
            }
            Self::Endpoint {
                status: Some(status),
                message,
            } => format!("The model server returned an error ({status}): {message}"),
            Self::Endpoint {
                status: None,
                message,
            } => format!("The model server returned an error: {message}"),
            Self::Config(msg) => format!("Configuration problem: {msg}"),
        }
    }
}

/// File tool failures.
///
/// These never leave the dispatcher as errors; they become
/// [`ToolResult::Failure`](crate::tool::ToolResult) text the model can react to.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("File '{path}' does not exist")]
    FileNotFound { path: String },

    #[error("Permission denied for '{path}'")]
    PermissionDenied { path: String },

    #[error("'{path}' is a directory, not a file")]
    IsADirectory { path: String },

    #[error("File '{path}' is not valid UTF-8 text")]
    EncodingError { path: String },

    #[error("File '{path}' is too large ({size} bytes, limit is {limit} bytes)")]
    FileTooLarge { path: String, size: u64, limit: u64 },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl ToolError {
    /// Classify an I/O error raised while touching `path`.
    pub fn from_io(path: &str, source: io::Error) -> Self {
        let path = path.to_string();
        match source.kind() {
            io::ErrorKind::NotFound => Self::FileNotFound { path },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            io::ErrorKind::IsADirectory => Self::IsADirectory { path },
            io::ErrorKind::InvalidData => Self::EncodingError { path },
            _ => Self::Io { path, source },
        }
    }
}
