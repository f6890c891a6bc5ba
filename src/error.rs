//! Error types for a2a-mcp.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for a2a-mcp operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for a2a-mcp.
#[derive(Debug, Error)]
pub enum Error {
    /// Tool server could not be reached.
    #[error("tool server unavailable: {0}")]
    ToolUnavailable(String),

    /// Tool server answered with an operation-specific failure.
    #[error("{tool} failed: {message}")]
    ToolOperationFailed {
        tool: String,
        kind: ToolErrorKind,
        message: String,
    },

    /// Language-model backend error or timeout.
    #[error("model call failed: {0}")]
    ModelCallFailed(String),

    /// The coordinator could not map an instruction to its agents.
    #[error("could not plan request: {0}")]
    PlanningAmbiguous(String),

    /// Timeout.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid parameters.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build an operation failure for `tool`.
    pub fn tool(tool: impl Into<String>, kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self::ToolOperationFailed {
            tool: tool.into(),
            kind,
            message: message.into(),
        }
    }

    /// The wire-level kind this error maps to when a tool server reports it.
    pub fn tool_kind(&self) -> ToolErrorKind {
        match self {
            Self::ToolOperationFailed { kind, .. } => *kind,
            Self::InvalidParams(_) | Self::Serialization(_) => ToolErrorKind::InvalidArguments,
            Self::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ToolErrorKind::FileNotFound,
            Self::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                ToolErrorKind::PermissionDenied
            }
            _ => ToolErrorKind::Internal,
        }
    }
}

/// Operation-specific failure categories reported by tool servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    LocationNotFound,
    FileNotFound,
    PermissionDenied,
    InvalidArguments,
    UnknownTool,
    Internal,
}

impl fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::LocationNotFound => "location not found",
            Self::FileNotFound => "file not found",
            Self::PermissionDenied => "permission denied",
            Self::InvalidArguments => "invalid arguments",
            Self::UnknownTool => "unknown tool",
            Self::Internal => "internal error",
        };
        f.write_str(s)
    }
}
