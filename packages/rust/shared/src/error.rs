//! Error types for oppsync.
//!
//! Library crates use [`OppSyncError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all oppsync operations.
#[derive(Debug, thiserror::Error)]
pub enum OppSyncError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A CRM lookup failed, timed out, or returned an unexpected shape.
    #[error("lookup failed during {step}: {message}")]
    Lookup { step: String, message: String },

    /// A required field is missing or unparsable.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Object store read/write error.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Event bus publish error.
    #[error("publish error: {0}")]
    Publish(String),

    /// Malformed JSON input (webhook payloads, stored documents).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, OppSyncError>;

impl OppSyncError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a lookup error tagged with the enrichment step that failed.
    pub fn lookup(step: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Lookup {
            step: step.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short label for the error kind, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Lookup { .. } => "lookup",
            Self::Validation { .. } => "validation",
            Self::Persistence(_) => "persistence",
            Self::Publish(_) => "publish",
            Self::Parse { .. } => "parse",
            Self::Io { .. } => "io",
        }
    }
}
