//! Error types for pathmend.
//!
//! The variants follow the reconciliation taxonomy: transport failures abort the
//! current item, missing objects and ambiguous matches are recorded and the
//! batch continues, validation failures hold back the catalog upload.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the pathmend library.
#[derive(Debug, Error)]
pub enum PathmendError {
    // Store / network errors
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        /// Whether a retry has a chance of succeeding.
        retryable: bool,
    },

    #[error("Not found: {key}")]
    NotFound { key: String },

    #[error("Version conflict on {key}: the stored document changed since it was loaded")]
    Conflict { key: String },

    // Reconciliation errors
    #[error("Ambiguous match for {record}: {} candidates ({})", candidates.len(), candidates.join(", "))]
    AmbiguousMatch {
        record: String,
        candidates: Vec<String>,
    },

    #[error("Validation failed for {record}: {message}")]
    Validation { record: String, message: String },

    // Local errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for pathmend operations.
pub type Result<T> = std::result::Result<T, PathmendError>;

impl From<std::io::Error> for PathmendError {
    fn from(err: std::io::Error) -> Self {
        PathmendError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for PathmendError {
    fn from(err: serde_json::Error) -> Self {
        PathmendError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl PathmendError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        PathmendError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Transport error that should be retried with backoff.
    pub fn transient(message: impl Into<String>) -> Self {
        PathmendError::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Transport error that retrying will not fix (credentials, bad request).
    pub fn fatal_transport(message: impl Into<String>) -> Self {
        PathmendError::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PathmendError::Transport { retryable: true, .. })
    }

    /// Whether the store itself is unreachable, as opposed to one item failing.
    pub fn is_transport(&self) -> bool {
        matches!(self, PathmendError::Transport { .. })
    }

    /// Map to a process exit code.
    ///
    /// - 1: run failed (transport, local IO/config errors)
    /// - 2: human review required (ambiguous, validation)
    /// - 3: concurrent modification detected
    /// - 4: catalog or object missing
    pub fn exit_code(&self) -> i32 {
        match self {
            PathmendError::AmbiguousMatch { .. } | PathmendError::Validation { .. } => 2,
            PathmendError::Conflict { .. } => 3,
            PathmendError::NotFound { .. } => 4,
            _ => 1,
        }
    }
}
