//! Error types for dragnet.
//!
//! Library crates use [`DragnetError`] via `thiserror`.
//! The CLI binary wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

use crate::types::PostStatus;

/// Top-level error type for all dragnet operations.
#[derive(Debug, thiserror::Error)]
pub enum DragnetError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A status transition not present in the lifecycle table.
    #[error("invalid transition {from} -> {to} (allowed from {from}: {allowed:?})")]
    Lifecycle {
        from: PostStatus,
        to: PostStatus,
        allowed: Vec<PostStatus>,
    },

    /// An operation blocked for the post's current status.
    #[error("action '{action}' not allowed in status {status} (allowed: {allowed:?})")]
    Action {
        action: String,
        status: PostStatus,
        allowed: Vec<String>,
    },

    /// Reply-type operation attempted by a worker who does not hold the assignment.
    #[error("post is assigned to '{assignee}', not '{worker}'")]
    NotAssignee { worker: String, assignee: String },

    /// Assignment attempted while a different worker already holds the post.
    #[error("post is already assigned to '{assignee}'")]
    AlreadyAssigned { assignee: String },

    /// Lookup by id found nothing.
    #[error("post {id} not found")]
    NotFound { id: String },

    /// The post's status changed between read and write; nothing was written.
    #[error("post {id} was modified concurrently")]
    Conflict { id: String },

    /// Unrecoverable run-level pipeline failure.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Per-source fetch failure (recoverable at pipeline level).
    ///
    /// The field is named `source_name` rather than `source` because
    /// `thiserror` reserves `source` for an underlying `Error` cause.
    #[error("source '{source_name}' failed: {message}")]
    Source {
        source_name: String,
        message: String,
    },

    /// Network/HTTP error talking to the external content service.
    #[error("network error: {0}")]
    Network(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DragnetError>;

impl DragnetError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a not-found error for a post id.
    pub fn not_found(id: impl std::fmt::Display) -> Self {
        Self::NotFound { id: id.to_string() }
    }

    /// Create a conflict error for a post id.
    pub fn conflict(id: impl std::fmt::Display) -> Self {
        Self::Conflict { id: id.to_string() }
    }

    /// Create a pipeline error from any displayable message.
    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self::Pipeline(msg.into())
    }

    /// Create a storage error from any displayable message.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a per-source fetch error.
    pub fn source(source: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Source {
            source_name: source.into(),
            message: msg.into(),
        }
    }

    /// Create a network error from any displayable message.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = DragnetError::config("missing sources list");
        assert_eq!(err.to_string(), "config error: missing sources list");

        let err = DragnetError::source("rust", "listing returned 503");
        assert!(err.to_string().contains("'rust'"));
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn lifecycle_display_names_blocked_pair() {
        let err = DragnetError::Lifecycle {
            from: PostStatus::Archived,
            to: PostStatus::Pending,
            allowed: vec![],
        };
        let msg = err.to_string();
        assert!(msg.contains("archived"));
        assert!(msg.contains("pending"));
    }

    #[test]
    fn action_display_names_operation() {
        let err = DragnetError::Action {
            action: "reply".into(),
            status: PostStatus::Pending,
            allowed: vec!["view".into(), "assign".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'reply'"));
        assert!(msg.contains("assign"));
    }
}
