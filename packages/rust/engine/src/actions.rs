//! Operation-level guards layered on top of the lifecycle table.
//!
//! The transition table says which statuses connect; this table says which
//! operations a caller may even attempt against a post in a given status.
//! Anything not listed for a status is blocked, and the error names both
//! the blocked operation and what the status does permit.

use dragnet_shared::{DragnetError, Post, PostStatus, Result};

/// Operations checked against a post's current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    View,
    Assign,
    Reassign,
    Reply,
    Resolve,
    Note,
    Archive,
    AutoExpire,
    AutoUnassign,
}

impl UserAction {
    /// Stable lowercase name, as reported in errors and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Assign => "assign",
            Self::Reassign => "reassign",
            Self::Reply => "reply",
            Self::Resolve => "resolve",
            Self::Note => "note",
            Self::Archive => "archive",
            Self::AutoExpire => "auto_expire",
            Self::AutoUnassign => "auto_unassign",
        }
    }
}

impl std::fmt::Display for UserAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-status operation allow table.
#[derive(Debug, Default, Clone, Copy)]
pub struct ActionValidator;

impl ActionValidator {
    pub fn new() -> Self {
        Self
    }

    /// Operations permitted for a post in `status`.
    pub fn allowed_actions(&self, status: PostStatus) -> &'static [UserAction] {
        match status {
            PostStatus::Intake => &[UserAction::View],
            PostStatus::Pending => &[UserAction::View, UserAction::Assign, UserAction::AutoExpire],
            PostStatus::Assigned => &[
                UserAction::View,
                UserAction::Reply,
                UserAction::Resolve,
                UserAction::AutoUnassign,
            ],
            PostStatus::Resolved => &[UserAction::View, UserAction::Archive, UserAction::Note],
            PostStatus::Archived => &[UserAction::View],
        }
    }

    /// Whether `action` is permitted in `status`.
    pub fn is_allowed(&self, action: UserAction, status: PostStatus) -> bool {
        self.allowed_actions(status).contains(&action)
    }

    /// Ok when permitted, otherwise an error naming the blocked operation.
    pub fn ensure_allowed(&self, action: UserAction, status: PostStatus) -> Result<()> {
        if self.is_allowed(action, status) {
            Ok(())
        } else {
            Err(self.denial(action, status))
        }
    }

    /// The error a blocked `action` produces in `status`.
    pub fn denial(&self, action: UserAction, status: PostStatus) -> DragnetError {
        DragnetError::Action {
            action: action.as_str().to_string(),
            status,
            allowed: self
                .allowed_actions(status)
                .iter()
                .map(|a| a.as_str().to_string())
                .collect(),
        }
    }

    /// Reply-type operations must come from the worker holding the post.
    pub fn ensure_assignee(&self, post: &Post, worker: &str) -> Result<()> {
        match post.assigned_to.as_deref() {
            Some(assignee) if assignee == worker => Ok(()),
            Some(assignee) => Err(DragnetError::NotAssignee {
                worker: worker.to_string(),
                assignee: assignee.to_string(),
            }),
            None => Err(DragnetError::NotAssignee {
                worker: worker.to_string(),
                assignee: String::new(),
            }),
        }
    }
}
