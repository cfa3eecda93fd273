//! Lifecycle state machine for stored posts.
//!
//! All status mutations go through [`LifecycleEngine`]; nothing else writes
//! `posts.status`. The valid transitions:
//!
//! ```text
//! intake   -> pending
//! pending  -> assigned | archived
//! assigned -> resolved | pending
//! resolved -> archived
//! archived    (terminal)
//! ```
//!
//! Each applied transition appends one audit record in the same database
//! transaction, and the underlying UPDATE is guarded on the expected old
//! status, so a concurrent change loses cleanly instead of double-writing.

use std::sync::Arc;

use tracing::debug;

use dragnet_shared::{DragnetError, Post, PostId, PostStatus, Result, SYSTEM_ACTOR};
use dragnet_source::Responder;
use dragnet_storage::Store;

use crate::actions::{ActionValidator, UserAction};

/// Reason recorded when the pipeline promotes a freshly saved post.
pub const REASON_HARVESTED: &str = "harvested";
/// Reason recorded when a worker claims a post.
pub const REASON_ASSIGNED: &str = "assigned";
/// Reason recorded when a worker resolves a post directly.
pub const REASON_RESOLVED: &str = "resolved";
/// Reason recorded when a reply was published for the post.
pub const REASON_REPLY_POSTED: &str = "reply_posted";
/// Reason recorded when a resolved post is closed out.
pub const REASON_ARCHIVED: &str = "archived";
/// Reason recorded by the expire sweep.
pub const REASON_AUTO_EXPIRE: &str = "auto_expire";
/// Reason recorded by the unassign sweep.
pub const REASON_AUTO_UNASSIGN: &str = "auto_unassign";

/// Valid target statuses from `from`. Empty for the terminal status.
pub fn allowed_targets(from: PostStatus) -> &'static [PostStatus] {
    match from {
        PostStatus::Intake => &[PostStatus::Pending],
        PostStatus::Pending => &[PostStatus::Assigned, PostStatus::Archived],
        PostStatus::Assigned => &[PostStatus::Resolved, PostStatus::Pending],
        PostStatus::Resolved => &[PostStatus::Archived],
        PostStatus::Archived => &[],
    }
}

// ---------------------------------------------------------------------------
// LifecycleEngine
// ---------------------------------------------------------------------------

/// Applies validated status transitions and their audit records.
pub struct LifecycleEngine {
    store: Arc<Store>,
    validator: ActionValidator,
}

impl LifecycleEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            validator: ActionValidator::new(),
        }
    }

    /// Move `post` to `target`, recording `actor` and `reason`.
    ///
    /// A same-state transition succeeds without writing anything. A target
    /// outside the table fails with the allowed set. A status change that
    /// raced this one fails with `Conflict` and writes nothing.
    pub async fn transition(
        &self,
        post: &Post,
        target: PostStatus,
        actor: &str,
        reason: &str,
    ) -> Result<()> {
        if post.status == target {
            debug!(post_id = %post.id, status = %target, "same-state transition, nothing to do");
            return Ok(());
        }

        let allowed = allowed_targets(post.status);
        if !allowed.contains(&target) {
            return Err(DragnetError::Lifecycle {
                from: post.status,
                to: target,
                allowed: allowed.to_vec(),
            });
        }

        // Returning to the pool clears the holder; other targets keep it.
        let assigned_to = match target {
            PostStatus::Pending => None,
            _ => post.assigned_to.as_deref(),
        };
        self.apply(post, target, assigned_to, actor, reason).await
    }

    /// Claim a pending post for `worker`.
    ///
    /// Claiming a post the worker already holds is a no-op. A post held by
    /// another worker fails with `AlreadyAssigned`; any other status fails
    /// action validation.
    pub async fn assign(&self, post_id: PostId, worker: &str) -> Result<Post> {
        let post = self.load(post_id).await?;
        match post.status {
            PostStatus::Pending => {}
            PostStatus::Assigned => {
                if post.assigned_to.as_deref() == Some(worker) {
                    debug!(post_id = %post.id, worker, "post already held by this worker");
                    return Ok(post);
                }
                return Err(DragnetError::AlreadyAssigned {
                    assignee: post.assigned_to.clone().unwrap_or_default(),
                });
            }
            other => return Err(self.validator.denial(UserAction::Assign, other)),
        }

        self.apply(&post, PostStatus::Assigned, Some(worker), worker, REASON_ASSIGNED)
            .await?;

        let mut post = post;
        post.status = PostStatus::Assigned;
        post.assigned_to = Some(worker.to_string());
        Ok(post)
    }

    /// Resolve a post currently held by `worker`.
    pub async fn mark_resolved(&self, post_id: PostId, worker: &str) -> Result<Post> {
        let post = self.load(post_id).await?;
        self.validator.ensure_allowed(UserAction::Resolve, post.status)?;
        self.validator.ensure_assignee(&post, worker)?;

        self.apply(
            &post,
            PostStatus::Resolved,
            post.assigned_to.as_deref(),
            worker,
            REASON_RESOLVED,
        )
        .await?;

        let mut post = post;
        post.status = PostStatus::Resolved;
        Ok(post)
    }

    /// Publish a reply through `responder`, then resolve the post.
    ///
    /// The reply must come from the worker holding the post. When publishing
    /// fails the post stays assigned and no transition is recorded.
    pub async fn reply_and_resolve(
        &self,
        responder: &dyn Responder,
        post_id: PostId,
        worker: &str,
        text: &str,
    ) -> Result<Post> {
        let post = self.load(post_id).await?;
        self.validator.ensure_allowed(UserAction::Reply, post.status)?;
        self.validator.ensure_assignee(&post, worker)?;

        let source_id = post.source_key().ok_or_else(|| {
            DragnetError::Network(format!(
                "post {post_id} has no platform identifier to reply to"
            ))
        })?;
        responder.post_reply(source_id, text).await?;

        self.apply(
            &post,
            PostStatus::Resolved,
            post.assigned_to.as_deref(),
            worker,
            REASON_REPLY_POSTED,
        )
        .await?;

        let mut post = post;
        post.status = PostStatus::Resolved;
        Ok(post)
    }

    /// Close out a resolved post.
    pub async fn archive(&self, post_id: PostId, actor: &str) -> Result<Post> {
        let post = self.load(post_id).await?;
        self.validator.ensure_allowed(UserAction::Archive, post.status)?;

        self.apply(
            &post,
            PostStatus::Archived,
            post.assigned_to.as_deref(),
            actor,
            REASON_ARCHIVED,
        )
        .await?;

        let mut post = post;
        post.status = PostStatus::Archived;
        Ok(post)
    }

    /// Expire one stale pending post. Returns `false` when the post moved
    /// on before the sweep reached it.
    pub async fn auto_expire(&self, post: &Post) -> Result<bool> {
        if post.status != PostStatus::Pending {
            return Ok(false);
        }
        self.store
            .record_transition(
                post.id,
                PostStatus::Pending,
                PostStatus::Archived,
                None,
                SYSTEM_ACTOR,
                REASON_AUTO_EXPIRE,
            )
            .await
    }

    /// Return one stale assigned post to the pool. Returns `false` when the
    /// post moved on before the sweep reached it.
    pub async fn auto_unassign(&self, post: &Post) -> Result<bool> {
        if post.status != PostStatus::Assigned {
            return Ok(false);
        }
        self.store
            .record_transition(
                post.id,
                PostStatus::Assigned,
                PostStatus::Pending,
                None,
                SYSTEM_ACTOR,
                REASON_AUTO_UNASSIGN,
            )
            .await
    }

    async fn load(&self, post_id: PostId) -> Result<Post> {
        self.store
            .get_post(post_id)
            .await?
            .ok_or_else(|| DragnetError::not_found(post_id))
    }

    async fn apply(
        &self,
        post: &Post,
        target: PostStatus,
        assigned_to: Option<&str>,
        actor: &str,
        reason: &str,
    ) -> Result<()> {
        let applied = self
            .store
            .record_transition(post.id, post.status, target, assigned_to, actor, reason)
            .await?;
        if !applied {
            return Err(DragnetError::conflict(post.id));
        }
        debug!(
            post_id = %post.id,
            from = %post.status,
            to = %target,
            actor,
            reason,
            "status transition applied"
        );
        Ok(())
    }
}
