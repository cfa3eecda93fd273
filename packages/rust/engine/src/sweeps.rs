//! Age-based maintenance sweeps.
//!
//! Two sweeps keep the pool honest: pending posts nobody claimed within
//! `expire_days` are archived, and assigned posts nobody resolved within
//! `unassign_hours` go back to pending for someone else. Both use fetch
//! time as the age reference and lose gracefully to concurrent claims.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, instrument, warn};

use dragnet_shared::{AppConfig, Result};
use dragnet_storage::Store;

use crate::lifecycle::LifecycleEngine;

/// Runs the expire and unassign sweeps against the store.
pub struct Sweeps {
    store: Arc<Store>,
    lifecycle: Arc<LifecycleEngine>,
    expire_days: i64,
    unassign_hours: i64,
}

impl Sweeps {
    pub fn new(config: &AppConfig, store: Arc<Store>, lifecycle: Arc<LifecycleEngine>) -> Self {
        Self {
            store,
            lifecycle,
            expire_days: config.lifecycle.expire_days,
            unassign_hours: config.lifecycle.unassign_hours,
        }
    }

    /// Archive pending posts older than the expiry age.
    /// Returns how many were archived.
    #[instrument(skip_all)]
    pub async fn expire_stale_pending(&self) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(self.expire_days);
        let candidates = self.store.pending_older_than(cutoff).await?;

        let mut archived = 0u64;
        for post in candidates {
            match self.lifecycle.auto_expire(&post).await {
                Ok(true) => archived += 1,
                Ok(false) => {
                    debug!(post_id = %post.id, "post moved before the expire sweep reached it");
                }
                Err(e) => {
                    warn!(post_id = %post.id, error = %e, "expire failed, continuing");
                }
            }
        }

        if archived > 0 {
            info!(archived, "expired stale pending posts");
        }
        Ok(archived)
    }

    /// Return assigned posts older than the unassign age to the pool.
    /// Returns how many were returned.
    #[instrument(skip_all)]
    pub async fn unassign_stale_assigned(&self) -> Result<u64> {
        let cutoff = Utc::now() - Duration::hours(self.unassign_hours);
        let candidates = self.store.assigned_older_than(cutoff).await?;

        let mut returned = 0u64;
        for post in candidates {
            match self.lifecycle.auto_unassign(&post).await {
                Ok(true) => returned += 1,
                Ok(false) => {
                    debug!(post_id = %post.id, "post moved before the unassign sweep reached it");
                }
                Err(e) => {
                    warn!(post_id = %post.id, error = %e, "unassign failed, continuing");
                }
            }
        }

        if returned > 0 {
            info!(returned, "returned stale assignments to the pool");
        }
        Ok(returned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use dragnet_shared::{Post, PostId, PostStatus, SYSTEM_ACTOR};
    use uuid::Uuid;

    use crate::lifecycle::{REASON_AUTO_EXPIRE, REASON_AUTO_UNASSIGN, REASON_HARVESTED};

    async fn test_store() -> Arc<Store> {
        let tmp = std::env::temp_dir().join(format!("dragnet_test_{}.db", Uuid::now_v7()));
        Arc::new(Store::open(&tmp).await.expect("open test db"))
    }

    fn make_post(source_id: &str, fetched_days_ago: i64) -> Post {
        let fetched = Utc::now() - Duration::days(fetched_days_ago);
        Post {
            id: PostId::new(),
            source_id: Some(source_id.into()),
            permalink: None,
            channel: "rust".into(),
            title: format!("post {source_id}"),
            body: String::new(),
            author: "alice".into(),
            upvotes: 0,
            comment_count: 0,
            status: PostStatus::Intake,
            assigned_to: None,
            posted_at: fetched,
            fetched_at: fetched,
            created_at: Utc::now(),
        }
    }

    async fn seed_pending(
        store: &Arc<Store>,
        lifecycle: &LifecycleEngine,
        source_id: &str,
        fetched_days_ago: i64,
    ) -> Post {
        let post = make_post(source_id, fetched_days_ago);
        store.create_post(&post).await.expect("create");
        lifecycle
            .transition(&post, PostStatus::Pending, SYSTEM_ACTOR, REASON_HARVESTED)
            .await
            .expect("promote");
        store.get_post(post.id).await.unwrap().unwrap()
    }

    fn sweeps_with(store: Arc<Store>, expire_days: i64, unassign_hours: i64) -> Sweeps {
        let mut config = AppConfig::default();
        config.lifecycle.expire_days = expire_days;
        config.lifecycle.unassign_hours = unassign_hours;
        let lifecycle = Arc::new(LifecycleEngine::new(store.clone()));
        Sweeps::new(&config, store, lifecycle)
    }

    #[tokio::test]
    async fn expire_archives_only_stale_pending_posts() {
        let store = test_store().await;
        let lifecycle = LifecycleEngine::new(store.clone());

        let stale = seed_pending(&store, &lifecycle, "t3_stale", 8).await;
        let fresh = seed_pending(&store, &lifecycle, "t3_fresh", 1).await;
        // Old but already claimed: the expire sweep must not touch it.
        let claimed = seed_pending(&store, &lifecycle, "t3_claimed", 9).await;
        lifecycle.assign(claimed.id, "w1").await.expect("claim");

        let sweeps = sweeps_with(store.clone(), 7, 24);
        let archived = sweeps.expire_stale_pending().await.expect("sweep");
        assert_eq!(archived, 1);

        assert_eq!(
            store.get_post(stale.id).await.unwrap().unwrap().status,
            PostStatus::Archived
        );
        assert_eq!(
            store.get_post(fresh.id).await.unwrap().unwrap().status,
            PostStatus::Pending
        );
        assert_eq!(
            store.get_post(claimed.id).await.unwrap().unwrap().status,
            PostStatus::Assigned
        );

        let log = store.status_log_for(stale.id).await.unwrap();
        assert_eq!(log.last().unwrap().reason, REASON_AUTO_EXPIRE);
        assert_eq!(log.last().unwrap().actor, SYSTEM_ACTOR);
    }

    #[tokio::test]
    async fn unassign_returns_only_stale_assignments() {
        let store = test_store().await;
        let lifecycle = LifecycleEngine::new(store.clone());

        let stale = seed_pending(&store, &lifecycle, "t3_stale", 3).await;
        lifecycle.assign(stale.id, "w1").await.expect("claim stale");
        let fresh = seed_pending(&store, &lifecycle, "t3_fresh", 0).await;
        lifecycle.assign(fresh.id, "w2").await.expect("claim fresh");

        let sweeps = sweeps_with(store.clone(), 7, 24);
        let returned = sweeps.unassign_stale_assigned().await.expect("sweep");
        assert_eq!(returned, 1);

        let stale_now = store.get_post(stale.id).await.unwrap().unwrap();
        assert_eq!(stale_now.status, PostStatus::Pending);
        assert_eq!(stale_now.assigned_to, None);

        let fresh_now = store.get_post(fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh_now.status, PostStatus::Assigned);
        assert_eq!(fresh_now.assigned_to.as_deref(), Some("w2"));

        let log = store.status_log_for(stale.id).await.unwrap();
        assert_eq!(log.last().unwrap().reason, REASON_AUTO_UNASSIGN);
    }

    #[tokio::test]
    async fn sweeps_with_nothing_stale_do_nothing() {
        let store = test_store().await;
        let lifecycle = LifecycleEngine::new(store.clone());
        seed_pending(&store, &lifecycle, "t3_fresh", 1).await;

        let sweeps = sweeps_with(store.clone(), 7, 24);
        assert_eq!(sweeps.expire_stale_pending().await.unwrap(), 0);
        assert_eq!(sweeps.unassign_stale_assigned().await.unwrap(), 0);
    }
}
