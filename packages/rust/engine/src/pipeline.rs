//! The harvest pipeline: one full pass from capacity sweep to persistence.
//!
//! Stage order is fixed: prune to capacity, fetch every configured channel,
//! deduplicate against the store and within the batch, filter (keyword,
//! engagement, content), then persist survivors and promote them into the
//! worker pool. A failing channel costs only its own posts; the run as a
//! whole fails only when every channel failed and nothing was fetched.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use dragnet_shared::{
    AppConfig, DragnetError, Post, PostStatus, Result, RunSummary, SYSTEM_ACTOR,
};
use dragnet_source::Fetcher;
use dragnet_storage::{CreateOutcome, Store};

use crate::dedup::Deduplicator;
use crate::filters::{ContentFilter, EngagementFilter};
use crate::keywords::{KeywordFilter, KeywordMatcher};
use crate::lifecycle::{LifecycleEngine, REASON_HARVESTED};

/// Receives phase updates during a run (the CLI draws a spinner from these).
pub trait ProgressReporter: Send + Sync {
    fn phase(&self, message: &str);
}

/// No-op reporter for scheduled runs.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _message: &str) {}
}

// ---------------------------------------------------------------------------
// HarvestPipeline
// ---------------------------------------------------------------------------

/// Orchestrates one harvest pass over all configured sources.
pub struct HarvestPipeline {
    sources: Vec<String>,
    max_posts: u64,
    filters_enabled: bool,
    store: Arc<Store>,
    fetcher: Arc<dyn Fetcher>,
    matcher: Arc<dyn KeywordMatcher>,
    keyword_filter: KeywordFilter,
    engagement: EngagementFilter,
    content: ContentFilter,
    lifecycle: LifecycleEngine,
}

impl HarvestPipeline {
    pub fn new(
        config: &AppConfig,
        store: Arc<Store>,
        fetcher: Arc<dyn Fetcher>,
        matcher: Arc<dyn KeywordMatcher>,
    ) -> Result<Self> {
        Ok(Self {
            sources: config.harvest.sources.clone(),
            max_posts: config.storage.max_posts,
            filters_enabled: config.filters.enabled,
            store: store.clone(),
            fetcher,
            matcher: matcher.clone(),
            keyword_filter: KeywordFilter::new(matcher),
            engagement: EngagementFilter::new(&config.filters),
            content: ContentFilter::new(&config.filters)?,
            lifecycle: LifecycleEngine::new(store),
        })
    }

    /// Run one full pipeline pass and return its summary.
    #[instrument(skip_all)]
    pub async fn run(&self, progress: &dyn ProgressReporter) -> Result<RunSummary> {
        let started_at = Utc::now();
        info!(sources = self.sources.len(), "pipeline run starting");

        progress.phase("pruning store to capacity");
        let evicted = self
            .store
            .cleanup_old_posts(self.max_posts)
            .await
            .map_err(|e| DragnetError::pipeline(format!("capacity sweep failed: {e}")))?
            as usize;

        progress.phase("fetching channel listings");
        let batch = self
            .fetcher
            .fetch_all(&self.sources)
            .await
            .map_err(|e| DragnetError::pipeline(format!("fetch stage failed: {e}")))?;
        let fetched = batch.posts.len();
        let sources_failed = batch.failed_sources.len();
        for (channel, error) in &batch.failed_sources {
            warn!(channel = %channel, error = %error, "source failed during fetch");
        }
        if fetched == 0 && !self.sources.is_empty() && sources_failed == self.sources.len() {
            return Err(DragnetError::pipeline("all sources failed to fetch"));
        }

        progress.phase("deduplicating");
        let known = self
            .store
            .existing_keys()
            .await
            .map_err(|e| DragnetError::pipeline(format!("dedup snapshot failed: {e}")))?;
        let dedup = Deduplicator::new(known);
        let (unique, mut duplicates_skipped) = dedup.filter_duplicates(batch.posts);

        progress.phase("filtering");
        let (survivors, filtered_out) = self.filter_stage(unique).await;

        progress.phase("persisting");
        let mut saved = 0usize;
        for post in &survivors {
            match self.store.create_post(post).await {
                Ok(CreateOutcome::Created) => {
                    saved += 1;
                    // Freshly stored posts go straight into the worker pool.
                    if let Err(e) = self
                        .lifecycle
                        .transition(post, PostStatus::Pending, SYSTEM_ACTOR, REASON_HARVESTED)
                        .await
                    {
                        warn!(post_id = %post.id, error = %e, "failed to promote new post");
                    }
                }
                Ok(CreateOutcome::AlreadyExists) => {
                    // The key appeared between the dedup snapshot and now.
                    debug!(source_id = ?post.source_id, "post already stored, skipping");
                    duplicates_skipped += 1;
                }
                Err(e) => {
                    warn!(post_id = %post.id, error = %e, "failed to persist post, skipping");
                }
            }
        }

        let summary = RunSummary {
            fetched,
            saved,
            duplicates_skipped,
            evicted,
            filtered_out,
            sources_failed,
            filters_bypassed: !self.filters_enabled,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            fetched,
            saved,
            duplicates = duplicates_skipped,
            evicted,
            filtered = filtered_out,
            failed_sources = sources_failed,
            "pipeline run finished"
        );
        Ok(summary)
    }

    /// Apply the three gates in order: keyword, engagement, content.
    async fn filter_stage(&self, posts: Vec<Post>) -> (Vec<Post>, usize) {
        if !self.filters_enabled {
            warn!("filter stage bypassed by configuration, accepting all posts");
            return (posts, 0);
        }

        // Refresh terms so keyword edits apply without a restart. A failed
        // reload warns and keeps matching on the previous snapshot.
        let _ = self.matcher.reload().await;

        if !self.keyword_filter.gate_active() {
            warn!("keyword classes incomplete, keyword gate accepts all posts");
        }

        let total = posts.len();
        let mut kept = Vec::with_capacity(total);
        for post in posts {
            if !self.keyword_filter.accepts(&post) {
                debug!(source_id = ?post.source_id, "rejected: no keyword match");
                continue;
            }
            if !self.engagement.accepts(&post) {
                debug!(
                    source_id = ?post.source_id,
                    upvotes = post.upvotes,
                    comments = post.comment_count,
                    "rejected: below engagement thresholds"
                );
                continue;
            }
            if let Some(reason) = self.content.rejects(&post) {
                debug!(source_id = ?post.source_id, reason, "rejected: content gate");
                continue;
            }
            kept.push(post);
        }

        let filtered_out = total - kept.len();
        info!(kept = kept.len(), filtered_out, "filter stage complete");
        (kept, filtered_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use dragnet_shared::PostId;
    use dragnet_source::FetchBatch;
    use uuid::Uuid;

    use crate::keywords::SetMatcher;

    async fn test_store() -> Arc<Store> {
        let tmp = std::env::temp_dir().join(format!("dragnet_test_{}.db", Uuid::now_v7()));
        Arc::new(Store::open(&tmp).await.expect("open test db"))
    }

    fn make_post(source_id: &str, title: &str, body: &str) -> Post {
        let now = Utc::now();
        Post {
            id: PostId::new(),
            source_id: Some(source_id.into()),
            permalink: Some(format!("https://example.com/r/rust/comments/{source_id}")),
            channel: "rust".into(),
            title: title.into(),
            body: body.into(),
            author: "alice".into(),
            upvotes: 3,
            comment_count: 1,
            status: PostStatus::Intake,
            assigned_to: None,
            posted_at: now - Duration::hours(1),
            fetched_at: now,
            created_at: now,
        }
    }

    struct FakeFetcher {
        posts: Vec<Post>,
        failed: Vec<(String, String)>,
    }

    impl FakeFetcher {
        fn with_posts(posts: Vec<Post>) -> Self {
            Self {
                posts,
                failed: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch_all(&self, _sources: &[String]) -> Result<FetchBatch> {
            Ok(FetchBatch {
                posts: self.posts.clone(),
                failed_sources: self.failed.clone(),
            })
        }
    }

    /// Store + pipeline with the standard test keywords seeded.
    async fn build_pipeline(
        store: Arc<Store>,
        fetcher: FakeFetcher,
        mutate: impl FnOnce(&mut AppConfig),
    ) -> HarvestPipeline {
        let mut config = AppConfig::default();
        config.harvest.sources = vec!["rust".into()];
        config.keywords.primary = vec!["need help".into()];
        config.keywords.secondary = vec!["database".into()];
        mutate(&mut config);

        store.seed_keywords(&config.keywords).await.expect("seed");
        let matcher = Arc::new(SetMatcher::new(store.clone(), config.keywords.tenant.clone()));
        HarvestPipeline::new(&config, store, Arc::new(fetcher), matcher).expect("pipeline")
    }

    #[tokio::test]
    async fn full_run_saves_matching_posts_as_pending() {
        let store = test_store().await;

        // Already stored: the fetch below returns it again.
        let existing = make_post("t3_dup", "Need help with a database", "old copy");
        store.create_post(&existing).await.unwrap();

        let fetcher = FakeFetcher::with_posts(vec![
            make_post("t3_new", "Need help picking a database", "for a side project"),
            make_post("t3_misses", "Look at my keyboard", "no relevant terms"),
            make_post("t3_dup", "Need help with a database", "fresh copy"),
        ]);
        let pipeline = build_pipeline(store.clone(), fetcher, |_| {}).await;

        let summary = pipeline.run(&SilentProgress).await.expect("run");
        assert_eq!(summary.fetched, 3);
        assert_eq!(summary.saved, 1);
        assert_eq!(summary.duplicates_skipped, 1);
        assert_eq!(summary.filtered_out, 1);
        assert_eq!(summary.evicted, 0);
        assert_eq!(summary.sources_failed, 0);
        assert!(!summary.filters_bypassed);

        let pending = store
            .list_posts(Some(PostStatus::Pending), 10)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].source_id.as_deref(), Some("t3_new"));

        let log = store.status_log_for(pending[0].id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].actor, SYSTEM_ACTOR);
        assert_eq!(log[0].reason, REASON_HARVESTED);
    }

    #[tokio::test]
    async fn second_run_skips_everything_already_stored() {
        let store = test_store().await;
        let posts = vec![
            make_post("t3_a", "Need help with a database", "one"),
            make_post("t3_b", "Need help choosing a database", "two"),
        ];

        let pipeline =
            build_pipeline(store.clone(), FakeFetcher::with_posts(posts.clone()), |_| {}).await;
        let first = pipeline.run(&SilentProgress).await.expect("first run");
        assert_eq!(first.saved, 2);

        let pipeline = build_pipeline(store.clone(), FakeFetcher::with_posts(posts), |_| {}).await;
        let second = pipeline.run(&SilentProgress).await.expect("second run");
        assert_eq!(second.fetched, 2);
        assert_eq!(second.saved, 0);
        assert_eq!(second.duplicates_skipped, 2);

        assert_eq!(store.count_posts().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn bypass_accepts_posts_the_filters_would_drop() {
        let store = test_store().await;
        let fetcher = FakeFetcher::with_posts(vec![make_post(
            "t3_offtopic",
            "Look at my keyboard",
            "no relevant terms",
        )]);
        let pipeline = build_pipeline(store.clone(), fetcher, |config| {
            config.filters.enabled = false;
        })
        .await;

        let summary = pipeline.run(&SilentProgress).await.expect("run");
        assert_eq!(summary.saved, 1);
        assert_eq!(summary.filtered_out, 0);
        assert!(summary.filters_bypassed);
    }

    #[tokio::test]
    async fn all_sources_failing_is_a_run_error() {
        let store = test_store().await;
        let fetcher = FakeFetcher {
            posts: Vec::new(),
            failed: vec![("rust".into(), "HTTP 503".into())],
        };
        let pipeline = build_pipeline(store.clone(), fetcher, |_| {}).await;

        let err = pipeline.run(&SilentProgress).await.unwrap_err();
        assert!(matches!(err, DragnetError::Pipeline(_)));
        assert!(err.to_string().contains("all sources failed"));
    }

    #[tokio::test]
    async fn partial_source_failure_keeps_the_run_alive() {
        let store = test_store().await;
        let fetcher = FakeFetcher {
            posts: vec![make_post("t3_a", "Need help with a database", "body")],
            failed: vec![("webdev".into(), "HTTP 500".into())],
        };
        let pipeline = build_pipeline(store.clone(), fetcher, |config| {
            config.harvest.sources = vec!["rust".into(), "webdev".into()];
        })
        .await;

        let summary = pipeline.run(&SilentProgress).await.expect("run");
        assert_eq!(summary.saved, 1);
        assert_eq!(summary.sources_failed, 1);
    }

    #[tokio::test]
    async fn empty_healthy_fetch_is_a_normal_run() {
        let store = test_store().await;
        let pipeline =
            build_pipeline(store.clone(), FakeFetcher::with_posts(Vec::new()), |_| {}).await;

        let summary = pipeline.run(&SilentProgress).await.expect("run");
        assert_eq!(summary.fetched, 0);
        assert_eq!(summary.saved, 0);
        assert_eq!(summary.sources_failed, 0);
    }

    #[tokio::test]
    async fn capacity_sweep_runs_before_fetch() {
        let store = test_store().await;
        // Five old posts, capacity three: the two oldest must go.
        for (i, hours) in [10i64, 9, 8, 7, 6].iter().enumerate() {
            let mut post = make_post(&format!("t3_old{i}"), "Need help with a database", "b");
            post.fetched_at = Utc::now() - Duration::hours(*hours);
            store.create_post(&post).await.unwrap();
        }

        let pipeline = build_pipeline(
            store.clone(),
            FakeFetcher::with_posts(Vec::new()),
            |config| {
                config.storage.max_posts = 3;
            },
        )
        .await;

        let summary = pipeline.run(&SilentProgress).await.expect("run");
        assert_eq!(summary.evicted, 2);
        assert_eq!(store.count_posts().await.unwrap(), 3);

        // The survivors are the three youngest.
        let remaining = store.list_posts(None, 10).await.unwrap();
        assert!(remaining
            .iter()
            .all(|p| p.source_id.as_deref() != Some("t3_old0")
                && p.source_id.as_deref() != Some("t3_old1")));
    }
}
