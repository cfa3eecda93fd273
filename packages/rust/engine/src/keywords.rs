//! Keyword matching for harvested posts.
//!
//! Relevance is conjunctive: a post is relevant only when its text contains
//! at least one primary term (intent) AND at least one secondary term
//! (topic). Terms are stored lowercased, so matching lowercases the
//! haystack once and checks substring containment per term.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, warn};

use dragnet_shared::{MatchResult, Post, Result};
use dragnet_storage::Store;

/// In-memory snapshot of one tenant's enabled keywords.
#[derive(Debug, Default, Clone)]
pub struct KeywordSets {
    pub primary: Vec<String>,
    pub secondary: Vec<String>,
}

/// Matches post text against the two AND-combined keyword classes.
#[async_trait]
pub trait KeywordMatcher: Send + Sync {
    /// Scan `text` and report every matching term per class.
    fn find_matches(&self, text: &str) -> MatchResult;

    /// `(primary, secondary)` term counts in the active snapshot.
    fn keyword_count(&self) -> (usize, usize);

    /// Refresh the snapshot from persistent storage. On failure the
    /// previous snapshot stays active.
    async fn reload(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// SetMatcher
// ---------------------------------------------------------------------------

/// Substring matcher over a swappable snapshot of keyword sets.
///
/// `find_matches` reads an `Arc` snapshot, so a reload never blocks
/// matching and matching never observes a half-updated set.
pub struct SetMatcher {
    store: Arc<Store>,
    tenant: String,
    sets: RwLock<Arc<KeywordSets>>,
}

impl SetMatcher {
    pub fn new(store: Arc<Store>, tenant: impl Into<String>) -> Self {
        Self {
            store,
            tenant: tenant.into(),
            sets: RwLock::new(Arc::new(KeywordSets::default())),
        }
    }

    fn snapshot(&self) -> Arc<KeywordSets> {
        self.sets.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl KeywordMatcher for SetMatcher {
    fn find_matches(&self, text: &str) -> MatchResult {
        let sets = self.snapshot();
        let haystack = text.to_lowercase();

        let matched_primary: Vec<String> = sets
            .primary
            .iter()
            .filter(|term| haystack.contains(term.as_str()))
            .cloned()
            .collect();
        let matched_secondary: Vec<String> = sets
            .secondary
            .iter()
            .filter(|term| haystack.contains(term.as_str()))
            .cloned()
            .collect();

        MatchResult {
            matched: !matched_primary.is_empty() && !matched_secondary.is_empty(),
            matched_primary,
            matched_secondary,
        }
    }

    fn keyword_count(&self) -> (usize, usize) {
        let sets = self.snapshot();
        (sets.primary.len(), sets.secondary.len())
    }

    async fn reload(&self) -> Result<()> {
        match self.store.enabled_keywords(&self.tenant).await {
            Ok((primary, secondary)) => {
                debug!(
                    primary = primary.len(),
                    secondary = secondary.len(),
                    tenant = %self.tenant,
                    "keyword snapshot refreshed"
                );
                let mut guard = self.sets.write().unwrap_or_else(|e| e.into_inner());
                *guard = Arc::new(KeywordSets { primary, secondary });
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, tenant = %self.tenant, "keyword reload failed, keeping previous snapshot");
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// KeywordFilter
// ---------------------------------------------------------------------------

/// Applies the conjunctive keyword policy to posts.
pub struct KeywordFilter {
    matcher: Arc<dyn KeywordMatcher>,
}

impl KeywordFilter {
    pub fn new(matcher: Arc<dyn KeywordMatcher>) -> Self {
        Self { matcher }
    }

    /// Whether the gate can reject anything. With either class empty the
    /// conjunctive rule would reject every post, so the gate stands down
    /// and accepts all instead.
    pub fn gate_active(&self) -> bool {
        let (primary, secondary) = self.matcher.keyword_count();
        primary > 0 && secondary > 0
    }

    /// Whether `post` passes the keyword gate.
    pub fn accepts(&self, post: &Post) -> bool {
        if !self.gate_active() {
            return true;
        }
        self.matcher.find_matches(&post.search_text()).matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dragnet_shared::{KeywordsConfig, PostId, PostStatus};
    use uuid::Uuid;

    async fn test_store() -> Arc<Store> {
        let tmp = std::env::temp_dir().join(format!("dragnet_test_{}.db", Uuid::now_v7()));
        Arc::new(Store::open(&tmp).await.expect("open test db"))
    }

    async fn seeded_matcher(primary: &[&str], secondary: &[&str]) -> (Arc<Store>, SetMatcher) {
        let store = test_store().await;
        let config = KeywordsConfig {
            tenant: "default".into(),
            primary: primary.iter().map(|s| s.to_string()).collect(),
            secondary: secondary.iter().map(|s| s.to_string()).collect(),
        };
        store.seed_keywords(&config).await.expect("seed");
        let matcher = SetMatcher::new(store.clone(), "default");
        matcher.reload().await.expect("reload");
        (store, matcher)
    }

    fn make_post(title: &str, body: &str) -> Post {
        let now = Utc::now();
        Post {
            id: PostId::new(),
            source_id: Some("t3_kw".into()),
            permalink: None,
            channel: "rust".into(),
            title: title.into(),
            body: body.into(),
            author: "alice".into(),
            upvotes: 0,
            comment_count: 0,
            status: PostStatus::Intake,
            assigned_to: None,
            posted_at: now,
            fetched_at: now,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn matches_only_when_both_classes_hit() {
        let (_store, matcher) =
            seeded_matcher(&["need help", "how to"], &["database", "web framework"]).await;

        let both = matcher.find_matches("Need help choosing a database for logs");
        assert!(both.matched);
        assert_eq!(both.matched_primary, vec!["need help"]);
        assert_eq!(both.matched_secondary, vec!["database"]);

        let primary_only = matcher.find_matches("need help with my homework");
        assert!(!primary_only.matched);
        assert_eq!(primary_only.matched_primary.len(), 1);
        assert!(primary_only.matched_secondary.is_empty());

        let secondary_only = matcher.find_matches("benchmarking database engines");
        assert!(!secondary_only.matched);

        let neither = matcher.find_matches("completely unrelated text");
        assert!(!neither.matched);
    }

    #[tokio::test]
    async fn matching_is_case_insensitive() {
        let (_store, matcher) = seeded_matcher(&["need help"], &["database"]).await;
        let result = matcher.find_matches("NEED HELP with a DataBase migration");
        assert!(result.matched);
    }

    #[tokio::test]
    async fn reload_swaps_in_new_terms() {
        let (store, matcher) = seeded_matcher(&["need help"], &["database"]).await;
        assert_eq!(matcher.keyword_count(), (1, 1));

        store
            .add_keyword("cache", dragnet_shared::KeywordClass::Secondary, "default")
            .await
            .expect("add");
        assert_eq!(matcher.keyword_count(), (1, 1), "stale until reload");

        matcher.reload().await.expect("reload");
        assert_eq!(matcher.keyword_count(), (1, 2));
        assert!(matcher.find_matches("need help with a cache").matched);
    }

    #[tokio::test]
    async fn empty_class_stands_the_gate_down() {
        let (_store, matcher) = seeded_matcher(&["need help"], &[]).await;
        let filter = KeywordFilter::new(Arc::new(matcher));

        assert!(!filter.gate_active());
        assert!(filter.accepts(&make_post("anything at all", "goes through")));
    }

    #[tokio::test]
    async fn active_gate_filters_posts() {
        let (_store, matcher) = seeded_matcher(&["need help"], &["database"]).await;
        let filter = KeywordFilter::new(Arc::new(matcher));

        assert!(filter.gate_active());
        assert!(filter.accepts(&make_post("Need help", "picking a database")));
        assert!(!filter.accepts(&make_post("Showing off", "my new keyboard")));
    }
}
