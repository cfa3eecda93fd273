//! Duplicate detection for harvested posts.
//!
//! A post is a duplicate when its external identifier or its permalink is
//! already known. Both keys are checked; either match suffices. Posts
//! missing both keys are never flagged here (the store's unique columns
//! are the final backstop).

use std::collections::HashSet;

use tracing::debug;

use dragnet_shared::{KnownKeys, Post};

/// Checks posts against the store's known dedup keys.
pub struct Deduplicator {
    known: KnownKeys,
}

impl Deduplicator {
    /// Build from a snapshot of the store's keys, taken at pipeline start.
    pub fn new(known: KnownKeys) -> Self {
        debug!(
            source_ids = known.source_ids.len(),
            permalinks = known.permalinks.len(),
            "deduplicator initialized"
        );
        Self { known }
    }

    /// Whether `post` matches a key the store already holds.
    pub fn is_duplicate(&self, post: &Post) -> bool {
        if let Some(key) = post.source_key() {
            if self.known.source_ids.contains(key) {
                return true;
            }
        }
        if let Some(key) = post.permalink_key() {
            if self.known.permalinks.contains(key) {
                return true;
            }
        }
        false
    }

    /// Drop every duplicate from `posts`, keeping first occurrences.
    ///
    /// Checks within the batch as well as against the store, so the same
    /// post appearing twice in one fetch survives exactly once. Returns the
    /// unique posts and the number removed.
    pub fn filter_duplicates(&self, posts: Vec<Post>) -> (Vec<Post>, usize) {
        let total = posts.len();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut seen_links: HashSet<String> = HashSet::new();
        let mut unique = Vec::with_capacity(total);

        for post in posts {
            let in_batch = post
                .source_key()
                .is_some_and(|key| seen_ids.contains(key))
                || post
                    .permalink_key()
                    .is_some_and(|key| seen_links.contains(key));
            if in_batch || self.is_duplicate(&post) {
                debug!(source_id = ?post.source_id, "duplicate dropped");
                continue;
            }

            if let Some(key) = post.source_key() {
                seen_ids.insert(key.to_string());
            }
            if let Some(key) = post.permalink_key() {
                seen_links.insert(key.to_string());
            }
            unique.push(post);
        }

        let removed = total - unique.len();
        (unique, removed)
    }
}
