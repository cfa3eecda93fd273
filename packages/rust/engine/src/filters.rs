//! Engagement and content gates for harvested posts.
//!
//! Both are pure predicates over a single post. The pipeline applies them
//! after the keyword gate; a rejection carries a short reason for logging.

use regex::Regex;

use dragnet_shared::{DragnetError, FiltersConfig, Post, Result};

/// Phrases that mark a post as promotional rather than a genuine ask.
const PROMO_PHRASES: &[&str] = &[
    "check out my",
    "use code",
    "discount",
    "promo",
    "our product",
    "we just launched",
    "sign up at",
];

/// Author-name suffixes typical of company and bot accounts.
const PROMO_AUTHOR_SUFFIXES: &[&str] = &["bot", "official", "app", "hq"];

// ---------------------------------------------------------------------------
// EngagementFilter
// ---------------------------------------------------------------------------

/// Pass posts meeting minimum engagement thresholds.
#[derive(Debug, Clone, Copy)]
pub struct EngagementFilter {
    min_upvotes: i64,
    min_comments: i64,
}

impl EngagementFilter {
    pub fn new(config: &FiltersConfig) -> Self {
        Self {
            min_upvotes: config.min_upvotes,
            min_comments: config.min_comments,
        }
    }

    /// Whether `post` meets both thresholds. Defaults of zero pass all.
    pub fn accepts(&self, post: &Post) -> bool {
        post.upvotes >= self.min_upvotes && post.comment_count >= self.min_comments
    }
}

// ---------------------------------------------------------------------------
// ContentFilter
// ---------------------------------------------------------------------------

/// Reject promotional posts by phrasing, link density, or author name.
pub struct ContentFilter {
    link_pattern: Regex,
    max_links: usize,
}

impl ContentFilter {
    pub fn new(config: &FiltersConfig) -> Result<Self> {
        let link_pattern = Regex::new(r"https?://")
            .map_err(|e| DragnetError::config(format!("invalid link pattern: {e}")))?;
        Ok(Self {
            link_pattern,
            max_links: config.max_links,
        })
    }

    /// The reason `post` is rejected, or `None` when it passes.
    pub fn rejects(&self, post: &Post) -> Option<&'static str> {
        let text = post.search_text().to_lowercase();

        if PROMO_PHRASES.iter().any(|phrase| text.contains(phrase)) {
            return Some("promotional phrasing");
        }

        if self.link_pattern.find_iter(&text).count() > self.max_links {
            return Some("too many outbound links");
        }

        let author = post.author.to_lowercase();
        if PROMO_AUTHOR_SUFFIXES
            .iter()
            .any(|suffix| author.ends_with(suffix))
        {
            return Some("promotional author name");
        }

        None
    }

    /// Whether `post` passes the content gate.
    pub fn accepts(&self, post: &Post) -> bool {
        self.rejects(post).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dragnet_shared::{PostId, PostStatus};

    fn make_post(title: &str, body: &str, author: &str, upvotes: i64, comments: i64) -> Post {
        let now = Utc::now();
        Post {
            id: PostId::new(),
            source_id: Some("t3_f".into()),
            permalink: None,
            channel: "rust".into(),
            title: title.into(),
            body: body.into(),
            author: author.into(),
            upvotes,
            comment_count: comments,
            status: PostStatus::Intake,
            assigned_to: None,
            posted_at: now,
            fetched_at: now,
            created_at: now,
        }
    }

    fn filters_config(min_upvotes: i64, min_comments: i64, max_links: usize) -> FiltersConfig {
        FiltersConfig {
            enabled: true,
            min_upvotes,
            min_comments,
            max_links,
        }
    }

    #[test]
    fn engagement_defaults_pass_everything() {
        let filter = EngagementFilter::new(&FiltersConfig::default());
        assert!(filter.accepts(&make_post("t", "b", "alice", 0, 0)));
    }

    #[test]
    fn engagement_enforces_both_thresholds() {
        let filter = EngagementFilter::new(&filters_config(5, 2, 2));

        assert!(filter.accepts(&make_post("t", "b", "alice", 5, 2)));
        assert!(!filter.accepts(&make_post("t", "b", "alice", 4, 2)), "upvotes short");
        assert!(!filter.accepts(&make_post("t", "b", "alice", 5, 1)), "comments short");
    }

    #[test]
    fn content_rejects_promotional_phrasing() {
        let filter = ContentFilter::new(&FiltersConfig::default()).unwrap();

        let post = make_post("Check out my new SaaS", "Use CODE rust20 at checkout", "alice", 0, 0);
        assert_eq!(filter.rejects(&post), Some("promotional phrasing"));

        let ok = make_post("Need advice", "Choosing between two databases", "alice", 0, 0);
        assert_eq!(filter.rejects(&ok), None);
    }

    #[test]
    fn content_rejects_link_heavy_posts() {
        let filter = ContentFilter::new(&FiltersConfig::default()).unwrap();

        let body = "see https://a.example https://b.example and https://c.example";
        let post = make_post("links", body, "alice", 0, 0);
        assert_eq!(filter.rejects(&post), Some("too many outbound links"));

        let two_links = make_post("links", "https://a.example https://b.example", "alice", 0, 0);
        assert_eq!(filter.rejects(&two_links), None, "at the limit still passes");
    }

    #[test]
    fn content_rejects_company_style_authors() {
        let filter = ContentFilter::new(&FiltersConfig::default()).unwrap();

        for author in ["AcmeBot", "acme_official", "AcmeApp", "acmehq"] {
            let post = make_post("t", "b", author, 0, 0);
            assert_eq!(
                filter.rejects(&post),
                Some("promotional author name"),
                "{author}"
            );
        }

        assert_eq!(filter.rejects(&make_post("t", "b", "alice", 0, 0)), None);
    }
}
