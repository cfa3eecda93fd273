//! Core domain types for dragnet.
//!
//! A [`Post`] is one harvested content unit. It enters the store in
//! [`PostStatus::Intake`], is promoted to `Pending` immediately after
//! creation, and from there moves only through the lifecycle engine's
//! transition table. Every successful transition appends one
//! [`StatusChange`] row.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Actor recorded on automatic transitions (pipeline, sweeps).
pub const SYSTEM_ACTOR: &str = "system";

// ---------------------------------------------------------------------------
// PostId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for post identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub Uuid);

impl PostId {
    /// Generate a new time-sortable post identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for PostId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PostId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// PostStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a stored post.
///
/// `Archived` is terminal. The valid transition table lives in the
/// lifecycle engine; nothing outside it mutates a post's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    /// Just created by the pipeline, not yet triaged.
    Intake,
    /// Awaiting a worker claim.
    Pending,
    /// Claimed by the worker in `assigned_to`.
    Assigned,
    /// Worker completed their action.
    Resolved,
    /// Terminal. Expired or closed out.
    Archived,
}

impl PostStatus {
    /// Stable lowercase name, as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::Resolved => "resolved",
            Self::Archived => "archived",
        }
    }

    /// All five statuses, in lifecycle order.
    pub fn all() -> [PostStatus; 5] {
        [
            Self::Intake,
            Self::Pending,
            Self::Assigned,
            Self::Resolved,
            Self::Archived,
        ]
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PostStatus {
    type Err = crate::error::DragnetError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "intake" => Ok(Self::Intake),
            "pending" => Ok(Self::Pending),
            "assigned" => Ok(Self::Assigned),
            "resolved" => Ok(Self::Resolved),
            "archived" => Ok(Self::Archived),
            other => Err(crate::error::DragnetError::storage(format!(
                "unknown post status '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Post
// ---------------------------------------------------------------------------

/// One harvested content unit, as persisted in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    /// Unique identifier (UUID v7), assigned at ingestion.
    pub id: PostId,
    /// Identifier in the external service. Unique when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    /// Canonical link to the post. Unique when non-empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
    /// Source channel/community the post was harvested from.
    pub channel: String,
    /// Post title.
    pub title: String,
    /// Post body text (may be empty for link posts).
    #[serde(default)]
    pub body: String,
    /// Author handle at the external service.
    pub author: String,
    /// Upvote count at fetch time.
    #[serde(default)]
    pub upvotes: i64,
    /// Comment count at fetch time.
    #[serde(default)]
    pub comment_count: i64,
    /// Current lifecycle status.
    pub status: PostStatus,
    /// Worker currently holding the post, when `status == Assigned`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    /// When the post was created at the source.
    pub posted_at: DateTime<Utc>,
    /// When the pipeline fetched the post. Eviction orders by this.
    pub fetched_at: DateTime<Utc>,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// The external-identifier dedup key, if usable (present and non-empty).
    pub fn source_key(&self) -> Option<&str> {
        self.source_id.as_deref().filter(|s| !s.is_empty())
    }

    /// The permalink dedup key, if usable (present and non-empty).
    pub fn permalink_key(&self) -> Option<&str> {
        self.permalink.as_deref().filter(|s| !s.is_empty())
    }

    /// Title and body joined, the haystack for keyword matching.
    pub fn search_text(&self) -> String {
        format!("{} {}", self.title, self.body)
    }
}

// ---------------------------------------------------------------------------
// StatusChange
// ---------------------------------------------------------------------------

/// One append-only audit record per successful lifecycle transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    /// Row identifier, assigned by the store.
    pub id: i64,
    /// The post this change applies to.
    pub post_id: PostId,
    /// Status before the transition.
    pub old_status: PostStatus,
    /// Status after the transition.
    pub new_status: PostStatus,
    /// Worker id, or [`SYSTEM_ACTOR`] for automatic transitions.
    pub actor: String,
    /// Machine-readable reason code (e.g. `auto_expire`, `reply_posted`).
    pub reason: String,
    /// When the transition committed.
    pub changed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Keyword
// ---------------------------------------------------------------------------

/// Which of the two AND-combined keyword classes a term belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordClass {
    Primary,
    Secondary,
}

impl KeywordClass {
    /// Stable lowercase name, as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

impl std::fmt::Display for KeywordClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for KeywordClass {
    type Err = crate::error::DragnetError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "primary" => Ok(Self::Primary),
            "secondary" => Ok(Self::Secondary),
            other => Err(crate::error::DragnetError::storage(format!(
                "unknown keyword class '{other}'"
            ))),
        }
    }
}

/// A relevance keyword, case-normalized at write time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyword {
    /// Lowercased, trimmed term.
    pub word: String,
    /// Primary or secondary class.
    pub class: KeywordClass,
    /// Keyword namespace. Single `"default"` tenant in this deployment.
    pub tenant: String,
    /// Disabled keywords are ignored by the matcher.
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// MatchResult
// ---------------------------------------------------------------------------

/// Full outcome of a keyword match. Always whole, never partial:
/// `matched` is true iff both term lists are non-empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchResult {
    pub matched: bool,
    pub matched_primary: Vec<String>,
    pub matched_secondary: Vec<String>,
}

impl MatchResult {
    /// An empty, non-matching result.
    pub fn no_match() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// KnownKeys
// ---------------------------------------------------------------------------

/// Snapshot of the store's dedup keys, taken at pipeline start.
#[derive(Debug, Clone, Default)]
pub struct KnownKeys {
    pub source_ids: HashSet<String>,
    pub permalinks: HashSet<String>,
}

// ---------------------------------------------------------------------------
// RunSummary / RunOutcome
// ---------------------------------------------------------------------------

/// Counts and timing for one completed pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Items returned by the fetch stage across all sources.
    pub fetched: usize,
    /// Items persisted as new rows.
    pub saved: usize,
    /// Items dropped by dedup plus create-time duplicates.
    pub duplicates_skipped: usize,
    /// Items removed by the capacity sweep before fetch.
    pub evicted: usize,
    /// Items rejected by the filter stage.
    pub filtered_out: usize,
    /// Sources that failed to fetch (run continued without them).
    pub sources_failed: usize,
    /// True when the filter stage was skipped by configuration.
    pub filters_bypassed: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Scheduler-level result of one trigger, scheduled or manual.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The pipeline ran to completion.
    Completed { summary: RunSummary },
    /// Another run held the lock, or the scheduler is stopped.
    Skipped { reason: String },
    /// The pipeline raised a run-level error. The schedule continues.
    Failed { error: String },
}

impl RunOutcome {
    /// True for the `Skipped` variant.
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

// ---------------------------------------------------------------------------
// SchedulerStatus
// ---------------------------------------------------------------------------

/// Read-only snapshot of the scheduler's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStatus {
    /// Whether the scheduler loop is active.
    pub running: bool,
    /// Whether a pipeline run currently holds the exclusivity lock.
    pub job_in_flight: bool,
    /// When the last run started, if any.
    pub last_run_at: Option<DateTime<Utc>>,
    /// When the next scheduled run is due, if the scheduler is active.
    pub next_run_at: Option<DateTime<Utc>>,
    /// Configured pipeline interval.
    pub interval_hours: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_post() -> Post {
        Post {
            id: PostId::new(),
            source_id: Some("t3_abc123".into()),
            permalink: Some("https://example.com/r/rust/comments/abc123".into()),
            channel: "rust".into(),
            title: "Need help picking a web framework".into(),
            body: "Evaluating options for an internal tool.".into(),
            author: "alice".into(),
            upvotes: 4,
            comment_count: 2,
            status: PostStatus::Intake,
            assigned_to: None,
            posted_at: Utc::now(),
            fetched_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn post_id_roundtrip() {
        let id = PostId::new();
        let s = id.to_string();
        let parsed: PostId = s.parse().expect("parse PostId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn status_str_roundtrip() {
        for status in PostStatus::all() {
            let parsed: PostStatus = status.as_str().parse().expect("parse status");
            assert_eq!(parsed, status);
        }
        assert!("limbo".parse::<PostStatus>().is_err());
    }

    #[test]
    fn status_serde_uses_snake_case() {
        let json = serde_json::to_string(&PostStatus::Assigned).expect("serialize");
        assert_eq!(json, "\"assigned\"");
    }

    #[test]
    fn post_serialization_roundtrip() {
        let post = sample_post();
        let json = serde_json::to_string(&post).expect("serialize");
        let parsed: Post = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.id, post.id);
        assert_eq!(parsed.status, PostStatus::Intake);
        assert_eq!(parsed.source_id.as_deref(), Some("t3_abc123"));
    }

    #[test]
    fn dedup_keys_ignore_empty_strings() {
        let mut post = sample_post();
        post.permalink = Some(String::new());
        assert_eq!(post.permalink_key(), None);
        assert_eq!(post.source_key(), Some("t3_abc123"));

        post.source_id = None;
        assert_eq!(post.source_key(), None);
    }

    #[test]
    fn search_text_joins_title_and_body() {
        let post = sample_post();
        let text = post.search_text();
        assert!(text.contains("web framework"));
        assert!(text.contains("internal tool"));
    }

    #[test]
    fn run_outcome_serializes_with_status_tag() {
        let outcome = RunOutcome::Skipped {
            reason: "already running".into(),
        };
        let json = serde_json::to_string(&outcome).expect("serialize");
        assert!(json.contains("\"status\":\"skipped\""));
        assert!(json.contains("already running"));
    }
}
