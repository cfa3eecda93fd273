//! HTTP implementations of the platform capabilities.
//!
//! [`HttpFetcher`] pulls channel listings from the platform's JSON API and
//! maps them into canonical [`Post`] records. [`HttpResponder`] publishes
//! replies through the comment endpoint with a bounded retry loop.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use dragnet_shared::{DragnetError, HarvestConfig, Post, PostId, PostStatus, Result};

use crate::{FetchBatch, Fetcher, Responder};

/// Request timeout for both fetch and reply calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Base delay for reply retry backoff (doubles per attempt).
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Reply attempts before giving up on retryable failures.
const REPLY_MAX_ATTEMPTS: u32 = 3;

// ---------------------------------------------------------------------------
// Listing payload
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    /// Kept as raw values so one malformed entry does not sink the page.
    #[serde(default)]
    children: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: RawPost,
}

/// One post as the platform serves it, before canonicalization.
#[derive(Debug, Deserialize)]
struct RawPost {
    /// Fullname identifier (`t3_...`), preferred over `id`.
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    permalink: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: i64,
    /// Seconds since epoch. Missing means "treat as fresh".
    #[serde(default)]
    created_utc: Option<f64>,
}

impl RawPost {
    /// Canonicalize into a [`Post`], or `None` when no usable identifier
    /// exists (such an entry could never be deduplicated).
    fn into_post(self, channel: &str, base: &Url, fetched_at: DateTime<Utc>) -> Option<Post> {
        let source_id = self
            .name
            .filter(|s| !s.is_empty())
            .or_else(|| self.id.filter(|s| !s.is_empty()).map(|id| format!("t3_{id}")))?;

        let permalink = self
            .permalink
            .as_deref()
            .filter(|s| !s.is_empty())
            .and_then(|p| base.join(p).ok())
            .map(|u| u.to_string());

        let body = if self.selftext == "[deleted]" || self.selftext == "[removed]" {
            String::new()
        } else {
            self.selftext
        };

        let author = self
            .author
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "[deleted]".to_string());

        let posted_at = self
            .created_utc
            .and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
            .unwrap_or(fetched_at);

        Some(Post {
            id: PostId::new(),
            source_id: Some(source_id),
            permalink,
            channel: channel.to_string(),
            title: self.title,
            body,
            author,
            upvotes: self.score,
            comment_count: self.num_comments,
            status: PostStatus::Intake,
            assigned_to: None,
            posted_at,
            fetched_at,
            created_at: fetched_at,
        })
    }
}

// ---------------------------------------------------------------------------
// HttpFetcher
// ---------------------------------------------------------------------------

/// Fetches channel listings over HTTP.
pub struct HttpFetcher {
    client: Client,
    base_url: Url,
    fetch_limit: u32,
    window_hours: u64,
}

impl HttpFetcher {
    /// Build a fetcher from the harvest configuration.
    pub fn new(config: &HarvestConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| DragnetError::config(format!("invalid harvest.base_url: {e}")))?;

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DragnetError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            fetch_limit: config.fetch_limit,
            window_hours: config.window_hours,
        })
    }

    /// Fetch one channel's listing and map it into posts newer than `cutoff`.
    async fn fetch_channel(
        &self,
        channel: &str,
        cutoff: DateTime<Utc>,
        fetched_at: DateTime<Utc>,
    ) -> Result<Vec<Post>> {
        let mut url = self
            .base_url
            .join(&format!("r/{channel}/new.json"))
            .map_err(|e| DragnetError::source(channel, format!("invalid listing URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("limit", &self.fetch_limit.to_string());

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DragnetError::source(channel, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DragnetError::source(
                channel,
                format!("listing returned HTTP {status}"),
            ));
        }

        let listing: Listing = response
            .json()
            .await
            .map_err(|e| DragnetError::source(channel, format!("invalid listing payload: {e}")))?;

        let mut posts = Vec::new();
        let mut outside_window = 0usize;
        let mut malformed = 0usize;

        for child in listing.data.children {
            let parsed: ListingChild = match serde_json::from_value(child) {
                Ok(parsed) => parsed,
                Err(e) => {
                    malformed += 1;
                    debug!(channel = %channel, error = %e, "skipping malformed listing entry");
                    continue;
                }
            };

            match parsed.data.into_post(channel, &self.base_url, fetched_at) {
                Some(post) => {
                    if post.posted_at < cutoff {
                        outside_window += 1;
                        continue;
                    }
                    posts.push(post);
                }
                None => {
                    malformed += 1;
                    debug!(channel = %channel, "skipping listing entry without identifier");
                }
            }
        }

        info!(
            channel = %channel,
            kept = posts.len(),
            outside_window,
            malformed,
            "fetched channel listing"
        );
        Ok(posts)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(skip_all, fields(channels = sources.len()))]
    async fn fetch_all(&self, sources: &[String]) -> Result<FetchBatch> {
        let fetched_at = Utc::now();
        let cutoff = fetched_at - chrono::Duration::hours(self.window_hours as i64);

        let mut batch = FetchBatch::default();
        for channel in sources {
            match self.fetch_channel(channel, cutoff, fetched_at).await {
                Ok(posts) => batch.posts.extend(posts),
                Err(e) => {
                    warn!(channel = %channel, error = %e, "channel fetch failed, continuing");
                    batch.failed_sources.push((channel.clone(), e.to_string()));
                }
            }
        }
        Ok(batch)
    }
}

// ---------------------------------------------------------------------------
// HttpResponder
// ---------------------------------------------------------------------------

/// Publishes replies through the platform's comment endpoint.
pub struct HttpResponder {
    client: Client,
    base_url: Url,
    token: String,
}

impl HttpResponder {
    /// Build a responder targeting `base_url`, authenticating with `token`.
    pub fn new(base_url: &str, user_agent: &str, token: String) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| DragnetError::config(format!("invalid responder base URL: {e}")))?;

        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DragnetError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }
}

#[async_trait]
impl Responder for HttpResponder {
    async fn post_reply(&self, source_id: &str, text: &str) -> Result<()> {
        let url = self
            .base_url
            .join("api/comment")
            .map_err(|e| DragnetError::Network(format!("invalid comment URL: {e}")))?;
        let payload = serde_json::json!({ "parent_id": source_id, "text": text });

        let mut last_error = String::new();
        for attempt in 0..REPLY_MAX_ATTEMPTS {
            if attempt > 0 {
                let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying reply");
                tokio::time::sleep(delay).await;
            }

            let sent = self
                .client
                .post(url.clone())
                .bearer_auth(&self.token)
                .json(&payload)
                .send()
                .await;

            match sent {
                Ok(response) if response.status().is_success() => {
                    info!(source_id = %source_id, "reply posted");
                    return Ok(());
                }
                Ok(response) => {
                    let status = response.status();
                    // Only transient statuses are worth another attempt.
                    if status.is_server_error()
                        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
                    {
                        last_error = format!("reply endpoint returned HTTP {status}");
                        warn!(source_id = %source_id, %status, attempt, "reply attempt failed");
                        continue;
                    }
                    return Err(DragnetError::Network(format!(
                        "reply to {source_id} rejected: HTTP {status}"
                    )));
                }
                Err(e) => {
                    last_error = format!("request failed: {e}");
                    warn!(source_id = %source_id, error = %e, attempt, "reply attempt failed");
                }
            }
        }

        Err(DragnetError::Network(format!(
            "reply to {source_id} failed after {REPLY_MAX_ATTEMPTS} attempts: {last_error}"
        )))
    }
}
