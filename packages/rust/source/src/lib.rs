//! Access to the external content platform.
//!
//! This crate provides:
//! - [`Fetcher`] — pulls recent posts from a set of channels
//! - [`Responder`] — publishes a reply to a post on the platform
//! - [`http`] — HTTP implementations of both against the platform's JSON API
//!
//! The traits exist so the orchestration layer can run against test doubles;
//! production wiring uses [`HttpFetcher`] and [`HttpResponder`].

use async_trait::async_trait;
use dragnet_shared::{Post, Result};

pub mod http;

pub use http::{HttpFetcher, HttpResponder};

/// Outcome of a fetch pass over all configured channels.
///
/// Individual channel failures are recorded rather than aborting the pass, so
/// one unreachable channel does not cost the posts from the healthy ones.
#[derive(Debug, Default)]
pub struct FetchBatch {
    /// Posts harvested from channels that responded, in fetch order.
    pub posts: Vec<Post>,
    /// `(channel, error)` pairs for channels that could not be fetched.
    pub failed_sources: Vec<(String, String)>,
}

/// Pulls recent posts from the external platform.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch recent posts from every channel in `sources`.
    ///
    /// Per-channel failures are collected into [`FetchBatch::failed_sources`];
    /// an `Err` means the pass as a whole could not run.
    async fn fetch_all(&self, sources: &[String]) -> Result<FetchBatch>;
}

/// Publishes replies to posts on the external platform.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Post `text` as a reply to the item identified by `source_id`.
    async fn post_reply(&self, source_id: &str, text: &str) -> Result<()>;
}
