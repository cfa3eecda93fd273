//! Harvest pipeline, post lifecycle, and scheduling.
//!
//! This crate provides:
//! - [`pipeline`] — The fetch/dedup/filter/persist harvest pass
//! - [`lifecycle`] — Status transitions with an append-only audit trail
//! - [`scheduler`] — Interval-driven runs with single-flight exclusivity
//! - [`dedup`], [`keywords`], [`filters`] — The individual pipeline stages
//! - [`sweeps`] — Age-based expiry and unassignment maintenance

pub mod actions;
pub mod dedup;
pub mod filters;
pub mod keywords;
pub mod lifecycle;
pub mod pipeline;
pub mod scheduler;
pub mod sweeps;

pub use actions::{ActionValidator, UserAction};
pub use dedup::Deduplicator;
pub use filters::{ContentFilter, EngagementFilter};
pub use keywords::{KeywordFilter, KeywordMatcher, KeywordSets, SetMatcher};
pub use lifecycle::{LifecycleEngine, allowed_targets};
pub use pipeline::{HarvestPipeline, ProgressReporter, SilentProgress};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use sweeps::Sweeps;
