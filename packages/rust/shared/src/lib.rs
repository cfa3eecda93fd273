//! Shared types, error model, and configuration for dragnet.
//!
//! This crate is the foundation depended on by all other dragnet crates.
//! It provides:
//! - [`DragnetError`] — the unified error type
//! - Domain types ([`Post`], [`PostStatus`], [`StatusChange`], [`Keyword`],
//!   [`MatchResult`], [`RunSummary`], [`RunOutcome`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, FiltersConfig, HarvestConfig, KeywordsConfig, LifecycleConfig, ResponderConfig,
    StorageBackend, StorageConfig, config_dir, config_file_path, expand_tilde, init_config,
    load_config, load_config_from, resolve_db_path, validate, validate_responder_token,
};
pub use error::{DragnetError, Result};
pub use types::{
    Keyword, KeywordClass, KnownKeys, MatchResult, Post, PostId, PostStatus, RunOutcome,
    RunSummary, SYSTEM_ACTOR, SchedulerStatus, StatusChange,
};
