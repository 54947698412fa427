//! Shared types, error model, and configuration for Mindful News.
//!
//! This crate is the foundation depended on by all other Mindful News crates.
//! It provides:
//! - [`MindfulNewsError`]: the unified error type
//! - Domain types ([`Article`], [`ArticleId`], [`SynthesizedStory`], [`FeedOutput`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], [`IngestConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ChannelConfig, DEFAULT_PLACEHOLDER_IMAGE, EditorialConfig, FeedGroup, FeedSource,
    FetchConfig, IngestConfig, LlmConfig, OutputConfig, PipelineConfig, PipelineSection,
    PromptsConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    resolve_api_key,
};
pub use error::{MindfulNewsError, Result};
pub use types::{
    Article, ArticleId, FEED_DATE_FORMAT, FeedOutput, SynthesizedStory, format_feed_date, within_window,
};
