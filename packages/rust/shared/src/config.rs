//! Application configuration for Mindful News.
//!
//! User config lives at `~/.mindfulnews/mindfulnews.toml` unless a path is
//! given explicitly. CLI flags override config file values, which override
//! defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MindfulNewsError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "mindfulnews.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".mindfulnews";

/// Image used for stories whose first member has no usable image.
pub const DEFAULT_PLACEHOLDER_IMAGE: &str =
    "https://www.mindfulnews.media/wp-content/uploads/2025/06/ChatGPT-Image-Jun-18-2025-07_46_58-PM.png";

// ---------------------------------------------------------------------------
// Config structs (matching mindfulnews.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Recency, cap, and synthesis thresholds.
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Output file locations.
    #[serde(default)]
    pub output: OutputConfig,

    /// Channel metadata for the rendered feed.
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Feed and image fetching.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Text-generation endpoint settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Optional prompt file overrides.
    #[serde(default)]
    pub prompts: PromptsConfig,

    /// Optional editorial review pass.
    #[serde(default)]
    pub editorial: EditorialConfig,

    /// Feed sources grouped by region.
    #[serde(default)]
    pub feeds: Vec<FeedGroup>,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// How many hours back to include feed items.
    #[serde(default = "default_recency_window_hours")]
    pub recency_window_hours: u32,

    /// Maximum number of articles handed to clustering.
    #[serde(default = "default_max_articles")]
    pub max_articles: usize,

    /// Sort by publish date (newest first) before applying the cap.
    #[serde(default = "default_true")]
    pub sort_by_recency: bool,

    /// Minimum characters per synthesized story.
    #[serde(default = "default_min_synthesis_chars")]
    pub min_synthesis_chars: usize,

    /// Request ceiling per story, including the first request.
    #[serde(default = "default_max_synthesis_attempts")]
    pub max_synthesis_attempts: u32,

    /// Positivity tag used when the generator does not emit one.
    #[serde(default = "default_positivity")]
    pub default_positivity: String,

    /// Fallback image for stories without a usable one.
    #[serde(default = "default_placeholder_image")]
    pub placeholder_image: String,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            recency_window_hours: default_recency_window_hours(),
            max_articles: default_max_articles(),
            sort_by_recency: true,
            min_synthesis_chars: default_min_synthesis_chars(),
            max_synthesis_attempts: default_max_synthesis_attempts(),
            default_positivity: default_positivity(),
            placeholder_image: default_placeholder_image(),
        }
    }
}

fn default_recency_window_hours() -> u32 {
    48
}
fn default_max_articles() -> usize {
    100
}
fn default_true() -> bool {
    true
}
fn default_min_synthesis_chars() -> usize {
    3000
}
fn default_max_synthesis_attempts() -> u32 {
    3
}
fn default_positivity() -> String {
    "Constructive".into()
}
fn default_placeholder_image() -> String {
    DEFAULT_PLACEHOLDER_IMAGE.into()
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Where the synthesized feed is written.
    #[serde(default = "default_rss_path")]
    pub rss_path: String,

    /// Where the editorially filtered feed is written (editorial pass only).
    #[serde(default = "default_filtered_rss_path")]
    pub filtered_rss_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            rss_path: default_rss_path(),
            filtered_rss_path: default_filtered_rss_path(),
        }
    }
}

fn default_rss_path() -> String {
    "mindfulnews.xml".into()
}
fn default_filtered_rss_path() -> String {
    "mindfulnews_filtered.xml".into()
}

/// `[channel]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "default_channel_title")]
    pub title: String,
    #[serde(default = "default_channel_link")]
    pub link: String,
    #[serde(default = "default_channel_description")]
    pub description: String,
    #[serde(default = "default_channel_author")]
    pub author: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            title: default_channel_title(),
            link: default_channel_link(),
            description: default_channel_description(),
            author: default_channel_author(),
        }
    }
}

fn default_channel_title() -> String {
    "Mindful News".into()
}
fn default_channel_link() -> String {
    "https://www.mindfulnews.media".into()
}
fn default_channel_description() -> String {
    "Calm, constructive news synthesized from many sources.".into()
}
fn default_channel_author() -> String {
    "Mindful News".into()
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-request timeout for feed downloads.
    #[serde(default = "default_feed_timeout")]
    pub feed_timeout_secs: u64,

    /// Per-request timeout for article page downloads (image discovery).
    #[serde(default = "default_image_timeout")]
    pub image_timeout_secs: u64,

    /// Attempts per article page before giving up on an image.
    #[serde(default = "default_image_attempts")]
    pub image_attempts: u32,

    /// Fixed delay between image page attempts.
    #[serde(default = "default_image_retry_delay")]
    pub image_retry_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            feed_timeout_secs: default_feed_timeout(),
            image_timeout_secs: default_image_timeout(),
            image_attempts: default_image_attempts(),
            image_retry_delay_ms: default_image_retry_delay(),
        }
    }
}

fn default_feed_timeout() -> u64 {
    15
}
fn default_image_timeout() -> u64 {
    10
}
fn default_image_attempts() -> u32 {
    3
}
fn default_image_retry_delay() -> u64 {
    2000
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for clustering, synthesis and editorial review.
    #[serde(default = "default_model")]
    pub model: String,

    /// Completion token ceiling for clustering and synthesis.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-call timeout.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_max_tokens() -> u32 {
    4000
}
fn default_llm_timeout() -> u64 {
    300
}

/// `[prompts]` section. Unset entries use the built-in prompts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clustering: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesis: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editorial: Option<PathBuf>,
}

/// `[editorial]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorialConfig {
    /// Run the accept/reject pass and write the filtered feed.
    #[serde(default)]
    pub enabled: bool,

    /// Completion token ceiling for one review.
    #[serde(default = "default_editorial_max_tokens")]
    pub max_tokens: u32,
}

impl Default for EditorialConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_tokens: default_editorial_max_tokens(),
        }
    }
}

fn default_editorial_max_tokens() -> u32 {
    500
}

/// `[[feeds]]` entry: a region and its feed URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedGroup {
    pub region: String,
    pub urls: Vec<String>,
}

/// One feed URL tagged with its region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSource {
    pub url: String,
    pub region: Option<String>,
}

impl AppConfig {
    /// Flatten the configured feed groups into sources, preserving file order.
    pub fn feed_sources(&self) -> Vec<FeedSource> {
        self.feeds
            .iter()
            .flat_map(|group| {
                group.urls.iter().map(|url| FeedSource {
                    url: url.clone(),
                    region: Some(group.region.clone()),
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Runtime configs (derived from AppConfig, passed into each stage)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration for the filter, synthesis and assembly stages.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum article age.
    pub recency_window: chrono::Duration,
    /// Maximum working-set size.
    pub max_articles: usize,
    /// Sort newest-first before capping.
    pub sort_by_recency: bool,
    /// Minimum synthesized body length in characters.
    pub min_synthesis_chars: usize,
    /// Request ceiling per story.
    pub max_synthesis_attempts: u32,
    /// Positivity tag used when the generator does not emit one.
    pub default_positivity: String,
    /// Fallback image URL.
    pub placeholder_image: String,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        let p = &config.pipeline;
        Self {
            recency_window: chrono::Duration::hours(i64::from(p.recency_window_hours)),
            max_articles: p.max_articles,
            sort_by_recency: p.sort_by_recency,
            min_synthesis_chars: p.min_synthesis_chars,
            max_synthesis_attempts: p.max_synthesis_attempts.max(1),
            default_positivity: p.default_positivity.clone(),
            placeholder_image: p.placeholder_image.clone(),
        }
    }
}

/// Runtime settings for the feed ingestor and image resolver.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub recency_window: chrono::Duration,
    pub feed_timeout: Duration,
    pub image_timeout: Duration,
    pub image_attempts: u32,
    pub image_retry_delay: Duration,
}

impl From<&AppConfig> for IngestConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            recency_window: chrono::Duration::hours(i64::from(
                config.pipeline.recency_window_hours,
            )),
            feed_timeout: Duration::from_secs(config.fetch.feed_timeout_secs),
            image_timeout: Duration::from_secs(config.fetch.image_timeout_secs),
            image_attempts: config.fetch.image_attempts.max(1),
            image_retry_delay: Duration::from_millis(config.fetch.image_retry_delay_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.mindfulnews/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| MindfulNewsError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.mindfulnews/mindfulnews.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| MindfulNewsError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        MindfulNewsError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| MindfulNewsError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| MindfulNewsError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| MindfulNewsError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the API key from the env var named in `[llm]`; empty counts as unset.
pub fn resolve_api_key(config: &LlmConfig) -> Result<String> {
    let var_name = &config.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(MindfulNewsError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}
