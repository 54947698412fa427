//! Feed fetching and entry normalization.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use regex::Regex;
use reqwest::Client;
use tracing::{debug, info, instrument, warn};

use mindfulnews_shared::{
    Article, ArticleId, FeedSource, IngestConfig, MindfulNewsError, Result, within_window,
};

use crate::USER_AGENT;
use crate::image::ImageResolver;

/// Matches XML declarations that some publishers embed inside summaries.
static XML_DECLARATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\s*<\?xml.*?\?>\s*").unwrap());

// ---------------------------------------------------------------------------
// FeedEntry
// ---------------------------------------------------------------------------

/// One entry as read from a feed, before windowing and image resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub published_at: DateTime<Utc>,
    /// Image URL carried by the entry's media or enclosure metadata.
    pub media: Option<String>,
}

/// Parse a syndication document (RSS, Atom or JSON Feed) into entries.
///
/// Entries without a title or link are dropped. A missing timestamp falls
/// back to `updated`, then to `reference_time`.
pub fn parse_feed(bytes: &[u8], reference_time: DateTime<Utc>) -> Result<Vec<FeedEntry>> {
    let feed = feed_rs::parser::parse(bytes)
        .map_err(|e| MindfulNewsError::parse(format!("unreadable feed: {e}")))?;

    let mut entries = Vec::with_capacity(feed.entries.len());
    for entry in feed.entries {
        let title = entry
            .title
            .as_ref()
            .map(|t| t.content.trim().to_string())
            .unwrap_or_default();
        let Some(link) = entry_link(&entry) else {
            debug!(%title, "entry has no link, skipping");
            continue;
        };
        if title.is_empty() {
            debug!(%link, "entry has no title, skipping");
            continue;
        }

        let summary = entry
            .summary
            .as_ref()
            .map(|s| s.content.clone())
            .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
            .unwrap_or_default();

        entries.push(FeedEntry {
            published_at: entry.published.or(entry.updated).unwrap_or(reference_time),
            media: entry_media(&entry),
            summary: strip_declarations(&summary),
            title,
            link,
        });
    }

    Ok(entries)
}

fn entry_link(entry: &Entry) -> Option<String> {
    let usable = |rel: Option<&str>| !matches!(rel, Some("enclosure" | "self" | "edit"));
    entry
        .links
        .iter()
        .find(|l| usable(l.rel.as_deref()) && !l.href.trim().is_empty())
        .map(|l| l.href.trim().to_string())
}

/// First image URL from media content, media thumbnails, or an image enclosure.
fn entry_media(entry: &Entry) -> Option<String> {
    let is_image = |mime: Option<String>| mime.is_none_or(|m| m.starts_with("image/"));

    let from_content = entry.media.iter().flat_map(|m| &m.content).find_map(|c| {
        let url = c.url.as_ref()?;
        is_image(c.content_type.as_ref().map(|t| t.to_string())).then(|| url.to_string())
    });
    if from_content.is_some() {
        return from_content;
    }

    let from_thumbnail = entry
        .media
        .iter()
        .flat_map(|m| &m.thumbnails)
        .map(|t| t.image.uri.trim())
        .find(|uri| !uri.is_empty())
        .map(str::to_string);
    if from_thumbnail.is_some() {
        return from_thumbnail;
    }

    entry
        .links
        .iter()
        .filter(|l| l.rel.as_deref() == Some("enclosure"))
        .find(|l| {
            l.media_type
                .as_deref()
                .is_some_and(|t| t.starts_with("image/"))
        })
        .map(|l| l.href.clone())
}

/// Remove embedded `<?xml ...?>` declarations.
pub fn strip_declarations(text: &str) -> String {
    XML_DECLARATION.replace_all(text, "").trim().to_string()
}

// ---------------------------------------------------------------------------
// FeedIngestor
// ---------------------------------------------------------------------------

/// Counters and results from one ingestion pass.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Retained articles in source-encounter order.
    pub articles: Vec<Article>,
    pub sources_fetched: usize,
    pub sources_failed: usize,
    pub entries_seen: usize,
    /// Entries dropped for falling outside the recency window.
    pub entries_stale: usize,
}

/// Fetches configured sources and normalizes their entries into [`Article`]s.
pub struct FeedIngestor {
    client: Client,
    images: ImageResolver,
    recency_window: chrono::Duration,
}

impl FeedIngestor {
    pub fn new(config: &IngestConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.feed_timeout)
            .build()
            .map_err(|e| {
                MindfulNewsError::Network(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            images: ImageResolver::new(config)?,
            recency_window: config.recency_window,
        })
    }

    /// Ingest every source in order. Failing sources are logged and skipped.
    ///
    /// Article ids are assigned sequentially across all sources, starting at 0.
    #[instrument(skip_all, fields(sources = sources.len()))]
    pub async fn ingest(
        &self,
        sources: &[FeedSource],
        reference_time: DateTime<Utc>,
    ) -> IngestReport {
        let mut report = IngestReport::default();

        for source in sources {
            let entries = match self.fetch_source(&source.url, reference_time).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(url = %source.url, error = %e, "skipping feed source");
                    report.sources_failed += 1;
                    continue;
                }
            };
            report.sources_fetched += 1;
            report.entries_seen += entries.len();

            for entry in entries {
                if !within_window(&entry.published_at, &reference_time, self.recency_window) {
                    report.entries_stale += 1;
                    continue;
                }

                let image = self.images.resolve(entry.media.as_deref(), &entry.link).await;
                let id = ArticleId(report.articles.len() as u32);
                report.articles.push(Article {
                    id,
                    title: entry.title,
                    link: entry.link,
                    summary: entry.summary,
                    published_at: entry.published_at,
                    image,
                    source_region: source.region.clone(),
                });
            }
        }

        info!(
            articles = report.articles.len(),
            fetched = report.sources_fetched,
            failed = report.sources_failed,
            stale = report.entries_stale,
            "ingestion complete"
        );
        report
    }

    async fn fetch_source(
        &self,
        url: &str,
        reference_time: DateTime<Utc>,
    ) -> Result<Vec<FeedEntry>> {
        debug!(%url, "fetching feed");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MindfulNewsError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MindfulNewsError::Network(format!("{url}: HTTP {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MindfulNewsError::Network(format!("{url}: body read failed: {e}")))?;

        parse_feed(&bytes, reference_time)
    }
}
