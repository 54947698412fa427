//! Representative-image discovery for articles.
//!
//! Fallback chain, first hit wins:
//! 1. media metadata carried by the feed entry
//! 2. `og:image` on the linked page
//! 3. first `<img src>` on the linked page
//!
//! Failures never escape: the resolver answers `None` and the caller picks
//! its own placeholder.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use tracing::{debug, instrument, warn};
use url::Url;

use mindfulnews_shared::{IngestConfig, MindfulNewsError, Result};

use crate::USER_AGENT;

/// Why a page fetch failed, and whether another attempt could help.
#[derive(Debug)]
enum PageError {
    /// Transport error, timeout, 5xx or 429.
    Retryable(String),
    /// Any other non-success status.
    Permanent(String),
}

/// Resolves an image URL for an article link.
pub struct ImageResolver {
    client: Client,
    attempts: u32,
    retry_delay: Duration,
}

impl ImageResolver {
    /// Create a resolver with the configured timeout and retry policy.
    pub fn new(config: &IngestConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.image_timeout)
            .build()
            .map_err(|e| {
                MindfulNewsError::Network(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            attempts: config.image_attempts.max(1),
            retry_delay: config.image_retry_delay,
        })
    }

    /// Resolve an image for `link`, preferring `entry_media` when present.
    #[instrument(skip_all, fields(link = %link))]
    pub async fn resolve(&self, entry_media: Option<&str>, link: &str) -> Option<String> {
        if let Some(media) = entry_media.map(str::trim).filter(|m| !m.is_empty()) {
            return Some(media.to_string());
        }

        let page_url = match Url::parse(link) {
            Ok(url) => url,
            Err(e) => {
                debug!(error = %e, "article link is not a URL, skipping image lookup");
                return None;
            }
        };

        for attempt in 1..=self.attempts {
            match self.fetch_page(&page_url).await {
                Ok(body) => return extract_image(&body, &page_url),
                Err(PageError::Permanent(reason)) => {
                    warn!(%reason, "image page unavailable");
                    return None;
                }
                Err(PageError::Retryable(reason)) => {
                    warn!(attempt, max_attempts = self.attempts, %reason, "image page fetch failed");
                    if attempt < self.attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        None
    }

    async fn fetch_page(&self, url: &Url) -> std::result::Result<String, PageError> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| PageError::Retryable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(PageError::Retryable(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(PageError::Permanent(format!("HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| PageError::Retryable(format!("body read failed: {e}")))
    }
}

/// Find an image URL in an HTML page: `og:image` first, then the first `<img>`.
///
/// Relative URLs are resolved against `base`; only http(s) results are returned.
pub fn extract_image(html: &str, base: &Url) -> Option<String> {
    let doc = Html::parse_document(html);

    let og_sel = Selector::parse(r#"meta[property="og:image"], meta[name="og:image"]"#).unwrap();
    let og = doc
        .select(&og_sel)
        .filter_map(|el| el.value().attr("content"))
        .find_map(|content| absolutize(content, base));
    if og.is_some() {
        return og;
    }

    let img_sel = Selector::parse("img[src]").unwrap();
    doc.select(&img_sel)
        .filter_map(|el| el.value().attr("src"))
        .find_map(|src| absolutize(src, base))
}

fn absolutize(candidate: &str, base: &Url) -> Option<String> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }
    let resolved = base.join(candidate).ok()?;
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}
