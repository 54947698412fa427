//! Core domain types for the Mindful News pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Date format used for every timestamp written into the output feed.
pub const FEED_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S +0000";

/// Format an instant the way RSS `pubDate` / `lastBuildDate` expect it.
pub fn format_feed_date(at: &DateTime<Utc>) -> String {
    at.format(FEED_DATE_FORMAT).to_string()
}

/// Whether an item published at `published_at` is inside the recency window.
///
/// The boundary is inclusive: an item exactly `window` old is retained.
/// Future-dated items (negative age) are retained.
pub fn within_window(
    published_at: &DateTime<Utc>,
    reference: &DateTime<Utc>,
    window: chrono::Duration,
) -> bool {
    *reference - *published_at <= window
}

// ---------------------------------------------------------------------------
// ArticleId
// ---------------------------------------------------------------------------

/// Opaque article identifier, assigned once at ingestion.
///
/// Clusters reference articles by this id instead of by title text, so the
/// join survives any normalization the generator applies to titles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleId(pub u32);

impl std::fmt::Display for ArticleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Article
// ---------------------------------------------------------------------------

/// One normalized feed item. Never mutated after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// Ingestion-assigned identifier.
    pub id: ArticleId,
    /// Entry title as published.
    pub title: String,
    /// Canonical URL; the identity key for deduplication.
    pub link: String,
    /// Entry summary or body (may contain markup).
    pub summary: String,
    /// Publication instant (UTC).
    pub published_at: DateTime<Utc>,
    /// Representative image, if one was resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Region tag of the feed source the entry came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_region: Option<String>,
}

impl Article {
    /// Age of the article relative to `reference`. Negative for future-dated entries.
    pub fn age_at(&self, reference: &DateTime<Utc>) -> chrono::Duration {
        *reference - self.published_at
    }
}

// ---------------------------------------------------------------------------
// SynthesizedStory / FeedOutput
// ---------------------------------------------------------------------------

/// A finished story record, ready for the renderer.
///
/// `title` and `category` are already HTML-escaped; `body` is sanitized
/// paragraph markup. `link` and `image` are raw URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesizedStory {
    pub title: String,
    pub body: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub positivity: Option<String>,
    pub link: String,
    pub image: String,
    /// RFC 2822 formatted publish date.
    pub published_at: String,
    /// Content-derived identifier, stable across runs.
    pub guid: String,
}

/// The ordered stories of one run plus the build timestamp.
#[derive(Debug, Clone)]
pub struct FeedOutput {
    pub stories: Vec<SynthesizedStory>,
    pub build_time: DateTime<Utc>,
}

impl FeedOutput {
    /// Build timestamp in feed date format.
    pub fn build_date(&self) -> String {
        format_feed_date(&self.build_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn article(hours_old: i64, now: DateTime<Utc>) -> Article {
        Article {
            id: ArticleId(7),
            title: "Reef recovery".into(),
            link: "https://news.example.com/reef".into(),
            summary: "<p>Coral is back.</p>".into(),
            published_at: now - chrono::Duration::hours(hours_old),
            image: None,
            source_region: Some("oceania".into()),
        }
    }

    #[test]
    fn feed_date_format_matches_rss() {
        let at = Utc.with_ymd_and_hms(2025, 6, 21, 7, 5, 9).unwrap();
        assert_eq!(format_feed_date(&at), "Sat, 21 Jun 2025 07:05:09 +0000");
    }

    #[test]
    fn article_age_is_relative_to_reference() {
        let now = Utc.with_ymd_and_hms(2025, 6, 21, 12, 0, 0).unwrap();
        let a = article(5, now);
        assert_eq!(a.age_at(&now), chrono::Duration::hours(5));
    }

    #[test]
    fn window_boundary_is_inclusive() {
        let now = Utc.with_ymd_and_hms(2025, 6, 21, 12, 0, 0).unwrap();
        let window = chrono::Duration::hours(48);
        let at_edge = now - window;
        let past_edge = at_edge - chrono::Duration::seconds(1);
        let future = now + chrono::Duration::hours(2);
        assert!(within_window(&at_edge, &now, window));
        assert!(!within_window(&past_edge, &now, window));
        assert!(within_window(&future, &now, window));
    }

    #[test]
    fn article_serialization_skips_empty_optionals() {
        let now = Utc.with_ymd_and_hms(2025, 6, 21, 12, 0, 0).unwrap();
        let mut a = article(1, now);
        a.source_region = None;
        let json = serde_json::to_string(&a).expect("serialize");
        assert!(!json.contains("image"));
        assert!(!json.contains("source_region"));
        assert!(json.contains(r#""id":7"#));
    }
}
