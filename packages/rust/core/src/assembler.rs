//! Feed assembly: turn a parsed synthesis plus its member articles into a
//! finished [`SynthesizedStory`].

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use url::Url;

use mindfulnews_shared::{
    Article, FeedOutput, PipelineConfig, SynthesizedStory, format_feed_date,
};

use crate::cluster::FALLBACK_THEME;
use crate::synthesis::SynthesisParts;

/// Title used when neither the response nor the cluster supplies one.
const UNTITLED: &str = "Untitled";

/// Deterministic story id: SHA-256 hex of `"{title}-{published_at}-{link}"`.
pub fn compute_guid(title: &str, published_at: &str, link: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"-");
    hasher.update(published_at.as_bytes());
    hasher.update(b"-");
    hasher.update(link.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `candidate` when it is an absolute http(s) URL, otherwise `placeholder`.
pub fn usable_image(candidate: Option<&str>, placeholder: &str) -> String {
    candidate
        .map(str::trim)
        .filter(|c| Url::parse(c).is_ok_and(|u| matches!(u.scheme(), "http" | "https")))
        .unwrap_or(placeholder)
        .to_string()
}

/// Build the story record for one cluster.
///
/// Link and image come from the first member; the publish date is the newest
/// member date, or `build_time` when there are no members.
pub fn assemble_story(
    theme: &str,
    parts: SynthesisParts,
    members: &[&Article],
    build_time: DateTime<Utc>,
    config: &PipelineConfig,
) -> SynthesizedStory {
    let theme = theme.trim();
    let title = parts
        .title
        .unwrap_or_else(|| non_empty_or(theme, UNTITLED).to_string());
    let category = parts
        .category
        .unwrap_or_else(|| non_empty_or(theme, FALLBACK_THEME).to_string());
    let positivity = parts
        .positivity
        .or_else(|| Some(config.default_positivity.clone()))
        .filter(|p| !p.trim().is_empty());

    let first = members.first();
    let link = first.map(|a| a.link.clone()).unwrap_or_default();
    let image = usable_image(
        first.and_then(|a| a.image.as_deref()),
        &config.placeholder_image,
    );

    let newest = members
        .iter()
        .map(|a| a.published_at)
        .max()
        .unwrap_or(build_time);
    let published_at = format_feed_date(&newest);

    SynthesizedStory {
        guid: compute_guid(&title, &published_at, &link),
        title: html_escape::encode_quoted_attribute(&title).into_owned(),
        category: html_escape::encode_quoted_attribute(&category).into_owned(),
        positivity: positivity.map(|p| p.trim().to_string()),
        body: parts.body,
        link,
        image,
        published_at,
    }
}

/// Wrap finished stories into the document model.
pub fn assemble(stories: Vec<SynthesizedStory>, build_time: DateTime<Utc>) -> FeedOutput {
    FeedOutput {
        stories,
        build_time,
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() { fallback } else { value }
}
