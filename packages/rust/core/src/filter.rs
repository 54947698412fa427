//! Recency & dedup filter: collapse duplicate links, drop stale items, cap.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use mindfulnews_shared::{Article, PipelineConfig, within_window};

/// Collapse articles sharing a `link`.
///
/// The surviving record is the last one seen for that link; it takes the
/// position of the link's first occurrence.
pub fn dedup_by_link(articles: Vec<Article>) -> Vec<Article> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(articles.len());
    let mut unique: Vec<Article> = Vec::with_capacity(articles.len());

    for article in articles {
        match positions.get(&article.link) {
            Some(&pos) => unique[pos] = article,
            None => {
                positions.insert(article.link.clone(), unique.len());
                unique.push(article);
            }
        }
    }

    unique
}

/// Dedup, re-check recency, optionally sort newest-first, then cap.
pub fn filter_articles(
    articles: Vec<Article>,
    reference_time: DateTime<Utc>,
    config: &PipelineConfig,
) -> Vec<Article> {
    let total = articles.len();

    let unique = dedup_by_link(articles);
    let after_dedup = unique.len();

    let mut recent: Vec<Article> = unique
        .into_iter()
        .filter(|a| within_window(&a.published_at, &reference_time, config.recency_window))
        .collect();
    let after_recency = recent.len();

    if config.sort_by_recency {
        recent.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    }
    recent.truncate(config.max_articles);

    debug!(
        sorted = config.sort_by_recency,
        cap = config.max_articles,
        "filter settings"
    );
    info!(
        total,
        after_dedup,
        after_recency,
        kept = recent.len(),
        "articles filtered"
    );
    recent
}
