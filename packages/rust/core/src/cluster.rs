//! Cluster builder: ask the generator to group articles by topic.
//!
//! The request carries `{id, title}` pairs. The response is expected to hold a
//! JSON array of `{theme, articles}` groups somewhere in its text; anything
//! unusable degrades to a single catch-all cluster.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use mindfulnews_llm::TextGenerator;
use mindfulnews_shared::{Article, ArticleId, MindfulNewsError, Result};

/// Theme of the catch-all cluster used when the response is unusable.
pub const FALLBACK_THEME: &str = "General News";

/// Reference from a cluster to an article.
///
/// Numeric references are article ids. Strings are accepted for responses
/// that echo titles back instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MemberRef {
    Id(ArticleId),
    Title(String),
}

impl MemberRef {
    fn matches(&self, article: &Article) -> bool {
        match self {
            Self::Id(id) => article.id == *id,
            Self::Title(title) => {
                article.title == *title
                    || title.trim().parse::<u32>().is_ok_and(|n| article.id.0 == n)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(default)]
    pub theme: String,
    #[serde(default, rename = "articles", alias = "members")]
    pub members: Vec<MemberRef>,
}

impl Cluster {
    /// Articles referenced by this cluster, in reference order, each at most once.
    ///
    /// References that match no article are dropped here.
    pub fn resolve_members<'a>(&self, articles: &'a [Article]) -> Vec<&'a Article> {
        let mut resolved: Vec<&Article> = Vec::with_capacity(self.members.len());
        for member in &self.members {
            let found = articles.iter().find(|a| member.matches(a));
            if let Some(article) = found {
                if !resolved.iter().any(|r| r.id == article.id) {
                    resolved.push(article);
                }
            }
        }
        resolved
    }
}

/// Result of parsing a clustering response.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterOutcome {
    Parsed(Vec<Cluster>),
    Fallback { reason: String, clusters: Vec<Cluster> },
}

impl ClusterOutcome {
    pub fn clusters(&self) -> &[Cluster] {
        match self {
            Self::Parsed(clusters) | Self::Fallback { clusters, .. } => clusters,
        }
    }

    pub fn into_clusters(self) -> Vec<Cluster> {
        match self {
            Self::Parsed(clusters) | Self::Fallback { clusters, .. } => clusters,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// One cluster holding every input article.
pub fn fallback_cluster(articles: &[Article]) -> Cluster {
    Cluster {
        theme: FALLBACK_THEME.to_string(),
        members: articles.iter().map(|a| MemberRef::Id(a.id)).collect(),
    }
}

#[derive(Serialize)]
struct TitleRef<'a> {
    id: ArticleId,
    title: &'a str,
}

/// Instruction followed by the pretty-printed `{id, title}` list.
pub fn clustering_request(prompt: &str, articles: &[Article]) -> Result<String> {
    let refs: Vec<TitleRef<'_>> = articles
        .iter()
        .map(|a| TitleRef {
            id: a.id,
            title: &a.title,
        })
        .collect();
    let json = serde_json::to_string_pretty(&refs)
        .map_err(|e| MindfulNewsError::parse(format!("failed to encode titles: {e}")))?;
    Ok(format!("{prompt}\n\n{json}"))
}

/// Parse a clustering response, falling back on malformed or empty output.
pub fn parse_clusters(response: &str, articles: &[Article]) -> ClusterOutcome {
    let fallback = |reason: String| ClusterOutcome::Fallback {
        reason,
        clusters: vec![fallback_cluster(articles)],
    };

    let (Some(start), Some(end)) = (response.find('['), response.rfind(']')) else {
        return fallback("no JSON array in response".into());
    };
    if end < start {
        return fallback("no JSON array in response".into());
    }

    match serde_json::from_str::<Vec<Cluster>>(&response[start..=end]) {
        Ok(clusters) if clusters.is_empty() => fallback("response contained zero clusters".into()),
        Ok(clusters) => ClusterOutcome::Parsed(clusters),
        Err(e) => fallback(format!("invalid cluster JSON: {e}")),
    }
}

/// Send one clustering request and parse the answer.
///
/// Generator errors propagate; malformed answers become
/// [`ClusterOutcome::Fallback`].
#[instrument(skip_all, fields(articles = articles.len(), generator = generator.name()))]
pub async fn build_clusters(
    generator: &dyn TextGenerator,
    prompt: &str,
    articles: &[Article],
    max_tokens: u32,
) -> Result<ClusterOutcome> {
    let request = clustering_request(prompt, articles)?;
    let response = generator.complete(&request, max_tokens).await?;

    let outcome = parse_clusters(&response, articles);
    match &outcome {
        ClusterOutcome::Parsed(clusters) => {
            info!(clusters = clusters.len(), "clustering done");
        }
        ClusterOutcome::Fallback { reason, .. } => {
            warn!(%reason, "clustering response unusable, using a single cluster");
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;
    use chrono::Utc;

    fn articles() -> Vec<Article> {
        ["Reef recovers", "Bees return", "Solar record"]
            .iter()
            .enumerate()
            .map(|(i, title)| Article {
                id: ArticleId(i as u32),
                title: (*title).into(),
                link: format!("https://news.example.com/{i}"),
                summary: String::new(),
                published_at: Utc::now(),
                image: None,
                source_region: None,
            })
            .collect()
    }

    #[test]
    fn request_lists_ids_and_titles() {
        let request = clustering_request("Group these.", &articles()).unwrap();
        assert!(request.starts_with("Group these.\n\n["));
        assert!(request.contains(r#""id": 1"#));
        assert!(request.contains(r#""title": "Bees return""#));
    }

    #[test]
    fn parses_array_surrounded_by_prose() {
        let response = r#"Sure! Here are the clusters:
```json
[{"theme": "Nature", "articles": [0, 1]}, {"theme": "Energy", "articles": [2]}]
```
Hope this helps."#;
        let outcome = parse_clusters(response, &articles());
        assert!(!outcome.is_fallback());
        let clusters = outcome.clusters();
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].theme, "Nature");
        assert_eq!(
            clusters[0].members,
            vec![MemberRef::Id(ArticleId(0)), MemberRef::Id(ArticleId(1))]
        );
    }

    #[test]
    fn not_json_falls_back_to_one_cluster_with_everything() {
        let input = articles();
        let outcome = parse_clusters("not json", &input);
        assert!(outcome.is_fallback());
        let clusters = outcome.into_clusters();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].theme, FALLBACK_THEME);
        let resolved = clusters[0].resolve_members(&input);
        assert_eq!(resolved.len(), input.len());
    }

    #[test]
    fn empty_array_falls_back() {
        let outcome = parse_clusters("[]", &articles());
        match outcome {
            ClusterOutcome::Fallback { reason, clusters } => {
                assert!(reason.contains("zero clusters"));
                assert_eq!(clusters[0].members.len(), 3);
            }
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[test]
    fn truncated_json_falls_back() {
        let outcome = parse_clusters(r#"[{"theme": "Nature", "articles": [0, 1]}"#, &articles());
        assert!(outcome.is_fallback());
    }

    #[test]
    fn title_references_resolve_by_exact_match() {
        let input = articles();
        let response = r#"[{"theme": "Nature", "articles": ["Bees return", "bees return", "2"]}]"#;
        let clusters = parse_clusters(response, &input).into_clusters();
        let resolved = clusters[0].resolve_members(&input);
        let titles: Vec<_> = resolved.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Bees return", "Solar record"]);
    }

    #[test]
    fn unknown_and_repeated_members_are_dropped_at_resolution() {
        let input = articles();
        let cluster = Cluster {
            theme: "Mixed".into(),
            members: vec![
                MemberRef::Id(ArticleId(2)),
                MemberRef::Id(ArticleId(99)),
                MemberRef::Id(ArticleId(2)),
                MemberRef::Id(ArticleId(0)),
            ],
        };
        let ids: Vec<_> = cluster
            .resolve_members(&input)
            .iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![ArticleId(2), ArticleId(0)]);

        let orphan = Cluster {
            theme: "Ghost".into(),
            members: vec![MemberRef::Title("Nobody wrote this".into())],
        };
        assert!(orphan.resolve_members(&input).is_empty());
    }

    #[tokio::test]
    async fn build_clusters_sends_one_request() {
        let generator = ScriptedGenerator::new([r#"[{"theme": "All", "articles": [0, 1, 2]}]"#]);
        let outcome = build_clusters(&generator, "Group.", &articles(), 100)
            .await
            .unwrap();
        assert_eq!(generator.calls(), 1);
        assert_eq!(outcome.clusters()[0].members.len(), 3);
    }

    #[tokio::test]
    async fn build_clusters_propagates_generator_failure() {
        let generator = ScriptedGenerator::failing();
        let err = build_clusters(&generator, "Group.", &articles(), 100)
            .await
            .unwrap_err();
        assert!(matches!(err, MindfulNewsError::Generation(_)));
    }
}
