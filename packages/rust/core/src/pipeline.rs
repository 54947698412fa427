//! End-to-end run: feeds → filter → clusters → stories → RSS document.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use mindfulnews_ingest::FeedIngestor;
use mindfulnews_llm::TextGenerator;
use mindfulnews_render::{FeedRenderer, validate_document, write_document};
use mindfulnews_shared::{
    AppConfig, FeedOutput, FeedSource, IngestConfig, PipelineConfig, Result, SynthesizedStory,
};

use crate::assembler::{assemble, assemble_story};
use crate::cluster::{build_clusters, fallback_cluster};
use crate::editorial::review_stories;
use crate::filter::filter_articles;
use crate::prompts::Prompts;
use crate::synthesis::{parse_synthesis, synthesize};

/// Settings for the optional editorial pass.
#[derive(Debug, Clone)]
pub struct EditorialRun {
    pub max_tokens: u32,
    pub output_path: PathBuf,
}

/// Everything one run needs, resolved up front.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub pipeline: PipelineConfig,
    pub ingest: IngestConfig,
    pub sources: Vec<FeedSource>,
    pub prompts: Prompts,
    /// Token ceiling for clustering and synthesis calls.
    pub max_tokens: u32,
    pub output_path: PathBuf,
    /// `None` disables the editorial pass.
    pub editorial: Option<EditorialRun>,
    /// "Now" for recency checks and the build timestamp.
    pub reference_time: DateTime<Utc>,
}

impl RunConfig {
    pub fn from_app(app: &AppConfig, prompts: Prompts, reference_time: DateTime<Utc>) -> Self {
        Self {
            pipeline: PipelineConfig::from(app),
            ingest: IngestConfig::from(app),
            sources: app.feed_sources(),
            prompts,
            max_tokens: app.llm.max_tokens,
            output_path: PathBuf::from(&app.output.rss_path),
            editorial: app.editorial.enabled.then(|| EditorialRun {
                max_tokens: app.editorial.max_tokens,
                output_path: PathBuf::from(&app.output.filtered_rss_path),
            }),
            reference_time,
        }
    }
}

/// Summary of a run that produced a document.
#[derive(Debug)]
pub struct RunReport {
    pub output_path: PathBuf,
    pub stories: usize,
    pub articles_ingested: usize,
    pub articles_kept: usize,
    pub clusters: usize,
    /// Clusters in the generator response with no resolvable member.
    pub clusters_dropped: usize,
    /// Whether clustering fell back to a single catch-all cluster.
    pub cluster_fallback: bool,
    /// `(path, accepted stories)` when the editorial pass ran.
    pub filtered: Option<(PathBuf, usize)>,
    pub elapsed: std::time::Duration,
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    Written(RunReport),
    /// Nothing survived ingestion and filtering; no document was written.
    NoInput { articles_ingested: usize },
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before each cluster is synthesized.
    fn story_started(&self, theme: &str, current: usize, total: usize);
    /// Called when a document has been written.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn story_started(&self, _theme: &str, _current: usize, _total: usize) {}
    fn done(&self, _report: &RunReport) {}
}

/// Run the full pipeline.
///
/// 1. Fetch and normalize feeds
/// 2. Dedup, recency check, cap
/// 3. Cluster
/// 4. Synthesize and assemble one story per cluster
/// 5. Render, validate, write
/// 6. Editorial pass into a second document (if enabled)
#[instrument(skip_all, fields(sources = config.sources.len(), generator = generator.name()))]
pub async fn run(
    config: &RunConfig,
    generator: &dyn TextGenerator,
    renderer: &dyn FeedRenderer,
    progress: &dyn ProgressReporter,
) -> Result<RunOutcome> {
    let start = Instant::now();
    let now = config.reference_time;

    // --- Phase 1: Ingest ---
    progress.phase("Fetching feeds");
    let ingestor = FeedIngestor::new(&config.ingest)?;
    let ingested = ingestor.ingest(&config.sources, now).await;
    let articles_ingested = ingested.articles.len();

    // --- Phase 2: Filter ---
    progress.phase("Filtering articles");
    let articles = filter_articles(ingested.articles, now, &config.pipeline);
    if articles.is_empty() {
        warn!(articles_ingested, "no articles to process, nothing written");
        return Ok(RunOutcome::NoInput { articles_ingested });
    }

    // --- Phase 3: Cluster ---
    progress.phase("Clustering articles");
    let outcome = build_clusters(
        generator,
        &config.prompts.clustering,
        &articles,
        config.max_tokens,
    )
    .await?;
    let mut cluster_fallback = outcome.is_fallback();
    let mut clusters = outcome.into_clusters();

    let clusters_dropped = clusters
        .iter()
        .filter(|c| c.resolve_members(&articles).is_empty())
        .count();
    if clusters_dropped == clusters.len() {
        warn!(
            clusters = clusters.len(),
            "no cluster resolved to any article, using catch-all cluster"
        );
        clusters = vec![fallback_cluster(&articles)];
        cluster_fallback = true;
    }

    // --- Phase 4: Synthesize ---
    progress.phase("Synthesizing stories");
    let total = clusters.len();
    let mut stories: Vec<SynthesizedStory> = Vec::with_capacity(total);

    for (i, cluster) in clusters.iter().enumerate() {
        let members = cluster.resolve_members(&articles);
        if members.is_empty() {
            warn!(theme = %cluster.theme, "cluster has no resolvable members, dropping");
            continue;
        }

        progress.story_started(&cluster.theme, i + 1, total);
        let text = synthesize(
            generator,
            &config.prompts.synthesis,
            &cluster.theme,
            &members,
            &config.pipeline,
            config.max_tokens,
        )
        .await?;

        let story = assemble_story(
            &cluster.theme,
            parse_synthesis(&text),
            &members,
            now,
            &config.pipeline,
        );
        info!(theme = %cluster.theme, title = %story.title, "story synthesized");
        stories.push(story);
    }

    // --- Phase 5: Render ---
    progress.phase("Writing feed");
    let output = assemble(stories, now);
    publish(renderer, &output, &config.output_path)?;

    // --- Phase 6: Editorial ---
    let filtered = match &config.editorial {
        Some(editorial) => {
            progress.phase("Editorial review");
            let review = review_stories(
                generator,
                &config.prompts.editorial,
                &output.stories,
                editorial.max_tokens,
            )
            .await;
            info!(
                accepted = review.accepted.len(),
                rejected = review.rejected,
                "editorial review complete"
            );
            let accepted = review.accepted.len();
            publish(renderer, &assemble(review.accepted, now), &editorial.output_path)?;
            Some((editorial.output_path.clone(), accepted))
        }
        None => None,
    };

    let report = RunReport {
        output_path: config.output_path.clone(),
        stories: output.stories.len(),
        articles_ingested,
        articles_kept: articles.len(),
        clusters: total,
        clusters_dropped,
        cluster_fallback,
        filtered,
        elapsed: start.elapsed(),
    };

    progress.done(&report);

    info!(
        stories = report.stories,
        articles = report.articles_kept,
        clusters = report.clusters,
        elapsed_ms = report.elapsed.as_millis(),
        "run complete"
    );

    Ok(RunOutcome::Written(report))
}

/// Render, check structure, then replace the file.
fn publish(renderer: &dyn FeedRenderer, output: &FeedOutput, path: &Path) -> Result<()> {
    let text = renderer.render(output)?;
    validate_document(&text)?;
    write_document(path, &text)
}
