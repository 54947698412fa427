//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use mindfulnews_core::pipeline::{ProgressReporter, RunConfig, RunOutcome, RunReport};
use mindfulnews_core::prompts::Prompts;
use mindfulnews_llm::ChatClient;
use mindfulnews_render::{DocumentCounts, RssRenderer, validate_document};
use mindfulnews_shared::{AppConfig, config_file_path, init_config, load_config, load_config_from};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Mindful News: calm, synthesized news digests.
#[derive(Parser)]
#[command(
    name = "mindfulnews",
    version,
    about = "Build a calm, synthesized RSS digest from news feeds.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.mindfulnews/mindfulnews.toml).
    #[arg(long, global = true, env = "MINDFULNEWS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch feeds, synthesize stories, and write the RSS document.
    Run {
        /// Output path (overrides `output.rss_path`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Reference time as RFC 3339 (defaults to now).
        #[arg(long)]
        now: Option<String>,

        /// Run the editorial pass even if disabled in config.
        #[arg(long)]
        editorial: bool,
    },

    /// Check that an RSS document has exactly one declaration and root element.
    Validate {
        /// Document to check.
        file: PathBuf,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "mindfulnews=info",
        1 => "mindfulnews=debug",
        _ => "mindfulnews=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Run {
            out,
            now,
            editorial,
        } => cmd_run(config_path.as_deref(), out, now.as_deref(), editorial).await,
        Command::Validate { file } => cmd_validate(&file),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path.as_deref()),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    })
}

fn parse_reference_time(now: Option<&str>) -> Result<DateTime<Utc>> {
    match now {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| eyre!("invalid --now '{raw}': {e}")),
        None => Ok(Utc::now()),
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    config_path: Option<&Path>,
    out: Option<PathBuf>,
    now: Option<&str>,
    force_editorial: bool,
) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    if config.feeds.is_empty() {
        let location = match config_path {
            Some(p) => p.to_path_buf(),
            None => config_file_path()?,
        };
        return Err(eyre!(
            "no feeds configured. Add [[feeds]] entries to {}",
            location.display()
        ));
    }
    config.editorial.enabled |= force_editorial;

    // Fails fast when the API key is missing
    let generator = ChatClient::from_config(&config.llm)?;
    let prompts = Prompts::load(&config.prompts)?;
    let reference_time = parse_reference_time(now)?;

    info!(version = env!("CARGO_PKG_VERSION"), "mindfulnews starting");
    for (name, version) in prompts.versions() {
        info!(prompt = name, version, "prompt loaded");
    }

    let mut run_config = RunConfig::from_app(&config, prompts, reference_time);
    if let Some(out) = out {
        run_config.output_path = out;
    }

    info!(
        sources = run_config.sources.len(),
        model = %config.llm.model,
        output = %run_config.output_path.display(),
        "starting run"
    );

    let renderer = RssRenderer::new(config.channel.clone());
    let reporter = CliProgress::new();
    let outcome = mindfulnews_core::pipeline::run(&run_config, &generator, &renderer, &reporter).await;
    reporter.spinner.finish_and_clear();

    match outcome? {
        RunOutcome::Written(report) => {
            println!();
            println!("  Feed written!");
            println!("  Stories:  {}", report.stories);
            println!(
                "  Articles: {} ingested, {} used",
                report.articles_ingested, report.articles_kept
            );
            println!(
                "  Clusters: {}{}",
                report.clusters,
                if report.cluster_fallback { " (fallback)" } else { "" }
            );
            println!("  Path:     {}", report.output_path.display());
            if let Some((path, accepted)) = &report.filtered {
                println!("  Filtered: {accepted} stories -> {}", path.display());
            }
            println!("  Time:     {:.1}s", report.elapsed.as_secs_f64());
            println!();
        }
        RunOutcome::NoInput { articles_ingested } => {
            println!("No articles to process ({articles_ingested} ingested), nothing written.");
        }
    }

    Ok(())
}

fn cmd_validate(file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .map_err(|e| eyre!("cannot read {}: {e}", file.display()))?;

    let counts = DocumentCounts::scan(&text);
    println!("XML declaration count: {}", counts.declarations);
    println!("<rss> count: {}", counts.root_open);
    println!("</rss> count: {}", counts.root_close);

    validate_document(&text)?;
    println!("{} is valid.", file.display());
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn story_started(&self, theme: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Synthesizing [{current}/{total}] {theme}"));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from([
            "mindfulnews",
            "--config",
            "/tmp/mn.toml",
            "-vv",
            "run",
            "--out",
            "feed.xml",
            "--now",
            "2025-06-21T12:00:00Z",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config.as_deref(), Some(Path::new("/tmp/mn.toml")));
        match cli.command {
            Command::Run { out, now, editorial } => {
                assert_eq!(out.as_deref(), Some(Path::new("feed.xml")));
                assert_eq!(now.as_deref(), Some("2025-06-21T12:00:00Z"));
                assert!(!editorial);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn reference_time_parses_rfc3339() {
        let t = parse_reference_time(Some("2025-06-21T14:00:00+02:00")).unwrap();
        assert_eq!(t.to_rfc3339(), "2025-06-21T12:00:00+00:00");
        assert!(parse_reference_time(Some("yesterday")).is_err());
    }

    #[test]
    fn validate_command_checks_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        let good = dir.join("good.xml");
        std::fs::write(&good, r#"<?xml version="1.0"?><rss version="2.0"></rss>"#).unwrap();
        let bad = dir.join("bad.xml");
        std::fs::write(&bad, r#"<?xml version="1.0"?><rss><rss></rss>"#).unwrap();

        assert!(cmd_validate(&good).is_ok());
        assert!(cmd_validate(&bad).is_err());
        assert!(cmd_validate(&dir.join("missing.xml")).is_err());
    }
}
