//! Mindful News CLI. Builds a calm, synthesized RSS digest from news feeds.
//!
//! Fetches the configured feeds, clusters related stories with a text
//! generator, rewrites each cluster as one story, and writes an RSS document.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
