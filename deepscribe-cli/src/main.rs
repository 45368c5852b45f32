//! Deepscribe CLI — research a topic and write a cited markdown report.

use clap::Parser;
use deepscribe_core::config::load_config;
use deepscribe_core::llm::OpenAiCompatibleClient;
use deepscribe_core::report::ReportEngine;
use deepscribe_core::search::{DocumentLoader, DuckDuckGoSearch};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Deepscribe: multi-section deep-research reports with consolidated citations
#[derive(Parser, Debug)]
#[command(name = "deepscribe", version, about, long_about = None)]
struct Cli {
    /// Topic to research
    topic: String,

    /// Workspace directory (location of .deepscribe/config.toml)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// LLM model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Disable web search; research from local documents only
    #[arg(long)]
    no_web: bool,

    /// Local file or directory to ingest as evidence (repeatable)
    #[arg(short = 'f', long = "file")]
    files: Vec<PathBuf>,

    /// Directory to write the finished report into
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the report to stdout instead of writing a file
    #[arg(long)]
    stdout: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut config = load_config(Some(&workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {e}"))?;

    // Apply CLI overrides
    if let Some(model) = &cli.model {
        config.llm.model = model.clone();
    }
    if cli.no_web {
        config.search.enable_web = false;
    }
    if let Some(output) = &cli.output {
        config.report.output_dir = output.clone();
    }
    config.report.local_files.extend(cli.files.iter().cloned());

    let model = OpenAiCompatibleClient::new(&config.llm)
        .map_err(|e| anyhow::anyhow!("Model client error: {e}"))?;
    let search = DuckDuckGoSearch::new(config.search.timeout_secs)
        .map_err(|e| anyhow::anyhow!("Search client error: {e}"))?;
    let local_docs = DocumentLoader::new(config.report.local_files.clone())
        .load()
        .await;

    let engine = ReportEngine::new(Arc::new(model), Arc::new(search), config.clone())
        .with_local_documents(local_docs);

    let report = engine.run(&cli.topic).await;
    let markdown = report.to_markdown();

    if cli.stdout {
        println!("{markdown}");
        return Ok(());
    }

    tokio::fs::create_dir_all(&config.report.output_dir).await?;
    let path = report_path(&config.report.output_dir, &cli.topic);
    tokio::fs::write(&path, &markdown).await?;
    info!(path = %path.display(), "Report written");
    if !cli.quiet {
        println!("Report written to {}", path.display());
    }
    Ok(())
}

/// Build a timestamped, filesystem-safe report path inside `output_dir`.
fn report_path(output_dir: &Path, topic: &str) -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    output_dir.join(format!("deepscribe_report_{}_{timestamp}.md", slugify(topic)))
}

/// Lowercase alphanumeric slug, runs of other characters collapsed to one
/// underscore, capped at 40 characters.
fn slugify(topic: &str) -> String {
    let mut slug = String::new();
    let mut last_was_separator = true;
    for c in topic.to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
            last_was_separator = false;
        } else if !last_was_separator {
            slug.push('_');
            last_was_separator = true;
        }
        if slug.len() >= 40 {
            break;
        }
    }
    slug.trim_end_matches('_').to_string()
}
