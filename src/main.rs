//! Landfall pipeline runner.
//!
//! Single-command CLI: run one scraper through the full
//! scrape → parse → archive → RAG pipeline and print the result summary.
//! Exit code 0 on a completed or partial run, 1 on a failed run, 2 on a
//! process-level error.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use landfall::container::get_container;
use landfall::pipeline::{Pipeline, PipelineOptions};
use landfall::scrapers::ScraperRegistry;
use landfall::types::PipelineStatus;

#[derive(Debug, Parser)]
#[command(
    name = "landfall",
    version,
    about = "Run a scraper through the archive + RAG ingestion pipeline"
)]
struct Cli {
    /// Registered scraper to run.
    scraper_name: String,

    /// RAG collection/dataset id (defaults to the scraper's settings, then
    /// the scraper name).
    #[arg(long)]
    dataset_id: Option<String>,

    /// Page limit forwarded to the scraper.
    #[arg(long)]
    max_pages: Option<u32>,

    /// Skip the archive upload path.
    #[arg(long)]
    no_archive: bool,

    /// Skip the RAG ingestion path.
    #[arg(long)]
    no_rag: bool,
}

/// Site-specific scrapers register here at startup; they live outside this
/// crate. The built-in "inbox" scraper re-ingests files already on disk
/// (LANDFALL_INBOX_DIR, default ./data/inbox).
fn build_scraper_registry() -> ScraperRegistry {
    let mut registry = ScraperRegistry::new();
    registry.register("inbox", |options| {
        let dir = std::env::var("LANDFALL_INBOX_DIR")
            .unwrap_or_else(|_| "./data/inbox".to_string());
        Box::new(
            landfall::scrapers::DirectoryScraper::new("inbox", dir)
                .with_max_pages(options.max_pages),
        )
    });
    registry
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    let container = match get_container() {
        Ok(container) => container,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize services");
            return 2;
        }
    };

    let registry = build_scraper_registry();
    let mut scraper = match registry.create(
        &cli.scraper_name,
        landfall::scrapers::ScraperOptions {
            max_pages: cli.max_pages,
        },
    ) {
        Ok(scraper) => scraper,
        Err(e) => {
            tracing::error!(error = %e, "scraper lookup failed");
            return 2;
        }
    };

    let mut options = PipelineOptions::new(&cli.scraper_name);
    options.dataset_id = cli.dataset_id;
    options.max_pages = cli.max_pages;
    options.upload_to_archive = !cli.no_archive;
    options.upload_to_rag = !cli.no_rag;
    options.verify_timeout = container.config().verify_timeout;

    let pipeline = match Pipeline::from_container(&container, options).await {
        Ok(pipeline) => pipeline,
        Err(e) => {
            tracing::error!(error = %e, "failed to build pipeline");
            return 2;
        }
    };

    let result = pipeline.run(scraper.as_mut()).await;
    println!("{}", result.to_json());

    match result.status {
        PipelineStatus::Completed | PipelineStatus::Partial => 0,
        PipelineStatus::Failed => 1,
    }
}
