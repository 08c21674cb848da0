use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

use pricewatch_crawler::driver_pool::DriverPool;
use pricewatch_crawler::session::ChromeSessionFactory;
use pricewatch_crawler::store::{CrawlStore, MemoryStore};
use pricewatch_crawler::{AppConfig, CrawlOrchestrator};

#[derive(Parser)]
#[command(name = "pricewatch-crawler", about = "Storefront product crawler", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl one product by identifier
    Crawl {
        identifier: String,
        #[arg(short, long, default_value = "US")]
        country: String,
    },
    /// Crawl a product page URL directly
    CrawlUrl { url: String },
    /// Crawl a list of identifiers against one storefront
    CrawlBatch {
        identifiers: Vec<String>,
        #[arg(short, long, default_value = "US")]
        country: String,
        #[arg(long)]
        session_id: Option<String>,
    },
    /// Check a URL against an expected identifier without navigating
    Verify {
        url: String,
        identifier: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pricewatch_crawler=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let config = Arc::new(AppConfig::from_env()?);
    config.validate()?;

    let factory = ChromeSessionFactory::new(config.browser.chrome_path.clone());
    let pool = Arc::new(DriverPool::new(Box::new(factory)));
    let store: Arc<dyn CrawlStore> = Arc::new(MemoryStore::new());
    let orchestrator = CrawlOrchestrator::new(Arc::clone(&config), Arc::clone(&pool), store);

    match cli.command {
        Command::Crawl { identifier, country } => {
            let record = orchestrator.crawl_by_identifier(&identifier, &country)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::CrawlUrl { url } => {
            let record = orchestrator.crawl_by_url(&url)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::CrawlBatch {
            identifiers,
            country,
            session_id,
        } => {
            let outcome = orchestrator.crawl_batch(&identifiers, &country, session_id)?;
            info!(
                "Session {}: {} ok, {} failed of {}",
                outcome.session_id,
                outcome.successful.len(),
                outcome.failed.len(),
                outcome.total
            );
            for failure in &outcome.failed {
                eprintln!("{}: {}", failure.identifier, failure.reason);
            }
        }
        Command::Verify { url, identifier } => {
            let report = orchestrator.verify_match(&url, &identifier);
            println!(
                "valid: {}\nidentifier match: {}\nseller match: {}\ndetails: {}",
                report.valid, report.identifier_match, report.seller_match, report.details
            );
        }
    }

    pool.release_all();
    Ok(())
}
