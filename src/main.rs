//! Serp-Harvester main entry point
//!
//! This is the command-line interface for the Serp-Harvester result crawler.

use anyhow::Context;
use clap::Parser;
use serp_harvester::browser::ChromiumEngine;
use serp_harvester::config::{load_config_with_hash, Config};
use serp_harvester::crawler::{CrawlPlan, CrawlRun, TokioSleeper};
use serp_harvester::output::{load_statistics, print_statistics, print_summary};
use serp_harvester::storage::open_store;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Serp-Harvester: a parallel search results harvester
///
/// Serp-Harvester drives several headless browsers across the result pages
/// of a search query, extracts result records, deduplicates them against
/// earlier runs and stores them in SQLite.
#[derive(Parser, Debug)]
#[command(name = "serp-harvester")]
#[command(version = "1.0.0")]
#[command(about = "A parallel search results harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Search query to harvest
    #[arg(value_name = "QUERY", required_unless_present_any = ["stats", "dry_run"])]
    query: Option<String>,

    /// Number of parallel browser workers
    #[arg(short, long, value_name = "N")]
    workers: Option<usize>,

    /// Result pages per worker
    #[arg(short, long, value_name = "N")]
    pages: Option<u32>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the harvest plan without launching browsers
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let workers = cli.workers.unwrap_or(config.limits.default_workers);
    let pages = cli.pages.unwrap_or(config.limits.default_pages_per_worker);

    if cli.stats {
        handle_stats(&config)
    } else if cli.dry_run {
        handle_dry_run(&config, cli.query.as_deref(), workers, pages);
        Ok(())
    } else {
        let query = cli.query.context("A search query is required")?;
        handle_harvest(config, config_hash, &query, workers, pages).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("serp_harvester=info,warn"),
            1 => EnvFilter::new("serp_harvester=debug,info"),
            2 => EnvFilter::new("serp_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows the harvest plan
fn handle_dry_run(config: &Config, query: Option<&str>, workers: usize, pages: u32) {
    println!("=== Serp-Harvester Dry Run ===\n");

    println!("Browser:");
    println!("  Headless: {}", config.browser.headless);
    println!(
        "  Window: {}x{}",
        config.browser.window_width, config.browser.window_height
    );
    println!("  Launch attempts: {}", config.browser.launch_attempts);
    println!("  Geolocations: {}", config.geolocations.len());
    for point in &config.geolocations {
        println!("    - {} ({}, {})", point.name, point.latitude, point.longitude);
    }

    println!("\nFetch:");
    println!("  Page timeout: {}s", config.fetch.page_timeout_secs);
    println!("  Max retries: {}", config.fetch.max_retries);
    println!("  Retry delay: {}s", config.fetch.retry_delay_secs);
    println!(
        "  Request delay: {}-{}ms",
        config.fetch.request_delay.min_ms, config.fetch.request_delay.max_ms
    );

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path.display());
    println!("  Results: {}", config.output.results_dir.display());
    println!("  Diagnostics: {}", config.output.diagnostics_dir.display());

    let plan = CrawlPlan::new(
        &config.limits,
        pages.saturating_mul(workers as u32),
        workers,
    );
    println!("\nPlan ({} pages, {} workers):", plan.total_pages, plan.workers);
    for (index, range) in plan.ranges.iter().enumerate() {
        println!("  Worker {}: pages {}-{}", index + 1, range.start(), range.end());
    }

    println!("\n✓ Configuration is valid");
    if let Some(query) = query {
        println!("✓ Would harvest '{}'", query);
    }
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path.display());

    let store = open_store(&config.output.database_path)?;
    let stats = load_statistics(&store, 10)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(
    config: Config,
    config_hash: String,
    query: &str,
    workers: usize,
    pages: u32,
) -> anyhow::Result<()> {
    let store = open_store(&config.output.database_path)?;
    let engine = ChromiumEngine::new(Duration::from_secs(config.fetch.page_timeout_secs));

    let run = CrawlRun::new(
        Arc::new(config),
        config_hash,
        Arc::new(store),
        Arc::new(engine),
        Arc::new(TokioSleeper),
    )?;

    let cancel = run.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, closing browsers");
            cancel.cancel();
        }
    });

    let total_pages = pages.saturating_mul(workers as u32);
    match run.execute(query, total_pages, workers).await {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}
