//! Spimex-Harvest main entry point
//!
//! This is the command-line interface for the exchange bulletin harvester.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use spimex_harvest::cache::{parse_reset_time, ResponseCache};
use spimex_harvest::config::{load_config_with_hash, Config};
use spimex_harvest::crawler::harvest;
use spimex_harvest::output::{load_statistics, print_statistics, print_summary};
use spimex_harvest::query::{QueryKind, QueryRoutes};
use spimex_harvest::storage::open_storage;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Spimex-Harvest: daily trading bulletin harvester
///
/// Walks the paginated results listing, downloads every daily bulletin
/// newer than what is already stored, and writes the metric-ton section
/// rows into SQLite.
#[derive(Parser, Debug)]
#[command(name = "spimex-harvest")]
#[command(version)]
#[command(about = "Daily trading bulletin harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the crawl window without harvesting
    #[arg(long, conflicts_with_all = ["stats", "query"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "query"])]
    stats: bool,

    /// Run a read query against the database and print JSON
    #[arg(long, value_enum, conflicts_with_all = ["dry_run", "stats"])]
    query: Option<QueryArg>,

    /// Result limit for --query
    #[arg(long, requires = "query")]
    limit: Option<usize>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum QueryArg {
    Bulletins,
    Dynamics,
    TradingResults,
    TradingDates,
}

impl From<QueryArg> for QueryKind {
    fn from(arg: QueryArg) -> Self {
        match arg {
            QueryArg::Bulletins => QueryKind::Bulletins,
            QueryArg::Dynamics => QueryKind::Dynamics,
            QueryArg::TradingResults => QueryKind::TradingResults,
            QueryArg::TradingDates => QueryKind::TradingDates,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else if let Some(kind) = cli.query {
        handle_query(&config, kind.into(), cli.limit).await
    } else {
        handle_harvest(config, config_hash).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("spimex_harvest=info,warn"),
            1 => EnvFilter::new("spimex_harvest=debug,info"),
            2 => EnvFilter::new("spimex_harvest=trace,debug"),
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

/// Handles the --dry-run mode: shows the configuration and the crawl window
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    use spimex_harvest::state::CrawlState;
    use spimex_harvest::storage::Storage;

    println!("=== Spimex-Harvest Dry Run ===\n");

    let crawler = &config.crawler;
    println!("Crawler Configuration:");
    println!("  Listing: {}", crawler.base_url);
    println!("  Page suffix: {}", crawler.page_param);
    println!("  Link class: {}", crawler.link_class);
    println!("  Link pattern: {}", crawler.link_pattern);
    println!("  Cutoff date: {}", crawler.cutoff_date);
    println!("  Workers: {}", crawler.workers);
    println!("  Consumer timeout: {}ms", crawler.consumer_timeout);
    println!("  Request delay: {}ms", crawler.request_delay);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);

    println!("\nCache:");
    println!("  Daily reset: {}", config.cache.reset_time);

    // A missing database simply means a first run from the cutoff date
    let max_known = if Path::new(&config.storage.database_path).exists() {
        open_storage(Path::new(&config.storage.database_path))?.max_known_date()?
    } else {
        None
    };
    let state = CrawlState::new(crawler.cutoff_date, max_known);

    println!("\n✓ Configuration is valid");
    println!("✓ Would harvest bulletins dated {}", state.describe_window());

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let storage = open_storage(Path::new(&config.storage.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --query mode: runs one cached query and prints JSON
async fn handle_query(config: &Config, kind: QueryKind, limit: Option<usize>) -> anyhow::Result<()> {
    let storage = open_storage(Path::new(&config.storage.database_path))?;
    let reset = parse_reset_time(&config.cache.reset_time)
        .with_context(|| format!("invalid reset-time '{}'", config.cache.reset_time))?;

    let routes = QueryRoutes::new(
        Arc::new(Mutex::new(storage)),
        ResponseCache::in_memory(reset),
    );

    tracing::debug!("Running query {}", kind);
    let value = routes.run(kind, limit).await?;
    println!("{}", serde_json::to_string_pretty(&value)?);

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config, config_hash: String) -> anyhow::Result<()> {
    tracing::info!(
        "Harvesting {} with {} workers",
        config.crawler.base_url,
        config.crawler.workers
    );

    match harvest(config, config_hash).await {
        Ok(summary) => {
            tracing::info!("Harvest completed successfully");
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}
