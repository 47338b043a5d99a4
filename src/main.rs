//! Auction-Ingest main entry point
//!
//! One invocation runs one site's pipeline. Exit codes: 0 when the run completed,
//! 1 when part of the work could not be done (dead session, failed discovery, network
//! trouble, or a run-level error), 2 when the process could not start.

use anyhow::Context;
use auction_ingest::artifacts::FsArtifactStore;
use auction_ingest::config::{load_config_with_hash, Config};
use auction_ingest::fetch::{build_http_client, BrowserlessFetcher, HttpFetcher, PageFetcher};
use auction_ingest::notify::CacheNotifier;
use auction_ingest::output::{load_statistics, log_statistics, print_statistics};
use auction_ingest::sites::strategy_for;
use auction_ingest::storage::SqliteStorage;
use auction_ingest::{Orchestrator, RunReport, Site};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Auction-Ingest: vehicle auction discovery and ingestion
///
/// Discovers listing links for one marketplace, extracts auction records from every
/// eligible link and stores them in SQLite.
#[derive(Parser, Debug)]
#[command(name = "auction-ingest")]
#[command(version)]
#[command(about = "Vehicle auction discovery and ingestion", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, env = "AUCTION_INGEST_CONFIG", default_value = "auction-ingest.toml")]
    config: PathBuf,

    /// Site to run: cars-and-bids (cab), bring-a-trailer (bat) or ebay
    #[arg(long, env = "SCRAPER_SERVICE")]
    site: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the search criteria without fetching anything
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show link statistics for the site from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

const EXIT_PARTIAL: u8 = 1;
const EXIT_STARTUP: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // .env must be loaded before clap reads its env fallbacks
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash, site) = match load(&cli) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("Failed to start: {:#}", e);
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    let result = if cli.dry_run {
        handle_dry_run(&config, site);
        Ok(ExitCode::SUCCESS)
    } else if cli.stats {
        handle_stats(&config, site).map(|()| ExitCode::SUCCESS)
    } else {
        handle_run(config, config_hash, site).await
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("Failed to start: {:#}", e);
            ExitCode::from(EXIT_STARTUP)
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// `RUST_LOG`, when set, takes precedence over the flags.
fn setup_logging(verbose: u8, quiet: bool) {
    let fallback = if quiet {
        "error"
    } else {
        match verbose {
            0 => "auction_ingest=info,warn",
            1 => "auction_ingest=debug,info",
            2 => "auction_ingest=trace,debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn load(cli: &Cli) -> anyhow::Result<(Config, String, Site)> {
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    let site = config.selected_site(cli.site.as_deref())?;
    Ok((config, hash, site))
}

/// Handles the --dry-run mode: shows what a run would search for
fn handle_dry_run(config: &Config, site: Site) {
    println!("=== Auction-Ingest Dry Run ===\n");

    println!("Site: {}", site);
    println!("Database: {}", config.database.path);
    println!("Max pages per search: {}", config.pipeline.max_pages);
    if site.needs_browser() {
        println!("Rendering service: {}", config.browser.endpoint);
    }
    if let Some(notify) = &config.notify {
        println!("Cache invalidation: {}", notify.cache_url);
    }

    let criteria = strategy_for(site, config).criteria();
    println!("\nSearch criteria ({}):", criteria.len());
    for criterion in &criteria {
        println!("  - {}", criterion);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows link statistics from the database
fn handle_stats(config: &Config, site: Site) -> anyhow::Result<()> {
    println!("Database: {}\n", config.database.path);

    let storage = SqliteStorage::new(Path::new(&config.database.path))
        .with_context(|| format!("opening {}", config.database.path))?;
    let stats = load_statistics(&storage, site)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the pipeline run
///
/// Startup failures return `Err`. Once the run has started every outcome maps to an
/// exit code, and the cache notification is sent regardless.
async fn handle_run(config: Config, config_hash: String, site: Site) -> anyhow::Result<ExitCode> {
    let storage = Arc::new(
        SqliteStorage::new(Path::new(&config.database.path))
            .with_context(|| format!("opening {}", config.database.path))?,
    );
    tracing::info!("Using database {}", storage.path().display());
    let client = build_http_client(&config.http).context("building HTTP client")?;

    let fetcher: Arc<dyn PageFetcher> = if site.needs_browser() {
        Arc::new(
            BrowserlessFetcher::connect(&config.browser, &config.http)
                .await
                .context("connecting to rendering service")?,
        )
    } else {
        Arc::new(HttpFetcher::with_client(client.clone()))
    };

    let artifacts = Arc::new(FsArtifactStore::new(&config.artifacts.directory));
    if site == Site::Ebay {
        tracing::info!("Storing screenshots under {}", artifacts.root().display());
    }
    let notifier = config
        .notify
        .as_ref()
        .map(|notify| CacheNotifier::new(client, notify));

    let orchestrator = Orchestrator::new(
        strategy_for(site, &config),
        storage.clone(),
        fetcher,
        artifacts,
    )
    .with_max_pages(config.pipeline.max_pages)
    .with_page_delay(Duration::from_millis(config.pipeline.page_delay_ms))
    .with_config_hash(config_hash);

    let code = match orchestrator.run().await {
        Ok(report) => exit_code_for(&report),
        Err(e) => {
            tracing::error!("Run failed: {}", e);
            ExitCode::from(EXIT_PARTIAL)
        }
    };

    match load_statistics(&*storage, site) {
        Ok(stats) => log_statistics(&stats),
        Err(e) => tracing::warn!("Could not load link statistics: {}", e),
    }

    if let Some(notifier) = notifier {
        notifier.notify_best_effort().await;
    }

    Ok(code)
}

fn exit_code_for(report: &RunReport) -> ExitCode {
    if report.is_partial() {
        tracing::warn!(
            "Run finished with gaps (session aborted: {}, discovery failures: {}, transport errors: {})",
            report.session_aborted,
            report.discovery_failures,
            report.transport_errors
        );
        ExitCode::from(EXIT_PARTIAL)
    } else {
        ExitCode::SUCCESS
    }
}
