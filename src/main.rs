//! med-harvest main entry point
//!
//! This is the command-line interface for the med-harvest crawler.

use anyhow::Context;
use clap::Parser;
use med_harvest::config::{crawl_fingerprint, load_config, Config};
use med_harvest::crawler::{run_harvest, shutdown_on_ctrl_c};
use med_harvest::output::print_report;
use med_harvest::{ConfigError, HarvestError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit code for configuration errors, reported before any network activity
const EXIT_CONFIG: u8 = 2;

/// med-harvest: a polite, resumable medical manual harvester
///
/// med-harvest crawls one edition of the MSD manuals while respecting robots.txt,
/// per-host rate limits and retry budgets, and resumes interrupted runs from a
/// checkpoint.
#[derive(Parser, Debug)]
#[command(name = "med-harvest")]
#[command(version)]
#[command(about = "A polite, resumable medical manual harvester", long_about = None)]
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

    /// Start a fresh crawl, ignoring any existing checkpoint
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without fetching anything
    #[arg(long)]
    dry_run: bool,

    /// Stop after this many successful fetches (overrides the config)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    max_pages: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            if is_configuration_error(&e) {
                ExitCode::from(EXIT_CONFIG)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let mut config = load_config(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    if let Some(max_pages) = cli.max_pages {
        config.crawler.max_pages = Some(max_pages);
    }

    if cli.dry_run {
        return handle_dry_run(&config);
    }

    if cli.fresh {
        tracing::info!("Starting fresh crawl (ignoring previous checkpoint)");
    }

    let report = run_harvest(config, cli.fresh, shutdown_on_ctrl_c()).await?;
    print_report(&report);
    Ok(())
}

/// Configuration problems exit with a dedicated code
fn is_configuration_error(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause.is::<ConfigError>()
            || cause
                .downcast_ref::<HarvestError>()
                .map_or(false, HarvestError::is_configuration)
    })
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("med_harvest=info,storage=info,warn"),
            1 => EnvFilter::new("med_harvest=debug,storage=debug,info"),
            2 => EnvFilter::new("med_harvest=trace,storage=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    let seeds = config.seed.resolve_entry_urls()?;
    let fingerprint = crawl_fingerprint(config)?;

    println!("=== med-harvest Dry Run ===\n");

    println!("Seed:");
    println!("  Version: {}", config.seed.version);
    println!("  Language: {}", config.seed.language);
    for seed in &seeds {
        println!("    * {}", seed);
    }

    println!("\nCrawler Configuration:");
    println!("  Workers: {}", config.crawler.max_workers);
    println!("  Max depth: {}", config.crawler.max_depth);
    match config.crawler.max_pages {
        Some(max) => println!("  Page budget: {}", max),
        None => println!("  Page budget: unlimited"),
    }
    println!("  Fetch timeout: {}ms", config.crawler.fetch_timeout_ms);

    println!("\nPoliteness:");
    println!(
        "  Interval: {}ms (+ up to {}ms jitter, max {}ms)",
        config.politeness.min_interval_ms,
        config.politeness.interval_jitter_ms,
        config.politeness.max_interval_ms
    );
    for (host, overrides) in &config.politeness.hosts {
        println!("    {}: {}ms", host, overrides.min_interval_ms);
    }
    println!("  Respect robots.txt: {}", config.politeness.respect_robots);
    println!("  Allowed hosts:");
    for host in config.effective_allowed_hosts(&seeds) {
        println!("    - {}", host);
    }
    println!("  Disallowed paths: {}", config.politeness.disallow.join(", "));
    println!("  Skip patterns: {}", config.politeness.skip_patterns.join(", "));

    println!("\nRetry:");
    println!(
        "  {} attempts, backoff {}ms..{}ms",
        config.retry.max_attempts, config.retry.backoff_base_ms, config.retry.backoff_cap_ms
    );

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nState:");
    println!("  Checkpoint: {}", config.checkpoint.path.display());
    println!("  Database: {}", config.output.database_path.display());
    println!("  Crawl fingerprint: {}", fingerprint);

    println!("\n✓ Configuration is valid");
    println!("✓ Would start crawling with {} seed URLs", seeds.len());

    Ok(())
}
