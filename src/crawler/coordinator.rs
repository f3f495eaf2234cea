//! Wiring of the production collaborators
//!
//! Builds a [`Scheduler`] with the reqwest fetcher, the HTML parser and the SQLite sink,
//! and connects Ctrl-C to its shutdown signal.

use crate::config::Config;
use crate::crawler::fetcher::HttpFetcher;
use crate::crawler::parser::HtmlPageParser;
use crate::crawler::scheduler::Scheduler;
use crate::output::RunReport;
use crate::storage::open_sink;
use crate::HarvestError;
use std::sync::Arc;
use tokio::sync::watch;

/// Builds a scheduler backed by HTTP, scraper and SQLite
///
/// # Arguments
///
/// * `config` - Validated configuration
/// * `fresh` - Start from the seeds even if a checkpoint exists
pub fn build_scheduler(config: Config, fresh: bool) -> Result<Scheduler, HarvestError> {
    let fetcher = HttpFetcher::new(&config.user_agent, config.crawler.fetch_timeout())?;
    let sink = open_sink(&config.output.database_path)?;
    tracing::info!("Writing articles to {}", config.output.database_path.display());

    Scheduler::new(
        config,
        Arc::new(fetcher),
        Box::new(HtmlPageParser::new()),
        Box::new(sink),
        fresh,
    )
}

/// Runs a complete harvest
///
/// # Arguments
///
/// * `config` - Validated configuration
/// * `fresh` - Start from the seeds even if a checkpoint exists
/// * `shutdown` - Receives `true` when the run should stop gracefully
///
/// # Returns
///
/// * `Ok(RunReport)` - The run ended (completed, budget, interrupted or idle)
/// * `Err(HarvestError)` - Startup failed or the final checkpoint could not be written
///
/// # Example
///
/// ```no_run
/// use med_harvest::config::load_config;
/// use med_harvest::crawler::{run_harvest, shutdown_on_ctrl_c};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("harvest.toml"))?;
/// let report = run_harvest(config, false, shutdown_on_ctrl_c()).await?;
/// println!("{}", report);
/// # Ok(())
/// # }
/// ```
pub async fn run_harvest(
    config: Config,
    fresh: bool,
    shutdown: watch::Receiver<bool>,
) -> Result<RunReport, HarvestError> {
    let mut scheduler = build_scheduler(config, fresh)?;
    scheduler.run(shutdown).await
}

/// Returns a receiver that turns `true` on the first Ctrl-C
///
/// A second Ctrl-C exits the process immediately.
pub fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received Ctrl-C, finishing in-flight fetches (press again to quit)");
            let _ = tx.send(true);

            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::error!("Forced exit; progress since the last checkpoint is lost");
                std::process::exit(130);
            }
        }
    });

    rx
}
