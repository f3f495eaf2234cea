//! Crawler module: fetching, parsing and scheduling
//!
//! This module contains the crawl engine, including:
//! - The `Fetcher` seam and its reqwest implementation
//! - The `PageParser` seam and its scraper implementation
//! - The bounded worker pool
//! - The scheduler that owns all crawl state
//! - Wiring of the production collaborators

mod coordinator;
mod fetcher;
mod parser;
mod pool;
mod scheduler;

pub use coordinator::{build_scheduler, run_harvest, shutdown_on_ctrl_c};
pub use fetcher::{FetchOutcome, FetchResult, Fetcher, HttpFetcher};
pub use parser::{HtmlPageParser, PageParser, ParseError, ParsedPage};
pub use pool::{Job, JobResult, WorkerPool};
pub use scheduler::Scheduler;
