//! Configuration module for med-harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files, and
//! computing the crawl fingerprint that ties a checkpoint to the configuration it was
//! taken under.
//!
//! # Example
//!
//! ```no_run
//! use med_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Seeding {} / {}", config.seed.version, config.seed.language);
//! ```

mod catalog;
mod parser;
mod types;
mod validation;

pub use catalog::catalog_entry_urls;
pub use types::{
    CheckpointConfig, Config, CrawlerConfig, HostPolitenessConfig, Language, ManualVersion,
    OutputConfig, PolitenessConfig, RetryConfig, SeedConfig, UserAgentConfig,
};

pub use parser::{crawl_fingerprint, load_config, parse_config};
