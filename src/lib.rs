//! med-harvest: a polite, resumable harvester for multi-version medical reference sites
//!
//! This crate implements the crawl scheduling and politeness engine: it decides which URL
//! to fetch next, how long to wait before touching a host again, how to recover from
//! failures, and how to resume after an interrupted run.

pub mod checkpoint;
pub mod config;
pub mod crawler;
pub mod frontier;
pub mod output;
pub mod politeness;
pub mod retry;
pub mod robots;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for harvest operations
///
/// Per-task failures never surface here; they are recovered inside the scheduler.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] checkpoint::CheckpointError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Returns true for errors that abort a run before any fetch happens
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),

    #[error("Unsupported language/version combination: {language}/{version}")]
    UnsupportedSeed { language: String, version: String },

    #[error("Seed URL rejected by politeness rules: {0}")]
    SeedDisallowed(String),

    #[error("Unusable checkpoint: {0}")]
    Checkpoint(#[from] checkpoint::CheckpointError),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::Scheduler;
pub use state::{CrawlTask, HostState, TaskState};
pub use url::{normalize_url, Fingerprint};
