//! Storage module for persisting harvested records
//!
//! This module handles:
//! - The `RecordSink` seam between the scheduler and persistence
//! - The SQLite sink used by the binary
//! - An in-memory sink for embedding and tests

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemorySink;
pub use sqlite::SqliteSink;
pub use traits::{RecordSink, StorageError, StorageResult};

use crate::config::{Language, ManualVersion};
use crate::retry::FailureKind;
use crate::state::TaskState;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Opens the SQLite sink at a path, creating the schema if needed
pub fn open_sink(path: &Path) -> StorageResult<SqliteSink> {
    SqliteSink::new(path)
}

/// A parsed page ready to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct PageRecord {
    pub url: String,
    pub title: Option<String>,
    pub content: String,
    /// Hex SHA-256 of `content`
    pub content_hash: String,
    pub word_count: u32,
    pub language: Language,
    pub version: Option<ManualVersion>,
    pub depth: u32,
    pub discovered_from: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

/// A task that ended without a page
#[derive(Debug, Clone, PartialEq)]
pub struct FailureRecord {
    pub url: String,
    pub state: TaskState,
    pub kind: Option<FailureKind>,
    pub status_code: Option<u16>,
    pub detail: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}
