//! Record sink trait and error types

use crate::storage::{FailureRecord, PageRecord};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Destination of parsed records
///
/// The scheduler treats a sink as fire-and-forget: an error is logged and counted, the
/// record is not retried and its URL is not fetched again.
pub trait RecordSink {
    /// Persists a parsed page
    fn store(&mut self, record: &PageRecord) -> StorageResult<()>;

    /// Persists a task that ended without a page
    fn record_failure(&mut self, failure: &FailureRecord) -> StorageResult<()>;

    /// Flushes buffered writes; called before every checkpoint
    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }
}
