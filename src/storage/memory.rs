use crate::storage::traits::{RecordSink, StorageError, StorageResult};
use crate::storage::{FailureRecord, PageRecord};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Inner {
    pages: Vec<PageRecord>,
    failures: Vec<FailureRecord>,
    fail_stores: bool,
}

/// Sink keeping records in memory
///
/// Clones share the same storage, so a caller can hand one clone to the scheduler and
/// inspect another.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `store` fail
    pub fn fail_stores(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_stores = true;
        }
    }

    pub fn pages(&self) -> Vec<PageRecord> {
        self.inner
            .lock()
            .map(|inner| inner.pages.clone())
            .unwrap_or_default()
    }

    pub fn failures(&self) -> Vec<FailureRecord> {
        self.inner
            .lock()
            .map(|inner| inner.failures.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StorageError::Unavailable("memory sink poisoned".to_string()))
    }
}

impl RecordSink for MemorySink {
    fn store(&mut self, record: &PageRecord) -> StorageResult<()> {
        let mut inner = self.lock()?;
        if inner.fail_stores {
            return Err(StorageError::Unavailable("store disabled".to_string()));
        }
        inner.pages.push(record.clone());
        Ok(())
    }

    fn record_failure(&mut self, failure: &FailureRecord) -> StorageResult<()> {
        self.lock()?.failures.push(failure.clone());
        Ok(())
    }
}
