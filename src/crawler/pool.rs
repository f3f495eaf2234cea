//! Bounded fetch worker pool
//!
//! Workers are tokio tasks in a `JoinSet`. Each one receives an owned job, performs one
//! network operation under a timeout and hands the outcome back. Workers never see the
//! frontier or the host table.

use crate::crawler::fetcher::{FetchOutcome, FetchResult, Fetcher};
use crate::retry::FailureKind;
use crate::state::CrawlTask;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use url::Url;

/// Unit of work handed to a worker
#[derive(Debug)]
pub enum Job {
    Page(CrawlTask),
    /// Fetch of a host's robots.txt, `hops` redirects away from `/robots.txt`
    Robots { host: String, url: Url, hops: u8 },
}

/// What a worker hands back
#[derive(Debug)]
pub enum JobResult {
    Page(FetchResult),
    Robots {
        host: String,
        url: Url,
        hops: u8,
        outcome: FetchOutcome,
    },
}

/// A fixed number of fetch slots
pub struct WorkerPool {
    fetcher: Arc<dyn Fetcher>,
    workers: JoinSet<JobResult>,
    capacity: usize,
    fetch_timeout: Duration,
}

impl WorkerPool {
    pub fn new(fetcher: Arc<dyn Fetcher>, capacity: usize, fetch_timeout: Duration) -> Self {
        Self {
            fetcher,
            workers: JoinSet::new(),
            capacity: capacity.max(1),
            fetch_timeout,
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.workers.len() < self.capacity
    }

    /// Number of jobs currently running
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Starts a job on a free slot
    pub fn spawn(&mut self, job: Job) {
        let fetcher = Arc::clone(&self.fetcher);
        let timeout = self.fetch_timeout;

        self.workers.spawn(async move {
            match job {
                Job::Page(task) => {
                    let started = Instant::now();
                    let outcome = fetch_with_timeout(fetcher.as_ref(), &task.url, timeout).await;
                    JobResult::Page(FetchResult {
                        task,
                        outcome,
                        duration: started.elapsed(),
                    })
                }
                Job::Robots { host, url, hops } => {
                    let outcome = fetch_with_timeout(fetcher.as_ref(), &url, timeout).await;
                    JobResult::Robots {
                        host,
                        url,
                        hops,
                        outcome,
                    }
                }
            }
        });
    }

    /// Waits for the next finished job
    ///
    /// Returns `None` when no job is running. A worker that panicked is logged and
    /// skipped; the scheduler recovers its task from the in-flight set.
    pub async fn join_next(&mut self) -> Option<JobResult> {
        loop {
            match self.workers.join_next().await? {
                Ok(result) => return Some(result),
                Err(e) => tracing::error!("Fetch worker failed: {}", e),
            }
        }
    }
}

async fn fetch_with_timeout(fetcher: &dyn Fetcher, url: &Url, timeout: Duration) -> FetchOutcome {
    match tokio::time::timeout(timeout, fetcher.fetch(url)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::debug!("Fetch of {} timed out after {:?}", url, timeout);
            FetchOutcome::failure(FailureKind::Transient, "Request timeout")
        }
    }
}
