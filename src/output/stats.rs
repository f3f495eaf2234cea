//! Run counters
//!
//! Counters are cumulative over every run that shares a checkpoint, so an interrupted
//! crawl reports the same totals as an uninterrupted one.

use crate::retry::FailureKind;
use crate::state::TaskState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Number of recent failures kept for the report
pub const RECENT_FAILURES: usize = 10;

/// Outcome counters of a crawl
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunStats {
    /// Pages fetched successfully
    pub fetched: u64,

    /// Pages answered with a redirect
    pub redirected: u64,

    /// Tasks resolved by a permanent failure
    pub abandoned_permanent: u64,

    /// Tasks abandoned after exhausting their attempts
    pub abandoned_after_retries: u64,

    /// Attempts rescheduled after a transient failure or rate limit
    pub retries: u64,

    /// Rate-limit signals received
    pub rate_limited: u64,

    /// Fetched pages the parser could not handle
    pub parse_errors: u64,

    /// Records the storage sink failed to persist
    pub storage_errors: u64,

    /// Tasks accepted into the frontier
    pub discovered: u64,

    /// Links that were already known
    pub duplicates: u64,

    /// Links refused by politeness rules or the depth limit
    pub disallowed: u64,

    /// Latest failures, oldest first
    pub recent_failures: VecDeque<FailureNote>,
}

/// A terminal failure kept for the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureNote {
    pub url: String,
    pub state: TaskState,
    pub kind: Option<FailureKind>,
    pub detail: String,
    pub at: DateTime<Utc>,
}

impl RunStats {
    /// Tasks resolved in any terminal state
    pub fn resolved(&self) -> u64 {
        self.fetched + self.redirected + self.abandoned_permanent + self.abandoned_after_retries
    }

    /// Counts a terminal failure and remembers it
    pub fn record_failure(
        &mut self,
        url: &str,
        state: TaskState,
        kind: Option<FailureKind>,
        detail: &str,
    ) {
        match state {
            TaskState::Abandoned => self.abandoned_after_retries += 1,
            _ => self.abandoned_permanent += 1,
        }

        self.recent_failures.push_back(FailureNote {
            url: url.to_string(),
            state,
            kind,
            detail: detail.to_string(),
            at: Utc::now(),
        });
        while self.recent_failures.len() > RECENT_FAILURES {
            self.recent_failures.pop_front();
        }
    }
}
