//! Retry and backoff decisions
//!
//! `RetryPolicy::decide` is a pure function of the task and the failure kind; the
//! scheduler applies its answer to the frontier and the politeness controller.

use crate::config::RetryConfig;
use crate::state::CrawlTask;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Class of a failed fetch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Timeout, connection error, 5xx or 408; worth retrying later
    Transient,
    /// 429 or a soft block; the host must be slowed down
    RateLimited,
    /// Retrying cannot help
    Permanent,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transient => "transient",
            Self::RateLimited => "rate_limited",
            Self::Permanent => "permanent",
        };
        f.write_str(name)
    }
}

/// Classifies an HTTP status code, `None` for statuses that are not failures
///
/// # Examples
///
/// ```
/// use med_harvest::retry::{classify_status, FailureKind};
///
/// assert_eq!(classify_status(200), None);
/// assert_eq!(classify_status(429), Some(FailureKind::RateLimited));
/// assert_eq!(classify_status(503), Some(FailureKind::Transient));
/// assert_eq!(classify_status(404), Some(FailureKind::Permanent));
/// ```
pub fn classify_status(status: u16) -> Option<FailureKind> {
    match status {
        100..=399 => None,
        429 => Some(FailureKind::RateLimited),
        408 => Some(FailureKind::Transient),
        400..=499 => Some(FailureKind::Permanent),
        _ => Some(FailureKind::Transient),
    }
}

/// What to do with a task after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    /// Requeue after `delay`
    Retry { delay: Duration },
    /// Widen the host interval by `factor`, then requeue after the new interval
    SlowDown { factor: f64 },
    /// Attempts exhausted
    Abandon,
    /// Permanent failure; never fetch again
    GiveUp,
}

/// Retry policy built from the `[retry]` and `[politeness]` configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_ms: u64,
    cap_ms: u64,
    jitter_percent: u64,
    rate_limit_factor: f64,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig, rate_limit_factor: f64) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_ms: config.backoff_base_ms,
            cap_ms: config.backoff_cap_ms,
            jitter_percent: config.jitter_percent,
            rate_limit_factor,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides the fate of a task whose latest attempt failed with `kind`
    ///
    /// `task.attempt_count` already includes the failed attempt.
    pub fn decide(&self, task: &CrawlTask, kind: FailureKind) -> RetryDecision {
        let exhausted = task.attempt_count >= self.max_attempts;
        match kind {
            FailureKind::Permanent => RetryDecision::GiveUp,
            _ if exhausted => RetryDecision::Abandon,
            FailureKind::Transient => RetryDecision::Retry {
                delay: self.backoff(task.attempt_count),
            },
            FailureKind::RateLimited => RetryDecision::SlowDown {
                factor: self.rate_limit_factor,
            },
        }
    }

    /// Exponential backoff `min(base * 2^attempt, cap)` plus jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_ms
            .saturating_mul(2u64.saturating_pow(attempt.min(20)));
        let capped = exponential.min(self.cap_ms);
        let jitter = if self.jitter_percent > 0 {
            rand::thread_rng().gen_range(0..=capped.saturating_mul(self.jitter_percent) / 100)
        } else {
            0
        };
        Duration::from_millis(capped + jitter)
    }
}
