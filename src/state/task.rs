use crate::url::{host_key, Fingerprint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// A URL scheduled for fetching
///
/// The frontier owns a task while it waits; it is moved into a worker for one fetch
/// attempt and comes back either to be requeued or to be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlTask {
    /// Normalized absolute URL
    pub url: Url,

    /// Page the URL was found on (`None` for seeds)
    pub discovered_from: Option<Url>,

    /// Link distance from the nearest seed
    pub depth: u32,

    /// Lower values are fetched first
    pub priority: u32,

    /// Discovery order, assigned by the frontier; breaks priority ties
    pub seq: u64,

    /// Number of fetch attempts dispatched so far
    pub attempt_count: u32,

    pub first_seen_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl CrawlTask {
    /// Creates a task that has never been attempted
    pub fn new(url: Url, discovered_from: Option<Url>, depth: u32, priority: u32) -> Self {
        Self {
            url,
            discovered_from,
            depth,
            priority,
            seq: 0,
            attempt_count: 0,
            first_seen_at: Utc::now(),
            last_attempt_at: None,
        }
    }

    /// Creates a seed task at depth 0
    pub fn seed(url: Url) -> Self {
        Self::new(url, None, 0, 0)
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.url)
    }

    /// Politeness key of the task's host
    pub fn host_key(&self) -> String {
        host_key(&self.url).unwrap_or_default()
    }

    /// Marks the start of a fetch attempt
    pub fn begin_attempt(&mut self) {
        self.attempt_count += 1;
        self.last_attempt_at = Some(Utc::now());
    }
}

/// Lifecycle of a crawl task
///
/// `Pending → InFlight → {Fetched, Redirected, Pending (after a delay), Abandoned, Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    // ===== Active States =====
    /// Waiting in the frontier
    Pending,

    /// Dispatched to a worker
    InFlight,

    // ===== Terminal States =====
    /// Fetched successfully and handed to the parser
    Fetched,

    /// Answered with a redirect; the target was enqueued instead
    Redirected,

    /// Gave up after exhausting retries
    Abandoned,

    /// Failed permanently (4xx, disallowed, malformed)
    Failed,
}

impl TaskState {
    /// Returns true if the task has been resolved
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::InFlight)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Fetched | Self::Redirected)
    }

    /// Converts the state to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Fetched => "fetched",
            Self::Redirected => "redirected",
            Self::Abandoned => "abandoned",
            Self::Failed => "failed",
        }
    }

    /// Parses a state from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_flight" => Some(Self::InFlight),
            "fetched" => Some(Self::Fetched),
            "redirected" => Some(Self::Redirected),
            "abandoned" => Some(Self::Abandoned),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
