use crate::robots::ParsedRobots;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Smallest interval a rate-limited host is widened to, for hosts configured with no delay
const MIN_WIDENED_INTERVAL: Duration = Duration::from_secs(1);

/// Answer to a request for a fetch slot on a host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The slot is taken; the fetch may start now
    Admit,
    /// Nothing was reserved; the host is next available at this instant
    WaitUntil(Instant),
}

/// Whether robots.txt rules are known for a host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RobotsStatus {
    /// robots.txt is not consulted
    NotRequired,
    /// Not fetched yet
    Unknown,
    /// A fetch is in flight; pages of the host wait for it
    Pending,
    Loaded(ParsedRobots),
}

/// Pacing state of one host
///
/// `next_allowed_time` only ever moves forward, so a reservation can never be undone
/// by a later update.
#[derive(Debug, Clone)]
pub struct HostState {
    pub host: String,

    /// Earliest instant the next fetch may start (`None` = immediately)
    next_allowed_time: Option<Instant>,

    /// Gap enforced between two fetch starts
    min_interval: Duration,

    pub consecutive_error_count: u32,

    pub robots: RobotsStatus,

    /// robots.txt address reached through redirects, with the hop count
    pub robots_redirect: Option<(Url, u8)>,

    /// Consecutive robots.txt fetches that got no answer
    pub robots_failures: u32,
}

impl HostState {
    pub fn new(host: impl Into<String>, min_interval: Duration, robots: RobotsStatus) -> Self {
        Self {
            host: host.into(),
            next_allowed_time: None,
            min_interval,
            consecutive_error_count: 0,
            robots,
            robots_redirect: None,
            robots_failures: 0,
        }
    }

    pub fn next_allowed_time(&self) -> Option<Instant> {
        self.next_allowed_time
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Returns true if a fetch may start at `now`
    pub fn is_ready(&self, now: Instant) -> bool {
        self.next_allowed_time.map_or(true, |t| now >= t)
    }

    /// Takes the slot at `now` if it is free, pushing the next one `gap` into the future
    pub fn reserve(&mut self, now: Instant, gap: Duration) -> Reservation {
        match self.next_allowed_time {
            Some(t) if now < t => Reservation::WaitUntil(t),
            _ => {
                self.next_allowed_time = Some(now + gap);
                Reservation::Admit
            }
        }
    }

    /// Multiplies the interval by `factor`, capped at `cap`, and delays the next slot by it
    ///
    /// Returns the new interval.
    pub fn widen(&mut self, factor: f64, cap: Duration, now: Instant) -> Duration {
        let widened = self
            .min_interval
            .mul_f64(factor)
            .max(MIN_WIDENED_INTERVAL)
            .min(cap)
            .max(self.min_interval);
        self.min_interval = widened;
        self.push_back(now + widened);
        widened
    }

    /// Raises the interval to at least `interval`
    pub fn raise_interval(&mut self, interval: Duration) {
        if interval > self.min_interval {
            self.min_interval = interval;
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_error_count = 0;
    }

    pub fn record_error(&mut self) {
        self.consecutive_error_count += 1;
    }

    /// Robots rules if loaded
    pub fn robots_rules(&self) -> Option<&ParsedRobots> {
        match &self.robots {
            RobotsStatus::Loaded(rules) => Some(rules),
            _ => None,
        }
    }

    /// Keeps the host closed until at least `until`
    pub fn delay_until(&mut self, until: Instant) {
        self.push_back(until);
    }

    fn push_back(&mut self, until: Instant) {
        if self.next_allowed_time.map_or(true, |t| until > t) {
            self.next_allowed_time = Some(until);
        }
    }

    /// Captures the state with the remaining cooldown relative to `now`
    pub fn snapshot(&self, now: Instant) -> HostSnapshot {
        let cooldown = self
            .next_allowed_time
            .map(|t| t.saturating_duration_since(now))
            .unwrap_or_default();
        HostSnapshot {
            host: self.host.clone(),
            min_interval_ms: self.min_interval.as_millis() as u64,
            cooldown_ms: cooldown.as_millis() as u64,
            consecutive_error_count: self.consecutive_error_count,
            robots_txt: self.robots_rules().map(|r| r.content().to_string()),
        }
    }

    /// Rebuilds a host from a snapshot
    ///
    /// The remaining cooldown is re-applied from `now`. Hosts whose robots.txt was not
    /// loaded yet fall back to `unloaded`.
    pub fn from_snapshot(snapshot: HostSnapshot, now: Instant, unloaded: RobotsStatus) -> Self {
        let robots = match snapshot.robots_txt {
            Some(body) => RobotsStatus::Loaded(ParsedRobots::from_content(&body)),
            None => unloaded,
        };
        let next_allowed_time = match snapshot.cooldown_ms {
            0 => None,
            ms => Some(now + Duration::from_millis(ms)),
        };
        Self {
            host: snapshot.host,
            next_allowed_time,
            min_interval: Duration::from_millis(snapshot.min_interval_ms),
            consecutive_error_count: snapshot.consecutive_error_count,
            robots,
            robots_redirect: None,
            robots_failures: 0,
        }
    }
}

/// Persisted form of a [`HostState`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSnapshot {
    pub host: String,
    pub min_interval_ms: u64,
    pub cooldown_ms: u64,
    pub consecutive_error_count: u32,
    pub robots_txt: Option<String>,
}
