//! Politeness controller
//!
//! Decides which URLs may be crawled at all (host allow-list, path filters, robots.txt)
//! and when each host may be touched again. Every host gets its own `HostState`; rate
//! limiting is pure deadline arithmetic and never sleeps.

use crate::config::PolitenessConfig;
use crate::robots::ParsedRobots;
use crate::state::{HostSnapshot, HostState, Reservation, RobotsStatus};
use crate::url::{host_key, host_name, matches_any, robots_url};
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use url::{Position, Url};

/// Why a URL was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    HostNotAllowed(String),
    DisallowedPath(String),
    SkipPattern(String),
    Robots,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostNotAllowed(host) => write!(f, "host '{}' is not allowed", host),
            Self::DisallowedPath(pattern) => write!(f, "path matches disallowed '{}'", pattern),
            Self::SkipPattern(pattern) => write!(f, "URL matches skip pattern '{}'", pattern),
            Self::Robots => write!(f, "disallowed by robots.txt"),
        }
    }
}

/// Per-host rate limiter and URL filter
#[derive(Debug)]
pub struct PolitenessController {
    hosts: HashMap<String, HostState>,
    allowed_hosts: Vec<String>,
    disallow: Vec<String>,
    skip_patterns: Vec<String>,
    intervals: PolitenessConfig,
    interval_jitter: Duration,
    max_interval: Duration,
    respect_robots: bool,
    robots_agent: String,
}

impl PolitenessController {
    /// Creates a controller
    ///
    /// # Arguments
    ///
    /// * `config` - Politeness section of the configuration
    /// * `allowed_hosts` - Effective host allow-list (see `Config::effective_allowed_hosts`)
    /// * `robots_agent` - Agent token matched against robots.txt groups
    pub fn new(
        config: &PolitenessConfig,
        allowed_hosts: Vec<String>,
        robots_agent: impl Into<String>,
    ) -> Self {
        Self {
            hosts: HashMap::new(),
            allowed_hosts,
            disallow: config.disallow.iter().map(|p| p.to_lowercase()).collect(),
            skip_patterns: config.skip_patterns.iter().map(|p| p.to_lowercase()).collect(),
            intervals: config.clone(),
            interval_jitter: config.interval_jitter(),
            max_interval: config.max_interval(),
            respect_robots: config.respect_robots,
            robots_agent: robots_agent.into(),
        }
    }

    /// Checks a URL against every rule, returning the first one it breaks
    pub fn check(&self, url: &Url) -> Result<(), Rejection> {
        let host = host_name(url).unwrap_or_default();
        if !matches_any(&self.allowed_hosts, &host) {
            return Err(Rejection::HostNotAllowed(host));
        }

        let path = url.path().to_lowercase();
        if let Some(pattern) = self.disallow.iter().find(|p| path.contains(p.as_str())) {
            return Err(Rejection::DisallowedPath(pattern.clone()));
        }

        let tail = url[Position::BeforePath..].to_lowercase();
        if let Some(pattern) = self.skip_patterns.iter().find(|p| tail.contains(p.as_str())) {
            return Err(Rejection::SkipPattern(pattern.clone()));
        }

        let rules = host_key(url)
            .and_then(|key| self.hosts.get(&key))
            .and_then(HostState::robots_rules);
        if let Some(rules) = rules {
            if !rules.is_allowed(url.as_str(), &self.robots_agent) {
                return Err(Rejection::Robots);
            }
        }

        Ok(())
    }

    /// Returns true if the URL may be crawled
    pub fn is_allowed(&self, url: &Url) -> bool {
        self.check(url).is_ok()
    }

    /// Returns true if the loaded robots.txt of the URL's host disallows it
    pub fn robots_disallows(&self, url: &Url) -> bool {
        matches!(self.check(url), Err(Rejection::Robots))
    }

    /// Takes a fetch slot on a host
    ///
    /// On `Admit` the next slot moves to `now + min_interval` plus a random jitter. On
    /// `WaitUntil` nothing changes.
    pub fn reserve_slot(&mut self, host: &str, now: Instant) -> Reservation {
        let jitter = self.jitter();
        let state = self.host_mut(host);
        let gap = state.min_interval() + jitter;
        let reservation = state.reserve(now, gap);
        if reservation == Reservation::Admit {
            tracing::trace!("Reserved slot on {} (next in {:?})", host, gap);
        }
        reservation
    }

    /// Earliest instant a fetch may start on a host (`None` = now)
    pub fn next_allowed(&self, host: &str) -> Option<Instant> {
        self.hosts.get(host).and_then(HostState::next_allowed_time)
    }

    /// Returns true if a fetch may start on the host at `now`
    pub fn is_ready(&self, host: &str, now: Instant) -> bool {
        self.hosts.get(host).map_or(true, |s| s.is_ready(now))
    }

    /// Slows a host down after a rate-limit signal
    ///
    /// Returns the widened interval, capped at `max-interval-ms`.
    pub fn widen_interval(&mut self, host: &str, factor: f64, now: Instant) -> Duration {
        let cap = self.max_interval;
        let widened = self.host_mut(host).widen(factor, cap, now);
        tracing::info!("Slowing down {}: interval now {:?}", host, widened);
        widened
    }

    pub fn record_success(&mut self, host: &str) {
        self.host_mut(host).record_success();
    }

    /// Counts a failed fetch, returning the consecutive error count
    pub fn record_error(&mut self, host: &str) -> u32 {
        let state = self.host_mut(host);
        state.record_error();
        state.consecutive_error_count
    }

    pub fn min_interval(&self, host: &str) -> Duration {
        self.hosts
            .get(host)
            .map_or_else(|| self.intervals.interval_for(host), HostState::min_interval)
    }

    /// Returns true if the host's robots.txt has to be fetched before its pages
    pub fn needs_robots(&mut self, host: &str) -> bool {
        self.host_mut(host).robots == RobotsStatus::Unknown
    }

    /// Returns true while the host's robots.txt fetch is in flight
    pub fn robots_pending(&self, host: &str) -> bool {
        self.hosts
            .get(host)
            .map_or(false, |s| s.robots == RobotsStatus::Pending)
    }

    pub fn mark_robots_pending(&mut self, host: &str) {
        self.host_mut(host).robots = RobotsStatus::Pending;
    }

    /// Where the host's robots.txt is fetched from next, with the redirect hops so far
    ///
    /// Starts at `/robots.txt` of `page` and follows redirects recorded by
    /// [`follow_robots_redirect`](Self::follow_robots_redirect).
    pub fn robots_fetch_target(&self, host: &str, page: &Url) -> Option<(Url, u8)> {
        match self.hosts.get(host).and_then(|s| s.robots_redirect.clone()) {
            Some(target) => Some(target),
            None => robots_url(page).map(|url| (url, 0)),
        }
    }

    /// Records a robots.txt redirect; the host waits for the next fetch slot to follow it
    pub fn follow_robots_redirect(&mut self, host: &str, target: Url, hops: u8) {
        let state = self.host_mut(host);
        state.robots = RobotsStatus::Unknown;
        state.robots_redirect = Some((target, hops));
    }

    /// Records an unreachable robots.txt; the host keeps waiting for its rules
    ///
    /// Returns the number of consecutive failed robots.txt fetches.
    pub fn defer_robots(&mut self, host: &str) -> u32 {
        let state = self.host_mut(host);
        state.robots = RobotsStatus::Unknown;
        state.robots_redirect = None;
        state.robots_failures += 1;
        state.robots_failures
    }

    /// Keeps a host closed until at least `until`
    pub fn delay_host(&mut self, host: &str, until: Instant) {
        self.host_mut(host).delay_until(until);
    }

    /// Applies robots.txt rules to a host
    ///
    /// A Crawl-delay longer than the host's interval raises it.
    pub fn install_robots(&mut self, host: &str, rules: ParsedRobots) {
        let delay = rules.crawl_delay(&self.robots_agent);
        let state = self.host_mut(host);
        if let Some(delay) = delay {
            if delay > state.min_interval() {
                tracing::info!("{} requests a crawl delay of {:?}", host, delay);
                state.raise_interval(delay);
            }
        }
        state.robots = RobotsStatus::Loaded(rules);
        state.robots_redirect = None;
        state.robots_failures = 0;
    }

    /// Captures every host, sorted by name
    pub fn snapshot(&self, now: Instant) -> Vec<HostSnapshot> {
        let mut hosts: Vec<HostSnapshot> = self.hosts.values().map(|s| s.snapshot(now)).collect();
        hosts.sort_by(|a, b| a.host.cmp(&b.host));
        hosts
    }

    /// Replaces the host table with a snapshot
    pub fn restore(&mut self, hosts: Vec<HostSnapshot>, now: Instant) {
        let unloaded = self.unloaded_robots();
        self.hosts = hosts
            .into_iter()
            .map(|snap| {
                let state = HostState::from_snapshot(snap, now, unloaded.clone());
                (state.host.clone(), state)
            })
            .collect();
    }

    fn host_mut(&mut self, host: &str) -> &mut HostState {
        let min_interval = self.intervals.interval_for(host);
        let robots = self.unloaded_robots();
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| HostState::new(host, min_interval, robots))
    }

    fn unloaded_robots(&self) -> RobotsStatus {
        if self.respect_robots {
            RobotsStatus::Unknown
        } else {
            RobotsStatus::NotRequired
        }
    }

    fn jitter(&self) -> Duration {
        let max = self.interval_jitter.as_millis() as u64;
        if max == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=max))
        }
    }
}
