//! Scheduler: the crawl loop and the single owner of crawl state
//!
//! The scheduler owns the frontier, the politeness controller, the retry policy, the run
//! counters and the checkpoint store. Workers only fetch; every state change happens
//! here, on one task, in response to a worker result or a deadline.
//!
//! # Loop
//!
//! 1. Stop if a shutdown was requested or the page budget is spent
//! 2. Dispatch ready tasks into free worker slots
//! 3. Finish if nothing is pending and no worker is busy
//! 4. Checkpoint when due
//! 5. Sleep until a worker result, the shutdown signal or the next deadline
//!
//! On exit the in-flight work is drained and a final checkpoint is written.

use crate::checkpoint::{Checkpoint, CheckpointStore, FORMAT_VERSION};
use crate::config::{crawl_fingerprint, Config};
use crate::crawler::fetcher::{FetchOutcome, FetchResult, Fetcher};
use crate::crawler::parser::PageParser;
use crate::crawler::pool::{Job, JobResult, WorkerPool};
use crate::frontier::{Dequeue, EnqueueOutcome, Frontier};
use crate::output::{RunReport, RunStats, StopReason};
use crate::politeness::PolitenessController;
use crate::retry::{FailureKind, RetryDecision, RetryPolicy};
use crate::robots::{interpret_robots, ParsedRobots, RobotsVerdict};
use crate::state::{CrawlTask, Reservation, TaskState};
use crate::storage::{FailureRecord, RecordSink};
use crate::url::{normalize_url, Fingerprint};
use crate::{ConfigError, HarvestError};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use url::Url;

/// Priority step per link of depth
const DEPTH_WEIGHT: u32 = 100;

/// Progress is logged every this many fetched pages
const PROGRESS_EVERY: u64 = 10;

/// What woke the loop up
enum Wakeup {
    Shutdown,
    ShutdownClosed,
    Result(Option<JobResult>),
    Deadline,
}

/// Crawl orchestrator
pub struct Scheduler {
    config: Config,
    frontier: Frontier,
    politeness: PolitenessController,
    retry: RetryPolicy,
    pool: WorkerPool,
    parser: Box<dyn PageParser>,
    sink: Box<dyn RecordSink + Send>,
    checkpoints: CheckpointStore,
    fingerprint: String,
    stats: RunStats,
    fetched_this_run: u64,
    pages_in_flight: u64,
    resolved_since_checkpoint: u64,
    last_checkpoint: Instant,
    started: Instant,
}

impl Scheduler {
    /// Builds a scheduler, resuming from the checkpoint when one is present
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `fetcher` - Network collaborator shared by the workers
    /// * `parser` - Turns fetched pages into records and links
    /// * `sink` - Receives records and terminal failures
    /// * `fresh` - Ignore any existing checkpoint and start from the seeds
    ///
    /// # Returns
    ///
    /// * `Ok(Scheduler)` - Ready to run
    /// * `Err(HarvestError::Config)` - Unsupported seed, seeds rejected by the politeness
    ///   rules, or an unreadable or incompatible checkpoint
    pub fn new(
        config: Config,
        fetcher: Arc<dyn Fetcher>,
        parser: Box<dyn PageParser>,
        sink: Box<dyn RecordSink + Send>,
        fresh: bool,
    ) -> Result<Self, HarvestError> {
        let seeds = config.seed.resolve_entry_urls()?;
        let fingerprint = crawl_fingerprint(&config)?;
        let allowed_hosts = config.effective_allowed_hosts(&seeds);
        tracing::debug!("Allowed hosts: {:?}", allowed_hosts);

        let politeness = PolitenessController::new(
            &config.politeness,
            allowed_hosts,
            config.user_agent.crawler_name.clone(),
        );
        let retry = RetryPolicy::new(&config.retry, config.politeness.rate_limit_factor);
        let pool = WorkerPool::new(
            fetcher,
            config.crawler.max_workers as usize,
            config.crawler.fetch_timeout(),
        );
        let checkpoints = CheckpointStore::new(config.checkpoint.path.clone());
        let now = Instant::now();

        let mut scheduler = Self {
            config,
            frontier: Frontier::new(),
            politeness,
            retry,
            pool,
            parser,
            sink,
            checkpoints,
            fingerprint,
            stats: RunStats::default(),
            fetched_this_run: 0,
            pages_in_flight: 0,
            resolved_since_checkpoint: 0,
            last_checkpoint: now,
            started: now,
        };

        let checkpoint = if fresh {
            tracing::info!("Starting fresh; ignoring any existing checkpoint");
            None
        } else {
            scheduler
                .checkpoints
                .load(&scheduler.fingerprint)
                .map_err(ConfigError::Checkpoint)?
        };

        match checkpoint {
            Some(checkpoint) => scheduler.restore(checkpoint, now),
            None => scheduler.seed(seeds)?,
        }

        Ok(scheduler)
    }

    fn seed(&mut self, seeds: Vec<Url>) -> Result<(), ConfigError> {
        for url in seeds {
            if let Err(reason) = self.politeness.check(&url) {
                return Err(ConfigError::SeedDisallowed(format!("{}: {}", url, reason)));
            }
            if self.frontier.enqueue(CrawlTask::seed(url)) == EnqueueOutcome::Queued {
                self.stats.discovered += 1;
            }
        }
        tracing::info!(
            "Seeded frontier with {} URLs ({} {})",
            self.frontier.len(),
            self.config.seed.version,
            self.config.seed.language
        );
        Ok(())
    }

    fn restore(&mut self, checkpoint: Checkpoint, now: Instant) {
        self.frontier = Frontier::restore(checkpoint.frontier, checkpoint.dedup, now);
        self.politeness.restore(checkpoint.hosts, now);
        self.stats = checkpoint.stats;
        tracing::info!(
            "Resuming crawl: {} pending, {} resolved",
            self.frontier.len(),
            self.frontier.dedup().len()
        );
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn politeness(&self) -> &PolitenessController {
        &self.politeness
    }

    /// Counters accumulated over every run of this crawl
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Fingerprint of the crawl configuration, as written into checkpoints
    pub fn config_fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Runs the crawl until it completes, runs out of budget or is told to stop
    ///
    /// Sending `true` on `shutdown` stops admission; in-flight fetches are drained and a
    /// final checkpoint is written before the report is returned.
    pub async fn run(
        &mut self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<RunReport, HarvestError> {
        tracing::info!(
            "Starting harvest: {} pending, {} workers, budget {}",
            self.frontier.len(),
            self.config.crawler.max_workers,
            self.config
                .crawler
                .max_pages
                .map_or_else(|| "unlimited".to_string(), |n| n.to_string())
        );
        self.started = Instant::now();
        self.last_checkpoint = self.started;

        let max_idle = self.config.crawler.max_idle();
        let mut idle_since: Option<Instant> = None;
        let mut shutdown_open = true;

        let stop_reason = loop {
            if *shutdown.borrow() {
                tracing::info!("Shutdown requested, no longer dispatching");
                break StopReason::Interrupted;
            }
            if self.budget_spent() {
                tracing::info!("Page budget of {} reached", self.fetched_this_run);
                break StopReason::PageBudget;
            }

            let now = Instant::now();
            let next_eligible = self.dispatch(now);

            if self.pool.is_empty() {
                if self.frontier.in_flight() > 0 {
                    self.release_orphans();
                    continue;
                }
                if self.frontier.is_empty() {
                    tracing::info!("Frontier is empty, harvest complete");
                    break StopReason::Completed;
                }
            }

            self.maybe_checkpoint(now);

            // Nothing running and nothing scheduled to become ready
            let idle_deadline = if self.pool.is_empty() && next_eligible.is_none() {
                Some(*idle_since.get_or_insert(now) + max_idle)
            } else {
                idle_since = None;
                None
            };

            let checkpoint_due = self.last_checkpoint + self.checkpoint_interval();
            let wake_at = [next_eligible, idle_deadline, Some(checkpoint_due)]
                .into_iter()
                .flatten()
                .min()
                .unwrap_or(checkpoint_due);
            tracing::trace!(
                "Waiting until {:?} ({} running, {} pending)",
                wake_at.saturating_duration_since(now),
                self.pool.len(),
                self.frontier.len()
            );

            let wakeup = tokio::select! {
                changed = shutdown.changed(), if shutdown_open => match changed {
                    Ok(()) => Wakeup::Shutdown,
                    Err(_) => Wakeup::ShutdownClosed,
                },
                result = self.pool.join_next(), if !self.pool.is_empty() => Wakeup::Result(result),
                _ = sleep_until(wake_at) => Wakeup::Deadline,
            };

            match wakeup {
                Wakeup::Shutdown => {}
                Wakeup::ShutdownClosed => shutdown_open = false,
                Wakeup::Result(Some(result)) => {
                    idle_since = None;
                    self.handle_result(result, Instant::now());
                }
                Wakeup::Result(None) => {}
                Wakeup::Deadline => {
                    if idle_deadline.map_or(false, |d| Instant::now() >= d) {
                        tracing::warn!(
                            "No progress for {:?} with {} tasks pending, stopping",
                            max_idle,
                            self.frontier.len()
                        );
                        break StopReason::IdleTimeout;
                    }
                }
            }
        };

        self.drain().await;
        self.checkpoint(Instant::now())?;

        let report = RunReport {
            stats: self.stats.clone(),
            fetched_this_run: self.fetched_this_run,
            stop_reason,
            pending: self.frontier.len(),
            resolved: self.frontier.dedup().len(),
        };
        tracing::info!(
            "Harvest stopped ({}): {} fetched this run in {:?}",
            report.stop_reason,
            report.fetched_this_run,
            self.started.elapsed()
        );
        Ok(report)
    }

    /// Waits for every in-flight job and applies its result
    async fn drain(&mut self) {
        if !self.pool.is_empty() {
            tracing::info!("Draining {} in-flight fetches", self.pool.len());
        }
        while let Some(result) = self.pool.join_next().await {
            self.handle_result(result, Instant::now());
        }
        self.release_orphans();
    }

    /// Requeues tasks whose worker died without reporting back
    fn release_orphans(&mut self) {
        let orphans = self.frontier.release_orphans();
        self.pages_in_flight = 0;
        if orphans > 0 {
            tracing::warn!("Returned {} orphaned tasks to the frontier", orphans);
        }
    }

    fn budget_spent(&self) -> bool {
        self.config
            .crawler
            .max_pages
            .map_or(false, |max| self.fetched_this_run >= max)
    }

    /// Fetches already counted plus those that may still succeed stay within the budget
    fn budget_allows_dispatch(&self) -> bool {
        self.config
            .crawler
            .max_pages
            .map_or(true, |max| self.fetched_this_run + self.pages_in_flight < max)
    }

    /// Fills free worker slots, returning when the next task becomes eligible
    fn dispatch(&mut self, now: Instant) -> Option<Instant> {
        while self.pool.has_capacity() && self.budget_allows_dispatch() {
            match self.frontier.dequeue_ready(now, &self.politeness) {
                Dequeue::Ready(task) => {
                    if let Some(until) = self.start(task, now) {
                        return Some(until);
                    }
                }
                Dequeue::Wait(until) => return Some(until),
                Dequeue::Blocked | Dequeue::Idle => return None,
            }
        }
        None
    }

    /// Starts one task; a host without robots.txt rules gets its robots.txt fetched first
    ///
    /// Either fetch takes the host's politeness slot.
    fn start(&mut self, mut task: CrawlTask, now: Instant) -> Option<Instant> {
        let host = task.host_key();

        let robots_fetch = if self.politeness.needs_robots(&host) {
            let target = self.politeness.robots_fetch_target(&host, &task.url);
            if target.is_none() {
                self.politeness.install_robots(&host, ParsedRobots::allow_all());
            }
            target
        } else {
            None
        };

        if let Reservation::WaitUntil(until) = self.politeness.reserve_slot(&host, now) {
            self.frontier.release(task);
            return Some(until);
        }

        if let Some((url, hops)) = robots_fetch {
            tracing::debug!("Fetching {}", url);
            self.politeness.mark_robots_pending(&host);
            self.pool.spawn(Job::Robots { host, url, hops });
            self.frontier.release(task);
            return None;
        }

        task.begin_attempt();
        tracing::debug!(
            "Fetching {} (depth {}, attempt {})",
            task.url,
            task.depth,
            task.attempt_count
        );
        self.pages_in_flight += 1;
        self.pool.spawn(Job::Page(task));
        None
    }

    fn handle_result(&mut self, result: JobResult, now: Instant) {
        match result {
            JobResult::Robots {
                host,
                url,
                hops,
                outcome,
            } => self.handle_robots(&host, &url, hops, &outcome, now),
            JobResult::Page(FetchResult {
                task,
                outcome,
                duration,
            }) => {
                self.pages_in_flight = self.pages_in_flight.saturating_sub(1);
                tracing::trace!("{} answered in {:?}", task.url, duration);
                match outcome {
                    FetchOutcome::Success { body, headers, .. } => {
                        self.handle_success(task, &body, &headers)
                    }
                    FetchOutcome::Redirect { status, target } => {
                        self.handle_redirect(task, status, &target, now)
                    }
                    FetchOutcome::Failure {
                        kind,
                        status,
                        detail,
                    } => self.handle_failure(task, kind, status, detail, now),
                }
            }
        }
    }

    fn handle_robots(
        &mut self,
        host: &str,
        url: &Url,
        hops: u8,
        outcome: &FetchOutcome,
        now: Instant,
    ) {
        match interpret_robots(url, outcome, hops) {
            RobotsVerdict::Rules(rules) => {
                if rules.is_allow_all() {
                    tracing::debug!("No robots.txt restrictions for {}", host);
                }
                self.politeness.install_robots(host, rules);

                let politeness = &self.politeness;
                let purged = self
                    .frontier
                    .purge_host(host, |task| politeness.robots_disallows(&task.url));
                if !purged.is_empty() {
                    tracing::info!("robots.txt of {} removed {} queued URLs", host, purged.len());
                }
                for task in purged {
                    self.note_failure(
                        &task,
                        TaskState::Failed,
                        Some(FailureKind::Permanent),
                        None,
                        "disallowed by robots discovered late",
                    );
                }
            }
            RobotsVerdict::Follow(target) => {
                tracing::debug!("robots.txt of {} redirects to {}", host, target);
                self.politeness
                    .follow_robots_redirect(host, target, hops.saturating_add(1));
            }
            RobotsVerdict::Unreachable => {
                let failures = self.politeness.defer_robots(host);
                if failures < self.retry.max_attempts() {
                    let delay = self.retry.backoff(failures);
                    tracing::warn!(
                        "robots.txt of {} unreachable ({} of {}), retrying in {:?}",
                        host,
                        failures,
                        self.retry.max_attempts(),
                        delay
                    );
                    self.politeness.delay_host(host, now + delay);
                    return;
                }

                tracing::warn!(
                    "robots.txt of {} unreachable after {} attempts, closing the host",
                    host,
                    failures
                );
                self.politeness
                    .install_robots(host, ParsedRobots::disallow_all());
                let purged = self.frontier.purge_host(host, |_| true);
                for task in purged {
                    self.note_failure(
                        &task,
                        TaskState::Abandoned,
                        Some(FailureKind::Transient),
                        None,
                        "robots.txt unreachable",
                    );
                }
            }
        }
    }

    fn handle_success(&mut self, task: CrawlTask, body: &[u8], headers: &HashMap<String, String>) {
        self.politeness.record_success(&task.host_key());
        self.frontier.complete(&task.fingerprint());
        self.stats.fetched += 1;
        self.fetched_this_run += 1;
        self.resolved_since_checkpoint += 1;

        match self.parser.parse(&task.url, body, headers) {
            Ok(page) => {
                if let Some(mut record) = page.record {
                    record.depth = task.depth;
                    record.discovered_from = task.discovered_from.as_ref().map(Url::to_string);
                    if let Err(e) = self.sink.store(&record) {
                        tracing::warn!(target: "storage", "Failed to store {}: {}", record.url, e);
                        self.stats.storage_errors += 1;
                    }
                }
                self.discover(&task, page.links);
            }
            Err(e) => {
                tracing::warn!("Failed to parse {}: {}", task.url, e);
                self.stats.parse_errors += 1;
            }
        }

        if self.fetched_this_run % PROGRESS_EVERY == 0 {
            let elapsed = self.started.elapsed().as_secs_f64().max(f64::EPSILON);
            tracing::info!(
                "Progress: {} fetched, {} pending, {:.2} pages/sec",
                self.fetched_this_run,
                self.frontier.len(),
                self.fetched_this_run as f64 / elapsed
            );
        }
    }

    /// Offers the links of a fetched page to the frontier
    fn discover(&mut self, parent: &CrawlTask, links: Vec<String>) {
        let depth = parent.depth + 1;
        if depth > self.config.crawler.max_depth {
            tracing::trace!("Not following links of {} beyond max depth", parent.url);
            return;
        }

        let mut queued = 0;
        for link in links {
            match normalize_url(&link) {
                Ok(url) => {
                    if self.offer(url, Some(&parent.url), depth) {
                        queued += 1;
                    }
                }
                Err(e) => tracing::trace!("Ignoring link {}: {}", link, e),
            }
        }
        tracing::debug!("{} new URLs from {}", queued, parent.url);
    }

    /// Runs a URL through the politeness rules and the frontier; true when queued
    fn offer(&mut self, url: Url, discovered_from: Option<&Url>, depth: u32) -> bool {
        if let Err(reason) = self.politeness.check(&url) {
            tracing::trace!("Skipping {}: {}", url, reason);
            self.stats.disallowed += 1;
            return false;
        }

        let priority = self.priority_for(&url, depth);
        let task = CrawlTask::new(url, discovered_from.cloned(), depth, priority);
        match self.frontier.enqueue(task) {
            EnqueueOutcome::Queued => {
                self.stats.discovered += 1;
                true
            }
            EnqueueOutcome::AlreadyKnown => {
                self.stats.duplicates += 1;
                false
            }
        }
    }

    /// Shallower pages first; pages outside the seeded manual version after their depth peers
    fn priority_for(&self, url: &Url, depth: u32) -> u32 {
        let base = depth.saturating_mul(DEPTH_WEIGHT);
        if self.config.seed.version.covers(url) {
            base
        } else {
            base.saturating_add(self.config.crawler.off_version_penalty)
        }
    }

    fn handle_redirect(&mut self, mut task: CrawlTask, status: u16, target: &str, now: Instant) {
        let resolved = task
            .url
            .join(target)
            .ok()
            .and_then(|u| normalize_url(u.as_str()).ok());
        let Some(target_url) = resolved else {
            self.fail(
                task,
                TaskState::Failed,
                Some(FailureKind::Permanent),
                Some(status),
                format!("redirect to invalid target '{}'", target),
            );
            return;
        };

        // Same resource under another spelling: fetch the new spelling in place
        if Fingerprint::of(&target_url) == task.fingerprint() {
            if task.attempt_count >= self.retry.max_attempts() {
                self.fail(
                    task,
                    TaskState::Failed,
                    Some(FailureKind::Permanent),
                    Some(status),
                    format!("redirect loop at {}", target_url),
                );
            } else {
                tracing::debug!("{} redirects to its own resource {}", task.url, target_url);
                task.url = target_url;
                self.frontier.requeue(task, Duration::ZERO, now);
            }
            return;
        }

        if let Err(reason) = self.politeness.check(&target_url) {
            self.fail(
                task,
                TaskState::Failed,
                Some(FailureKind::Permanent),
                Some(status),
                format!("redirect to {}: {}", target_url, reason),
            );
            return;
        }

        tracing::debug!("{} redirected ({}) to {}", task.url, status, target_url);
        self.politeness.record_success(&task.host_key());
        self.frontier.complete(&task.fingerprint());
        self.stats.redirected += 1;
        self.resolved_since_checkpoint += 1;

        let priority = self.priority_for(&target_url, task.depth);
        let follow = CrawlTask::new(target_url, Some(task.url), task.depth, priority);
        match self.frontier.enqueue(follow) {
            EnqueueOutcome::Queued => self.stats.discovered += 1,
            EnqueueOutcome::AlreadyKnown => self.stats.duplicates += 1,
        }
    }

    fn handle_failure(
        &mut self,
        task: CrawlTask,
        kind: FailureKind,
        status: Option<u16>,
        detail: String,
        now: Instant,
    ) {
        let host = task.host_key();
        let consecutive = self.politeness.record_error(&host);
        if kind == FailureKind::RateLimited {
            self.stats.rate_limited += 1;
        }

        match self.retry.decide(&task, kind) {
            RetryDecision::Retry { delay } => {
                tracing::warn!(
                    "{} failed ({}), retry {}/{} in {:?} ({} consecutive errors on {})",
                    task.url,
                    detail,
                    task.attempt_count,
                    self.retry.max_attempts(),
                    delay,
                    consecutive,
                    host
                );
                self.stats.retries += 1;
                self.frontier.requeue(task, delay, now);
            }
            RetryDecision::SlowDown { factor } => {
                let interval = self.politeness.widen_interval(&host, factor, now);
                tracing::warn!("{} rate limited ({}), retrying in {:?}", task.url, detail, interval);
                self.stats.retries += 1;
                self.frontier.requeue(task, interval, now);
            }
            RetryDecision::Abandon => {
                if kind == FailureKind::RateLimited {
                    let factor = self.config.politeness.rate_limit_factor;
                    self.politeness.widen_interval(&host, factor, now);
                }
                self.fail(task, TaskState::Abandoned, Some(kind), status, detail);
            }
            RetryDecision::GiveUp => {
                self.fail(task, TaskState::Failed, Some(kind), status, detail);
            }
        }
    }

    /// Resolves an in-flight task as a terminal failure
    fn fail(
        &mut self,
        task: CrawlTask,
        state: TaskState,
        kind: Option<FailureKind>,
        status: Option<u16>,
        detail: String,
    ) {
        self.frontier.complete(&task.fingerprint());
        self.note_failure(&task, state, kind, status, &detail);
    }

    fn note_failure(
        &mut self,
        task: &CrawlTask,
        state: TaskState,
        kind: Option<FailureKind>,
        status: Option<u16>,
        detail: &str,
    ) {
        tracing::warn!(
            "{} {} after {} attempts: {}",
            task.url,
            state,
            task.attempt_count,
            detail
        );
        self.stats
            .record_failure(task.url.as_str(), state, kind, detail);
        self.resolved_since_checkpoint += 1;

        let record = FailureRecord {
            url: task.url.to_string(),
            state,
            kind,
            status_code: status,
            detail: detail.to_string(),
            attempts: task.attempt_count,
            failed_at: Utc::now(),
        };
        if let Err(e) = self.sink.record_failure(&record) {
            tracing::warn!(target: "storage", "Failed to record failure of {}: {}", record.url, e);
            self.stats.storage_errors += 1;
        }
    }

    fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.config.checkpoint.interval_secs.max(1))
    }

    /// Writes a checkpoint when enough tasks resolved or enough time passed
    ///
    /// A failed periodic checkpoint is logged; the next one retries.
    fn maybe_checkpoint(&mut self, now: Instant) {
        let by_pages = self.resolved_since_checkpoint >= self.config.checkpoint.interval_pages.max(1);
        let by_time = now.saturating_duration_since(self.last_checkpoint) >= self.checkpoint_interval();
        if !(by_pages || by_time) {
            return;
        }
        if let Err(e) = self.checkpoint(now) {
            tracing::error!("Failed to write checkpoint: {}", e);
            self.last_checkpoint = now;
        }
    }

    fn checkpoint(&mut self, now: Instant) -> Result<(), HarvestError> {
        if let Err(e) = self.sink.flush() {
            tracing::warn!(target: "storage", "Failed to flush records: {}", e);
            self.stats.storage_errors += 1;
        }

        let checkpoint = Checkpoint {
            format_version: FORMAT_VERSION,
            config_fingerprint: self.fingerprint.clone(),
            taken_at: Utc::now(),
            frontier: self.frontier.snapshot(now),
            dedup: self.frontier.dedup().snapshot(),
            hosts: self.politeness.snapshot(now),
            stats: self.stats.clone(),
        };
        self.checkpoints.save(&checkpoint)?;

        self.resolved_since_checkpoint = 0;
        self.last_checkpoint = now;
        Ok(())
    }
}
