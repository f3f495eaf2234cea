//! Integration tests for the crawler
//!
//! Scheduling scenarios run against a scripted in-memory fetcher on a paused tokio
//! clock, so politeness gaps and backoff delays are exact. One end-to-end test uses
//! wiremock with the real HTTP fetcher and the SQLite sink.

use async_trait::async_trait;
use med_harvest::checkpoint::CheckpointStore;
use med_harvest::config::{parse_config, Config};
use med_harvest::crawler::{run_harvest, FetchOutcome, Fetcher, HtmlPageParser};
use med_harvest::output::StopReason;
use med_harvest::retry::FailureKind;
use med_harvest::state::TaskState;
use med_harvest::storage::{MemorySink, SqliteSink};
use med_harvest::Scheduler;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;
use tokio::time::Instant;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HOST: &str = "https://site.test";

fn url(p: &str) -> String {
    format!("{}{}", HOST, p)
}

/// HTML page with some text and the given links
fn page(links: &[&str]) -> FetchOutcome {
    let anchors: String = links
        .iter()
        .map(|l| format!(r#"<a href="{}">link</a>"#, l))
        .collect();
    let body = format!(
        "<html><head><title>Article</title></head><body><main><h1>Article</h1><p>Some text.</p>{}</main></body></html>",
        anchors
    );
    let mut headers = HashMap::new();
    headers.insert("content-type".to_string(), "text/html; charset=utf-8".to_string());
    FetchOutcome::Success {
        status: 200,
        body: body.into_bytes(),
        headers,
    }
}

/// robots.txt file with the given rules
fn robots(body: &str) -> FetchOutcome {
    let mut headers = HashMap::new();
    headers.insert("content-type".to_string(), "text/plain".to_string());
    FetchOutcome::Success {
        status: 200,
        body: body.as_bytes().to_vec(),
        headers,
    }
}

fn failure(kind: FailureKind, status: u16) -> FetchOutcome {
    FetchOutcome::Failure {
        kind,
        status: Some(status),
        detail: format!("HTTP {}", status),
    }
}

#[derive(Default)]
struct ScriptState {
    /// Outcomes per URL; the last one repeats
    routes: HashMap<String, VecDeque<FetchOutcome>>,
    log: Vec<(String, Instant)>,
}

/// Fetcher answering from a script and recording every request
#[derive(Clone, Default)]
struct ScriptedFetcher {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedFetcher {
    fn new() -> Self {
        Self::default()
    }

    fn route(self, url: &str, outcomes: Vec<FetchOutcome>) -> Self {
        self.add(url, outcomes);
        self
    }

    fn add(&self, url: &str, outcomes: Vec<FetchOutcome>) {
        self.state
            .lock()
            .unwrap()
            .routes
            .insert(url.to_string(), outcomes.into());
    }

    fn requests(&self) -> Vec<(String, Instant)> {
        self.state.lock().unwrap().log.clone()
    }

    fn fetched_urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|(u, _)| u).collect()
    }

    fn count(&self, url: &str) -> usize {
        self.requests().iter().filter(|(u, _)| u == url).count()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &Url) -> FetchOutcome {
        let mut state = self.state.lock().unwrap();
        state.log.push((url.to_string(), Instant::now()));
        match state.routes.get_mut(url.as_str()) {
            Some(outcomes) if outcomes.len() > 1 => outcomes.pop_front().unwrap(),
            Some(outcomes) => outcomes
                .front()
                .cloned()
                .unwrap_or_else(|| failure(FailureKind::Permanent, 404)),
            None => failure(FailureKind::Permanent, 404),
        }
    }
}

/// Answers like the wrapped fetcher, after a fixed delay
struct SlowFetcher {
    inner: ScriptedFetcher,
    delay: Duration,
}

#[async_trait]
impl Fetcher for SlowFetcher {
    async fn fetch(&self, url: &Url) -> FetchOutcome {
        tokio::time::sleep(self.delay).await;
        self.inner.fetch(url).await
    }
}

/// Worker dies on every robots.txt request
struct CrashingRobotsFetcher;

#[async_trait]
impl Fetcher for CrashingRobotsFetcher {
    async fn fetch(&self, url: &Url) -> FetchOutcome {
        if url.path() == "/robots.txt" {
            panic!("robots.txt worker crashed");
        }
        page(&[])
    }
}

/// Base configuration: one worker, 100ms politeness interval, robots.txt off
fn config(dir: &Path, seeds: &[&str]) -> Config {
    let seeds: Vec<String> = seeds.iter().map(|s| format!("\"{}\"", s)).collect();
    parse_config(&format!(
        r#"
[crawler]
max-workers = 1
max-depth = 10

[politeness]
min-interval-ms = 100
max-interval-ms = 300000
respect-robots = false

[retry]
max-attempts = 3
backoff-base-ms = 1000
backoff-cap-ms = 60000

[user-agent]
crawler-name = "TestHarvester"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[checkpoint]
path = "{}"
interval-pages = 2

[output]
database-path = "{}"

[seed]
language = "en"
version = "home"
entry-urls = [{}]
"#,
        dir.join("checkpoint.json").display(),
        dir.join("harvest.db").display(),
        seeds.join(", ")
    ))
    .expect("test config should be valid")
}

fn scheduler(config: Config, fetcher: &ScriptedFetcher, sink: &MemorySink) -> Scheduler {
    Scheduler::new(
        config,
        Arc::new(fetcher.clone()),
        Box::new(HtmlPageParser::new()),
        Box::new(sink.clone()),
        false,
    )
    .expect("scheduler should start")
}

async fn run(scheduler: &mut Scheduler) -> med_harvest::output::RunReport {
    let (_tx, rx) = watch::channel(false);
    scheduler.run(rx).await.expect("run should finish")
}

#[tokio::test(start_paused = true)]
async fn test_seed_with_two_links_resolves_three() {
    let dir = TempDir::new().unwrap();
    let fetcher = ScriptedFetcher::new()
        .route(&url("/home/a"), vec![page(&["/home/b", "/home/c"])])
        .route(&url("/home/b"), vec![page(&[])])
        .route(&url("/home/c"), vec![page(&["/home/a"])]);
    let sink = MemorySink::new();

    let mut scheduler = scheduler(config(dir.path(), &[&url("/home/a")]), &fetcher, &sink);
    let report = run(&mut scheduler).await;

    assert_eq!(report.stop_reason, StopReason::Completed);
    assert_eq!(report.stats.fetched, 3);
    assert_eq!(report.resolved, 3);
    assert_eq!(report.pending, 0);
    assert_eq!(fetcher.count(&url("/home/a")), 1);
    assert_eq!(sink.pages().len(), 3);

    let b = sink
        .pages()
        .into_iter()
        .find(|p| p.url == url("/home/b"))
        .unwrap();
    assert_eq!(b.depth, 1);
    assert_eq!(b.discovered_from.as_deref(), Some(url("/home/a").as_str()));
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_is_idempotent_per_normalized_url() {
    let dir = TempDir::new().unwrap();
    let fetcher = ScriptedFetcher::new()
        .route(
            &url("/home/a"),
            vec![page(&[
                "/home/b",
                "/home/b/",
                "/home/./b#section",
                "/home/b?utm_source=mail",
                "HTTPS://SITE.TEST/home/b",
            ])],
        )
        .route(&url("/home/b"), vec![page(&[])]);
    let sink = MemorySink::new();

    let mut scheduler = scheduler(config(dir.path(), &[&url("/home/a")]), &fetcher, &sink);
    let report = run(&mut scheduler).await;

    assert_eq!(report.stats.fetched, 2);
    assert_eq!(fetcher.fetched_urls().len(), 2);
    assert_eq!(report.stats.duplicates, 4);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_starts_respect_min_interval_per_host() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path(), &[&url("/home/a")]);
    config.crawler.max_workers = 4;
    config.politeness.allowed_hosts = vec!["*.test".to_string()];

    let fetcher = ScriptedFetcher::new()
        .route(
            &url("/home/a"),
            vec![page(&[
                "/home/b",
                "/home/c",
                "/home/d",
                "https://other.test/home/x",
                "https://other.test/home/y",
            ])],
        )
        .route("https://other.test/home/x", vec![page(&[])])
        .route("https://other.test/home/y", vec![page(&[])]);
    for p in ["/home/b", "/home/c", "/home/d"] {
        fetcher.add(&url(p), vec![page(&[])]);
    }
    let sink = MemorySink::new();

    let mut scheduler = scheduler(config, &fetcher, &sink);
    let report = run(&mut scheduler).await;
    assert_eq!(report.stats.fetched, 6);

    let mut by_host: HashMap<String, Vec<Instant>> = HashMap::new();
    for (u, at) in fetcher.requests() {
        let host = Url::parse(&u).unwrap().host_str().unwrap().to_string();
        by_host.entry(host).or_default().push(at);
    }
    assert_eq!(by_host.len(), 2);
    for (host, starts) in by_host {
        for pair in starts.windows(2) {
            assert!(
                pair[1] - pair[0] >= Duration::from_millis(100),
                "{} fetched twice within the interval",
                host
            );
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_abandon_after_max_attempts() {
    let dir = TempDir::new().unwrap();
    let fetcher = ScriptedFetcher::new()
        .route(&url("/home/a"), vec![page(&["/home/flaky", "/home/c"])])
        .route(&url("/home/flaky"), vec![failure(FailureKind::Transient, 503)])
        .route(&url("/home/c"), vec![page(&["/home/flaky"])]);
    let sink = MemorySink::new();

    let mut scheduler = scheduler(config(dir.path(), &[&url("/home/a")]), &fetcher, &sink);
    let report = run(&mut scheduler).await;

    assert_eq!(report.stop_reason, StopReason::Completed);
    assert_eq!(fetcher.count(&url("/home/flaky")), 3);
    assert_eq!(report.stats.retries, 2);
    assert_eq!(report.stats.abandoned_after_retries, 1);
    assert_eq!(report.stats.fetched, 2);

    let failures = sink.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].state, TaskState::Abandoned);
    assert_eq!(failures[0].attempts, 3);

    // Backoff: 2s after the first attempt, 4s after the second
    let starts: Vec<Instant> = fetcher
        .requests()
        .into_iter()
        .filter(|(u, _)| u == &url("/home/flaky"))
        .map(|(_, at)| at)
        .collect();
    assert!(starts[1] - starts[0] >= Duration::from_secs(2));
    assert!(starts[2] - starts[1] >= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_is_not_rediscovered() {
    let dir = TempDir::new().unwrap();
    let fetcher = ScriptedFetcher::new()
        .route(&url("/home/a"), vec![page(&["/home/gone", "/home/b"])])
        .route(&url("/home/gone"), vec![failure(FailureKind::Permanent, 404)])
        .route(&url("/home/b"), vec![page(&["/home/gone", "/home/gone/"])]);
    let sink = MemorySink::new();

    let mut scheduler = scheduler(config(dir.path(), &[&url("/home/a")]), &fetcher, &sink);
    let report = run(&mut scheduler).await;

    assert_eq!(fetcher.count(&url("/home/gone")), 1);
    assert_eq!(report.stats.abandoned_permanent, 1);
    assert_eq!(report.stats.retries, 0);
    assert_eq!(report.stats.duplicates, 2);
    assert_eq!(sink.failures()[0].status_code, Some(404));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_widens_host_interval_each_time() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path(), &[&url("/home/a")]);
    config.politeness.min_interval_ms = 5_000;

    let fetcher = ScriptedFetcher::new().route(
        &url("/home/a"),
        vec![failure(FailureKind::RateLimited, 429)],
    );
    let sink = MemorySink::new();

    let mut scheduler = scheduler(config, &fetcher, &sink);
    let report = run(&mut scheduler).await;

    let starts: Vec<Instant> = fetcher.requests().into_iter().map(|(_, at)| at).collect();
    assert_eq!(starts.len(), 3);
    let first_gap = starts[1] - starts[0];
    let second_gap = starts[2] - starts[1];
    assert!(first_gap >= Duration::from_secs(10));
    assert!(second_gap >= Duration::from_secs(20));
    assert!(second_gap > first_gap);

    assert_eq!(
        scheduler.politeness().min_interval("site.test"),
        Duration::from_secs(40)
    );
    assert_eq!(report.stats.rate_limited, 3);
    assert_eq!(report.stats.abandoned_after_retries, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_task_can_recover() {
    let dir = TempDir::new().unwrap();
    let fetcher = ScriptedFetcher::new().route(
        &url("/home/a"),
        vec![failure(FailureKind::RateLimited, 429), page(&[])],
    );
    let sink = MemorySink::new();

    let mut scheduler = scheduler(config(dir.path(), &[&url("/home/a")]), &fetcher, &sink);
    let report = run(&mut scheduler).await;

    assert_eq!(report.stats.fetched, 1);
    assert_eq!(report.stats.rate_limited, 1);
    assert!(scheduler.politeness().min_interval("site.test") > Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_page_budget_stops_after_exact_count() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path(), &[&url("/home/hub")]);
    config.crawler.max_workers = 3;
    config.crawler.max_pages = Some(5);

    let children: Vec<String> = (1..50).map(|i| format!("/home/p{}", i)).collect();
    let links: Vec<&str> = children.iter().map(String::as_str).collect();
    let fetcher = ScriptedFetcher::new().route(&url("/home/hub"), vec![page(&links)]);
    for child in &children {
        fetcher.add(&url(child), vec![page(&[])]);
    }
    let sink = MemorySink::new();

    let mut scheduler = scheduler(config, &fetcher, &sink);
    let report = run(&mut scheduler).await;

    assert_eq!(report.stop_reason, StopReason::PageBudget);
    assert_eq!(report.fetched_this_run, 5);
    assert_eq!(fetcher.fetched_urls().len(), 5);
    assert_eq!(report.pending, 45);

    let checkpoint = CheckpointStore::new(dir.path().join("checkpoint.json"))
        .load(scheduler.config_fingerprint())
        .unwrap()
        .expect("final checkpoint should exist");
    assert_eq!(checkpoint.frontier.pending.len(), 45);
    assert_eq!(checkpoint.dedup.len(), 5);
    assert_eq!(checkpoint.stats.fetched, 5);
}

fn graph() -> ScriptedFetcher {
    ScriptedFetcher::new()
        .route(&url("/home/a"), vec![page(&["/home/b", "/home/c"])])
        .route(&url("/home/b"), vec![page(&["/home/d", "/home/e"])])
        .route(&url("/home/c"), vec![page(&["/home/f", "/home/a"])])
        .route(&url("/home/d"), vec![page(&[])])
        .route(&url("/home/e"), vec![page(&["/home/g", "/home/b"])])
        .route(&url("/home/f"), vec![page(&[])])
        .route(&url("/home/g"), vec![page(&[])])
}

#[tokio::test(start_paused = true)]
async fn test_resume_matches_continuous_run() {
    let continuous_dir = TempDir::new().unwrap();
    let continuous = graph();
    let mut full = scheduler(
        config(continuous_dir.path(), &[&url("/home/a")]),
        &continuous,
        &MemorySink::new(),
    );
    let full_report = run(&mut full).await;
    assert_eq!(full_report.stats.fetched, 7);
    let expected: HashSet<String> = continuous.fetched_urls().into_iter().collect();

    let dir = TempDir::new().unwrap();
    let first_fetcher = graph();
    let mut first_config = config(dir.path(), &[&url("/home/a")]);
    first_config.crawler.max_pages = Some(3);
    let mut first = scheduler(first_config, &first_fetcher, &MemorySink::new());
    let first_report = run(&mut first).await;
    assert_eq!(first_report.stop_reason, StopReason::PageBudget);
    drop(first);

    let second_fetcher = graph();
    let mut second = scheduler(
        config(dir.path(), &[&url("/home/a")]),
        &second_fetcher,
        &MemorySink::new(),
    );
    let second_report = run(&mut second).await;
    assert_eq!(second_report.stop_reason, StopReason::Completed);
    assert_eq!(second_report.stats.fetched, 7);
    assert_eq!(second_report.fetched_this_run, 4);

    let mut combined = first_fetcher.fetched_urls();
    combined.extend(second_fetcher.fetched_urls());
    let unique: HashSet<String> = combined.iter().cloned().collect();
    assert_eq!(combined.len(), unique.len(), "a page was fetched twice");
    assert_eq!(unique, expected);
}

#[tokio::test(start_paused = true)]
async fn test_late_robots_purges_queued_tasks() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path(), &[&url("/home/a")]);
    config.politeness.respect_robots = true;
    config.politeness.allowed_hosts = vec!["*.test".to_string()];

    let fetcher = ScriptedFetcher::new()
        .route(&url("/robots.txt"), vec![robots("User-agent: *\nDisallow: /home/private/")])
        .route(
            &url("/home/a"),
            vec![page(&["/home/private/x", "https://other.test/home/open", "https://other.test/home/secret"])],
        )
        .route(
            "https://other.test/robots.txt",
            vec![robots("User-agent: *\nDisallow: /home/secret")],
        )
        .route("https://other.test/home/open", vec![page(&[])]);
    let sink = MemorySink::new();

    let mut scheduler = scheduler(config, &fetcher, &sink);
    let report = run(&mut scheduler).await;

    assert_eq!(fetcher.count(&url("/home/private/x")), 0);
    assert_eq!(fetcher.count("https://other.test/home/secret"), 0);
    assert_eq!(fetcher.count("https://other.test/robots.txt"), 1);
    assert_eq!(report.stats.fetched, 2);
    assert_eq!(report.stats.disallowed, 1);
    assert_eq!(report.stats.abandoned_permanent, 1);

    let failures = sink.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].url, "https://other.test/home/secret");
    assert_eq!(failures[0].detail, "disallowed by robots discovered late");
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_robots_keeps_host_closed_until_rules_load() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path(), &[&url("/home/a")]);
    config.politeness.respect_robots = true;

    let fetcher = ScriptedFetcher::new()
        .route(
            &url("/robots.txt"),
            vec![
                failure(FailureKind::Transient, 503),
                robots("User-agent: *\nDisallow: /home/private/"),
            ],
        )
        .route(&url("/home/a"), vec![page(&["/home/private/x", "/home/b"])])
        .route(&url("/home/b"), vec![page(&[])]);
    let sink = MemorySink::new();

    let mut scheduler = scheduler(config, &fetcher, &sink);
    let report = run(&mut scheduler).await;

    let requests = fetcher.requests();
    let order: Vec<&str> = requests.iter().map(|(u, _)| u.as_str()).collect();
    assert_eq!(
        order,
        vec![
            url("/robots.txt").as_str(),
            url("/robots.txt").as_str(),
            url("/home/a").as_str(),
            url("/home/b").as_str(),
        ]
    );
    assert!(requests[1].1 - requests[0].1 >= Duration::from_secs(2));
    assert_eq!(fetcher.count(&url("/home/private/x")), 0);
    assert_eq!(report.stop_reason, StopReason::Completed);
    assert_eq!(report.stats.fetched, 2);
    assert_eq!(report.stats.disallowed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_robots_unreachable_after_max_attempts_closes_host() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path(), &[&url("/home/a")]);
    config.politeness.respect_robots = true;

    let fetcher = ScriptedFetcher::new()
        .route(&url("/robots.txt"), vec![failure(FailureKind::Transient, 503)])
        .route(&url("/home/a"), vec![page(&[])]);
    let sink = MemorySink::new();

    let mut scheduler = scheduler(config, &fetcher, &sink);
    let report = run(&mut scheduler).await;

    assert_eq!(fetcher.count(&url("/robots.txt")), 3);
    assert_eq!(fetcher.count(&url("/home/a")), 0);
    assert_eq!(report.stop_reason, StopReason::Completed);
    assert_eq!(report.stats.fetched, 0);
    assert_eq!(report.stats.abandoned_after_retries, 1);
    assert_eq!(report.pending, 0);

    let failures = sink.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].url, url("/home/a"));
    assert_eq!(failures[0].state, TaskState::Abandoned);
    assert_eq!(failures[0].detail, "robots.txt unreachable");
}

#[tokio::test(start_paused = true)]
async fn test_robots_redirect_is_followed() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path(), &[&url("/home/a")]);
    config.politeness.respect_robots = true;

    let fetcher = ScriptedFetcher::new()
        .route(
            &url("/robots.txt"),
            vec![FetchOutcome::Redirect {
                status: 301,
                target: "/en/robots.txt".to_string(),
            }],
        )
        .route(
            &url("/en/robots.txt"),
            vec![robots("User-agent: *\nDisallow: /home/private/")],
        )
        .route(&url("/home/a"), vec![page(&["/home/private/x"])]);
    let sink = MemorySink::new();

    let mut scheduler = scheduler(config, &fetcher, &sink);
    let report = run(&mut scheduler).await;

    assert_eq!(fetcher.count(&url("/robots.txt")), 1);
    assert_eq!(fetcher.count(&url("/en/robots.txt")), 1);
    assert_eq!(fetcher.count(&url("/home/private/x")), 0);
    assert_eq!(report.stats.fetched, 1);
    assert_eq!(report.stats.disallowed, 1);

    let requests = fetcher.requests();
    assert_eq!(requests.len(), 3);
    for pair in requests.windows(2) {
        let gap = pair[1].1 - pair[0].1;
        assert!(gap >= Duration::from_millis(100) && gap < Duration::from_millis(150));
    }
}

#[tokio::test(start_paused = true)]
async fn test_stop_signal_drains_in_flight_fetch() {
    let dir = TempDir::new().unwrap();
    let inner = ScriptedFetcher::new()
        .route(&url("/home/a"), vec![page(&["/home/b", "/home/c"])])
        .route(&url("/home/b"), vec![page(&[])])
        .route(&url("/home/c"), vec![page(&[])]);
    let fetcher = SlowFetcher {
        inner: inner.clone(),
        delay: Duration::from_millis(120),
    };
    let sink = MemorySink::new();

    let mut scheduler = Scheduler::new(
        config(dir.path(), &[&url("/home/a")]),
        Arc::new(fetcher),
        Box::new(HtmlPageParser::new()),
        Box::new(sink.clone()),
        false,
    )
    .unwrap();

    // a finishes at 120ms, b is in flight from 120ms to 240ms
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        let _ = tx.send(true);
    });
    let report = scheduler.run(rx).await.unwrap();

    assert_eq!(report.stop_reason, StopReason::Interrupted);
    assert_eq!(report.fetched_this_run, 2);
    assert_eq!(report.resolved, 2);
    assert_eq!(report.pending, 1);
    assert_eq!(inner.count(&url("/home/b")), 1);
    assert_eq!(inner.count(&url("/home/c")), 0);
    assert_eq!(sink.pages().len(), 2);

    let checkpoint = CheckpointStore::new(dir.path().join("checkpoint.json"))
        .load(scheduler.config_fingerprint())
        .unwrap()
        .expect("final checkpoint should exist");
    assert_eq!(checkpoint.frontier.pending.len(), 1);
    assert_eq!(checkpoint.frontier.pending[0].task.url.as_str(), url("/home/c"));
    assert_eq!(checkpoint.dedup.len(), 2);
    assert_eq!(checkpoint.stats.fetched, 2);
}

#[tokio::test(start_paused = true)]
async fn test_idle_watchdog_stops_stalled_run() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path(), &[&url("/home/a")]);
    config.politeness.respect_robots = true;
    config.crawler.max_idle_ms = 5_000;

    let mut scheduler = Scheduler::new(
        config,
        Arc::new(CrashingRobotsFetcher),
        Box::new(HtmlPageParser::new()),
        Box::new(MemorySink::new()),
        false,
    )
    .unwrap();

    let started = Instant::now();
    let report = run(&mut scheduler).await;

    assert_eq!(report.stop_reason, StopReason::IdleTimeout);
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(report.fetched_this_run, 0);
    assert_eq!(report.pending, 1);

    let checkpoint = CheckpointStore::new(dir.path().join("checkpoint.json"))
        .load(scheduler.config_fingerprint())
        .unwrap()
        .expect("final checkpoint should exist");
    assert_eq!(checkpoint.frontier.pending.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_redirect_enqueues_target() {
    let dir = TempDir::new().unwrap();
    let fetcher = ScriptedFetcher::new()
        .route(&url("/home/a"), vec![page(&["/home/old"])])
        .route(
            &url("/home/old"),
            vec![FetchOutcome::Redirect {
                status: 301,
                target: "/home/new".to_string(),
            }],
        )
        .route(&url("/home/new"), vec![page(&[])]);
    let sink = MemorySink::new();

    let mut scheduler = scheduler(config(dir.path(), &[&url("/home/a")]), &fetcher, &sink);
    let report = run(&mut scheduler).await;

    assert_eq!(report.stats.redirected, 1);
    assert_eq!(report.stats.fetched, 2);
    assert_eq!(report.resolved, 3);
    assert_eq!(fetcher.count(&url("/home/new")), 1);
}

#[tokio::test(start_paused = true)]
async fn test_storage_errors_are_counted_not_fatal() {
    let dir = TempDir::new().unwrap();
    let fetcher = ScriptedFetcher::new()
        .route(&url("/home/a"), vec![page(&["/home/b"])])
        .route(&url("/home/b"), vec![page(&[])]);
    let sink = MemorySink::new();
    sink.fail_stores();

    let mut scheduler = scheduler(config(dir.path(), &[&url("/home/a")]), &fetcher, &sink);
    let report = run(&mut scheduler).await;

    assert_eq!(report.stop_reason, StopReason::Completed);
    assert_eq!(report.stats.fetched, 2);
    assert_eq!(report.stats.storage_errors, 2);
    assert_eq!(fetcher.fetched_urls().len(), 2);
}

#[tokio::test]
async fn test_full_harvest_against_mock_server() {
    let mock_server = MockServer::start().await;
    let base = mock_server.uri();
    let html = |body: &str| {
        ResponseTemplate::new(200).set_body_raw(
            format!("<html><body><main>{}</main></body></html>", body).into_bytes(),
            "text/html",
        )
    };

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /home/private/"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/home/"))
        .respond_with(html(
            r#"<h1>Home</h1>
               <a href="/home/a">A</a>
               <a href="/home/b">B</a>
               <a href="/home/private/x">Private</a>
               <a href="/home/missing">Missing</a>
               <a href="/home/old">Old</a>"#,
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/home/a"))
        .respond_with(html("<h1>Heart</h1><p>The heart pumps blood.</p>"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/home/b"))
        .respond_with(html("<h1>Lungs</h1><p>The lungs exchange gas.</p>"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/home/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/home/b"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/home/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/home/private/x"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path(), &[&format!("{}/home/", base)]);
    config.politeness.min_interval_ms = 10;
    config.politeness.respect_robots = true;
    config.crawler.max_workers = 2;
    config.crawler.fetch_timeout_ms = 5_000;

    let (_tx, rx) = watch::channel(false);
    let report = run_harvest(config, false, rx).await.expect("harvest should run");

    assert_eq!(report.stop_reason, StopReason::Completed);
    assert_eq!(report.stats.fetched, 3);
    assert_eq!(report.stats.redirected, 1);
    assert_eq!(report.stats.abandoned_permanent, 1);
    assert_eq!(report.stats.disallowed, 1);

    let sink = SqliteSink::new(&dir.path().join("harvest.db")).unwrap();
    assert_eq!(sink.count_articles().unwrap(), 3);
    assert_eq!(sink.count_failures().unwrap(), 1);
    assert_eq!(
        sink.article_title(&format!("{}/home/a", base)).unwrap(),
        Some(Some("Heart".to_string()))
    );
    assert!(dir.path().join("checkpoint.json").exists());
}
