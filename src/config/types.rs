use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for med-harvest
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub politeness: PolitenessConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub user_agent: UserAgentConfig,
    pub checkpoint: CheckpointConfig,
    pub output: OutputConfig,
    pub seed: SeedConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlerConfig {
    /// Number of concurrent fetch workers
    pub max_workers: u32,

    /// Maximum link depth from the seed URLs
    pub max_depth: u32,

    /// Optional ceiling on successful fetches for one run
    pub max_pages: Option<u64>,

    /// Timeout for a single fetch attempt (milliseconds)
    pub fetch_timeout_ms: u64,

    /// How long the scheduler may sit without any progress before the run is declared complete
    pub max_idle_ms: u64,

    /// Priority penalty for URLs outside the seeded manual version
    pub off_version_penalty: u32,
}

impl CrawlerConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn max_idle(&self) -> Duration {
        Duration::from_millis(self.max_idle_ms)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_workers: 3,
            max_depth: 20,
            max_pages: None,
            fetch_timeout_ms: 30_000,
            max_idle_ms: 60_000,
            off_version_penalty: 50,
        }
    }
}

/// Site politeness policy
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PolitenessConfig {
    /// Minimum time between two requests to the same host (milliseconds)
    pub min_interval_ms: u64,

    /// Upper bound of the random delay added on top of the interval (milliseconds)
    pub interval_jitter_ms: u64,

    /// Ceiling for a host interval widened by rate limiting (milliseconds)
    pub max_interval_ms: u64,

    /// Multiplier applied to a host interval on every rate-limit signal
    pub rate_limit_factor: f64,

    /// Fetch and honor robots.txt before the first page of each host
    pub respect_robots: bool,

    /// Hosts that may be crawled; defaults to the hosts of the seed URLs
    pub allowed_hosts: Vec<String>,

    /// Path fragments that are never crawled
    pub disallow: Vec<String>,

    /// URL fragments marking low-value links (login, search...)
    pub skip_patterns: Vec<String>,

    /// Per-host overrides, keyed by host name or `*.domain` pattern
    pub hosts: BTreeMap<String, HostPolitenessConfig>,
}

/// Politeness settings for one host (`[politeness.hosts."<host>"]`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HostPolitenessConfig {
    /// Minimum time between two requests to this host (milliseconds)
    pub min_interval_ms: u64,
}

impl PolitenessConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub fn interval_jitter(&self) -> Duration {
        Duration::from_millis(self.interval_jitter_ms)
    }

    /// Starting interval of a host
    ///
    /// An exact host entry wins over a wildcard entry; hosts without an entry use
    /// `min-interval-ms`. A port in `host` is ignored unless an entry names it.
    pub fn interval_for(&self, host: &str) -> Duration {
        let name = strip_port(host);
        let exact = self
            .hosts
            .get(host)
            .or_else(|| self.hosts.get(name))
            .or_else(|| {
                self.hosts
                    .iter()
                    .find(|(pattern, _)| {
                        pattern.starts_with("*.") && crate::url::matches_wildcard(pattern, name)
                    })
                    .map(|(_, config)| config)
            });
        exact.map_or(self.min_interval(), |config| {
            Duration::from_millis(config.min_interval_ms)
        })
    }
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            name
        }
        _ => host,
    }
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 5_000,
            interval_jitter_ms: 0,
            max_interval_ms: 300_000,
            rate_limit_factor: 2.0,
            respect_robots: true,
            allowed_hosts: Vec::new(),
            disallow: [
                "/sitecore/",
                "/custom/",
                "/news/external/",
                "/multimedia/zk/",
                "/downloadtextfile",
                "/pagerevalidation",
                "/bigqueryexport",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            skip_patterns: ["login", "register", "search?", "subscribe"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            hosts: BTreeMap::new(),
        }
    }
}

/// Retry and backoff policy
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RetryConfig {
    /// Attempts after which a failing task is abandoned
    pub max_attempts: u32,

    /// Base of the exponential backoff (milliseconds)
    pub backoff_base_ms: u64,

    /// Ceiling of the exponential backoff (milliseconds)
    pub backoff_cap_ms: u64,

    /// Random jitter added to a backoff delay, as a percentage of it
    pub jitter_percent: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 60_000,
            jitter_percent: 0,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,

    /// Email address for crawler-related contact
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the User-Agent header: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Checkpoint persistence configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CheckpointConfig {
    /// Path of the checkpoint file
    pub path: PathBuf,

    /// Persist after this many resolved tasks
    #[serde(default = "default_interval_pages")]
    pub interval_pages: u64,

    /// Persist after this many seconds, whichever comes first
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_pages() -> u64 {
    100
}

fn default_interval_secs() -> u64 {
    300
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite database receiving parsed articles
    pub database_path: PathBuf,
}

/// What to crawl: manual version, language and entry points
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SeedConfig {
    pub language: Language,
    pub version: ManualVersion,

    /// Explicit entry URLs; the built-in catalog is used when empty
    #[serde(default)]
    pub entry_urls: Vec<String>,
}

/// Language edition of the manual
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Zh,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Zh => "zh",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audience edition of the manual
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManualVersion {
    Home,
    Professional,
    Veterinary,
}

impl ManualVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Professional => "professional",
            Self::Veterinary => "veterinary",
        }
    }
}

impl fmt::Display for ManualVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
