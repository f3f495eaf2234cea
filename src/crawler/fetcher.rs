//! HTTP fetcher
//!
//! A fetcher performs exactly one network operation per call and reports what happened
//! as a [`FetchOutcome`]. It never retries and never follows redirects; both are
//! scheduling decisions.

use crate::config::UserAgentConfig;
use crate::retry::{classify_status, FailureKind};
use crate::state::CrawlTask;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use reqwest::{redirect::Policy, Client};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// What a single fetch attempt produced
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// A 2xx response
    Success {
        status: u16,
        body: Vec<u8>,
        /// Response headers with lowercase names
        headers: HashMap<String, String>,
    },

    /// A 3xx response; `target` is the raw Location value
    Redirect { status: u16, target: String },

    Failure {
        kind: FailureKind,
        /// HTTP status when the server answered
        status: Option<u16>,
        detail: String,
    },
}

impl FetchOutcome {
    pub fn failure(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            status: None,
            detail: detail.into(),
        }
    }
}

/// A task back from a worker with the outcome of its attempt
#[derive(Debug)]
pub struct FetchResult {
    pub task: CrawlTask,
    pub outcome: FetchOutcome,
    pub duration: Duration,
}

/// One network operation against a URL
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> FetchOutcome;
}

/// Fetcher backed by a reqwest client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Builds the fetcher
    ///
    /// # Arguments
    ///
    /// * `user_agent` - Identification sent with every request
    /// * `timeout` - Whole-request timeout
    ///
    /// # Example
    ///
    /// ```no_run
    /// use med_harvest::config::UserAgentConfig;
    /// use med_harvest::crawler::HttpFetcher;
    /// use std::time::Duration;
    ///
    /// let config = UserAgentConfig {
    ///     crawler_name: "MedHarvest".to_string(),
    ///     crawler_version: "0.1".to_string(),
    ///     contact_url: "https://example.com/about".to_string(),
    ///     contact_email: "admin@example.com".to_string(),
    /// };
    ///
    /// let fetcher = HttpFetcher::new(&config, Duration::from_secs(30)).unwrap();
    /// ```
    pub fn new(user_agent: &UserAgentConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent.header_value())
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .redirect(Policy::none())
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> FetchOutcome {
        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => return classify_request_error(&e),
        };

        let status = response.status().as_u16();

        if response.status().is_redirection() {
            return match response.headers().get(LOCATION).and_then(|v| v.to_str().ok()) {
                Some(target) => FetchOutcome::Redirect {
                    status,
                    target: target.to_string(),
                },
                None => FetchOutcome::Failure {
                    kind: FailureKind::Permanent,
                    status: Some(status),
                    detail: format!("HTTP {} without Location", status),
                },
            };
        }

        if let Some(kind) = classify_status(status) {
            let kind = detect_soft_block(status, response.headers()).unwrap_or(kind);
            return FetchOutcome::Failure {
                kind,
                status: Some(status),
                detail: format!("HTTP {}", status),
            };
        }

        let headers = lowercase_headers(response.headers());
        match response.bytes().await {
            Ok(body) => FetchOutcome::Success {
                status,
                body: body.to_vec(),
                headers,
            },
            Err(e) => FetchOutcome::failure(
                FailureKind::Transient,
                format!("Failed reading body: {}", e),
            ),
        }
    }
}

/// A 403 carrying Retry-After is a throttle in disguise
fn detect_soft_block(status: u16, headers: &HeaderMap) -> Option<FailureKind> {
    (status == 403 && headers.contains_key(RETRY_AFTER)).then_some(FailureKind::RateLimited)
}

fn classify_request_error(e: &reqwest::Error) -> FetchOutcome {
    if e.is_builder() {
        FetchOutcome::failure(FailureKind::Permanent, format!("Invalid request: {}", e))
    } else if e.is_timeout() {
        FetchOutcome::failure(FailureKind::Transient, "Request timeout")
    } else if e.is_connect() {
        FetchOutcome::failure(FailureKind::Transient, format!("Connection failed: {}", e))
    } else {
        FetchOutcome::failure(FailureKind::Transient, e.to_string())
    }
}

fn lowercase_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect()
}
