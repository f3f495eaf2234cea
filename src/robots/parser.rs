//! robots.txt rules backed by the robotstxt crate

use robotstxt::DefaultMatcher;
use std::time::Duration;

/// Rules of one host's robots.txt
///
/// The raw body is kept so the rules can be written to a checkpoint and rebuilt
/// verbatim on resume. An empty body allows everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRobots {
    body: String,
}

impl ParsedRobots {
    /// Wraps a robots.txt body
    pub fn from_content(content: &str) -> Self {
        Self {
            body: content.to_string(),
        }
    }

    /// Rules that allow every path, used when a host has no usable robots.txt
    pub fn allow_all() -> Self {
        Self { body: String::new() }
    }

    /// Rules that close the whole host, used when its robots.txt stays unreachable
    pub fn disallow_all() -> Self {
        Self::from_content("User-agent: *\nDisallow: /")
    }

    /// Raw robots.txt body
    pub fn content(&self) -> &str {
        &self.body
    }

    pub fn is_allow_all(&self) -> bool {
        self.body.trim().is_empty()
    }

    /// Checks if a URL may be fetched by the given agent token
    pub fn is_allowed(&self, url: &str, agent: &str) -> bool {
        if self.is_allow_all() {
            return true;
        }
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.body, agent, url)
    }

    /// Crawl-delay requested for an agent
    ///
    /// A group naming the agent wins over the `*` group. Unparseable or negative values
    /// are ignored.
    pub fn crawl_delay(&self, agent: &str) -> Option<Duration> {
        if self.is_allow_all() {
            return None;
        }

        let agent = agent.to_lowercase();
        let mut group: Vec<String> = Vec::new();
        let mut in_rules = false;
        let mut wildcard_delay = None;
        let mut agent_delay = None;

        for line in self.body.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    // A user-agent line after rules opens a new group
                    if in_rules {
                        group.clear();
                        in_rules = false;
                    }
                    group.push(value.to_lowercase());
                }
                "crawl-delay" => {
                    in_rules = true;
                    let Some(delay) = value
                        .parse::<f64>()
                        .ok()
                        .filter(|d| d.is_finite() && *d >= 0.0)
                        .map(Duration::from_secs_f64)
                    else {
                        continue;
                    };
                    if group.iter().any(|ua| ua != "*" && agent.contains(ua.as_str())) {
                        agent_delay = Some(delay);
                    } else if group.iter().any(|ua| ua == "*") {
                        wildcard_delay = Some(delay);
                    }
                }
                _ => in_rules = true,
            }
        }

        agent_delay.or(wildcard_delay)
    }
}
