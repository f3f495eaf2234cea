//! Robots.txt handling module
//!
//! robots.txt is fetched through the same fetcher and politeness slot as pages; this
//! module decides what a fetch outcome means for the host.

mod parser;

pub use parser::ParsedRobots;

use crate::crawler::FetchOutcome;
use crate::retry::FailureKind;
use url::Url;

/// Redirect hops followed before robots.txt is treated as missing
pub const MAX_ROBOTS_REDIRECTS: u8 = 5;

/// What a robots.txt fetch tells the scheduler to do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RobotsVerdict {
    /// Rules are known; install them
    Rules(ParsedRobots),
    /// Fetch robots.txt again from this address
    Follow(Url),
    /// The server could not answer; the host stays closed and is retried later
    Unreachable,
}

/// Interprets the outcome of fetching a host's robots.txt
///
/// # Arguments
///
/// * `requested` - Address that was fetched, used to resolve relative redirects
/// * `outcome` - What the fetcher returned
/// * `hops` - Redirects already followed to reach `requested`
///
/// A 2xx body is parsed. A 4xx means there are no rules. A 5xx, 429, timeout or
/// connection error leaves the host closed. Redirects are followed up to
/// [`MAX_ROBOTS_REDIRECTS`] hops, after which the file counts as missing.
pub fn interpret_robots(requested: &Url, outcome: &FetchOutcome, hops: u8) -> RobotsVerdict {
    match outcome {
        FetchOutcome::Success { body, .. } => {
            RobotsVerdict::Rules(ParsedRobots::from_content(&String::from_utf8_lossy(body)))
        }
        FetchOutcome::Redirect { target, .. } => match requested.join(target) {
            Ok(next) if hops < MAX_ROBOTS_REDIRECTS && next != *requested => {
                RobotsVerdict::Follow(next)
            }
            _ => RobotsVerdict::Rules(ParsedRobots::allow_all()),
        },
        FetchOutcome::Failure {
            kind: FailureKind::Permanent,
            ..
        } => RobotsVerdict::Rules(ParsedRobots::allow_all()),
        FetchOutcome::Failure { .. } => RobotsVerdict::Unreachable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn requested() -> Url {
        Url::parse("https://site.test/robots.txt").unwrap()
    }

    fn failure(kind: FailureKind, status: Option<u16>) -> FetchOutcome {
        FetchOutcome::Failure {
            kind,
            status,
            detail: "failed".to_string(),
        }
    }

    #[test]
    fn test_success_body_is_parsed() {
        let outcome = FetchOutcome::Success {
            status: 200,
            body: b"User-agent: *\nDisallow: /sitecore/".to_vec(),
            headers: HashMap::new(),
        };
        let RobotsVerdict::Rules(rules) = interpret_robots(&requested(), &outcome, 0) else {
            panic!("expected rules");
        };
        assert!(!rules.is_allowed("https://site.test/sitecore/a", "MedHarvest"));
    }

    #[test]
    fn test_missing_robots_allows_all() {
        let outcome = failure(FailureKind::Permanent, Some(404));
        assert_eq!(
            interpret_robots(&requested(), &outcome, 0),
            RobotsVerdict::Rules(ParsedRobots::allow_all())
        );
    }

    #[test]
    fn test_server_errors_are_unreachable() {
        for outcome in [
            failure(FailureKind::Transient, Some(503)),
            failure(FailureKind::Transient, None),
            failure(FailureKind::RateLimited, Some(429)),
        ] {
            assert_eq!(
                interpret_robots(&requested(), &outcome, 0),
                RobotsVerdict::Unreachable
            );
        }
    }

    #[test]
    fn test_redirect_followed_until_hop_limit() {
        let outcome = FetchOutcome::Redirect {
            status: 301,
            target: "/en/robots.txt".to_string(),
        };
        assert_eq!(
            interpret_robots(&requested(), &outcome, 0),
            RobotsVerdict::Follow(Url::parse("https://site.test/en/robots.txt").unwrap())
        );
        assert_eq!(
            interpret_robots(&requested(), &outcome, MAX_ROBOTS_REDIRECTS),
            RobotsVerdict::Rules(ParsedRobots::allow_all())
        );
    }

    #[test]
    fn test_self_redirect_counts_as_missing() {
        let outcome = FetchOutcome::Redirect {
            status: 302,
            target: "https://site.test/robots.txt".to_string(),
        };
        assert_eq!(
            interpret_robots(&requested(), &outcome, 0),
            RobotsVerdict::Rules(ParsedRobots::allow_all())
        );
    }
}
