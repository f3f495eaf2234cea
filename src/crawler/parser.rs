//! Page parsing seam and the default HTML parser
//!
//! The scheduler only needs two things from a parsed page: an optional record for the
//! storage sink and the outgoing links. Medical-content extraction rules belong to the
//! parser implementation, not to the crawl engine.

use crate::storage::PageRecord;
use crate::url::{detect_language, detect_version};
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use thiserror::Error;
use url::Url;

/// Errors that can occur while parsing a page
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Empty response body")]
    EmptyBody,

    #[error("Malformed document: {0}")]
    Malformed(String),
}

/// What the parser extracted from a fetched page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// Record to persist; `None` for pages without content worth storing
    pub record: Option<PageRecord>,

    /// Absolute URLs found on the page, not yet normalized
    pub links: Vec<String>,
}

/// Turns fetched bytes into a record and links
pub trait PageParser: Send {
    fn parse(
        &self,
        url: &Url,
        body: &[u8],
        headers: &HashMap<String, String>,
    ) -> Result<ParsedPage, ParseError>;
}

/// Default parser built on scraper
///
/// # Extraction Rules
///
/// - Title from `<h1>`, falling back to `<title>`
/// - Text of the first `main`, `article`, `#content` or `body` element, without
///   `script`, `style` and `noscript` text, whitespace collapsed
/// - Links from `<a href>` (except `download` links) and `<link rel="canonical">`;
///   `javascript:`, `mailto:`, `tel:`, `data:` and fragment-only links are skipped
/// - Language and manual version detected from the URL
///
/// Responses whose Content-Type is not HTML produce neither a record nor links.
#[derive(Debug, Clone, Default)]
pub struct HtmlPageParser;

impl HtmlPageParser {
    pub fn new() -> Self {
        Self
    }
}

impl PageParser for HtmlPageParser {
    fn parse(
        &self,
        url: &Url,
        body: &[u8],
        headers: &HashMap<String, String>,
    ) -> Result<ParsedPage, ParseError> {
        if let Some(content_type) = headers.get("content-type") {
            if !content_type.to_ascii_lowercase().contains("html") {
                tracing::debug!("Skipping non-HTML {} ({})", url, content_type);
                return Ok(ParsedPage::default());
            }
        }

        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(ParseError::EmptyBody);
        }

        let html = String::from_utf8_lossy(body);
        let document = Html::parse_document(&html);

        let links = extract_links(&document, url)?;
        let content = extract_main_text(&document);
        let record = (!content.is_empty()).then(|| PageRecord {
            url: url.to_string(),
            title: extract_title(&document),
            content_hash: hex::encode(Sha256::digest(content.as_bytes())),
            word_count: word_count(&content),
            language: detect_language(url),
            version: detect_version(url),
            depth: 0,
            discovered_from: None,
            fetched_at: Utc::now(),
            content,
        });

        Ok(ParsedPage { record, links })
    }
}

fn selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError::Malformed(format!("selector '{}': {:?}", css, e)))
}

fn extract_title(document: &Html) -> Option<String> {
    ["h1", "title"].iter().find_map(|css| {
        let sel = Selector::parse(css).ok()?;
        document
            .select(&sel)
            .next()
            .map(|element| collapse_whitespace(&element.text().collect::<String>()))
            .filter(|s| !s.is_empty())
    })
}

fn extract_main_text(document: &Html) -> String {
    ["main", "article", "#content", "body"]
        .iter()
        .filter_map(|css| Selector::parse(css).ok())
        .find_map(|sel| document.select(&sel).next())
        .map(visible_text)
        .unwrap_or_default()
}

/// Text under an element, ignoring script-like elements
fn visible_text(root: ElementRef) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map_or(false, |e| matches!(e.name(), "script" | "style" | "noscript"))
        });
        let text = text.trim();
        if !hidden && !text.is_empty() {
            parts.push(text);
        }
    }
    collapse_whitespace(&parts.join(" "))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Counts words; every CJK character counts as one word
fn word_count(text: &str) -> u32 {
    text.split_whitespace()
        .map(|token| {
            let cjk = token.chars().filter(|c| is_cjk(*c)).count() as u32;
            if cjk > 0 {
                cjk
            } else {
                1
            }
        })
        .sum()
}

fn is_cjk(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' | '\u{F900}'..='\u{FAFF}')
}

fn extract_links(document: &Html, base_url: &Url) -> Result<Vec<String>, ParseError> {
    let mut links = Vec::new();

    for element in document.select(&selector("a[href]")?) {
        if element.value().attr("download").is_some() {
            continue;
        }
        if let Some(link) = element.value().attr("href").and_then(|h| resolve_link(h, base_url)) {
            links.push(link);
        }
    }

    for element in document.select(&selector("link[rel='canonical'][href]")?) {
        if let Some(link) = element.value().attr("href").and_then(|h| resolve_link(h, base_url)) {
            links.push(link);
        }
    }

    Ok(links)
}

/// Resolves an href against the page URL, rejecting non-navigational links
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    base_url
        .join(href)
        .ok()
        .filter(|u| u.scheme() == "http" || u.scheme() == "https")
        .map(|u| u.to_string())
}
