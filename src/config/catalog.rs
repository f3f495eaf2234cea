//! Built-in entry points of the reference manuals
//!
//! Each (version, language) edition lives under its own host and path prefix. The home
//! editions also seed their health-topics index, and the Chinese site seeds its root so
//! the top-level navigation is not missed.

use crate::config::types::{Language, ManualVersion, SeedConfig};
use crate::url::normalize_url;
use crate::ConfigError;
use url::Url;

/// Returns the built-in entry URLs for an edition, or `None` if it does not exist
pub fn catalog_entry_urls(version: ManualVersion, language: Language) -> Option<&'static [&'static str]> {
    match (version, language) {
        (ManualVersion::Home, Language::En) => Some(&[
            "https://www.msdmanuals.com/home/",
            "https://www.msdmanuals.com/home/health-topics/",
        ]),
        (ManualVersion::Home, Language::Zh) => Some(&[
            "https://www.msdmanuals.cn/home/",
            "https://www.msdmanuals.cn/home/health-topics/",
            "https://www.msdmanuals.cn/",
        ]),
        (ManualVersion::Professional, Language::En) => {
            Some(&["https://www.msdmanuals.com/professional/"])
        }
        (ManualVersion::Professional, Language::Zh) => {
            Some(&["https://www.msdmanuals.cn/professional/"])
        }
        (ManualVersion::Veterinary, Language::En) => Some(&["https://www.msdvetmanual.com/"]),
        (ManualVersion::Veterinary, Language::Zh) => None,
    }
}

impl SeedConfig {
    /// Resolves the entry URLs of this seed, normalized
    ///
    /// Explicit `entry-urls` win over the catalog. An edition missing from the catalog
    /// with no explicit entry URLs is a configuration error.
    pub fn resolve_entry_urls(&self) -> Result<Vec<Url>, ConfigError> {
        let raw: Vec<&str> = if self.entry_urls.is_empty() {
            catalog_entry_urls(self.version, self.language)
                .ok_or_else(|| ConfigError::UnsupportedSeed {
                    language: self.language.to_string(),
                    version: self.version.to_string(),
                })?
                .to_vec()
        } else {
            self.entry_urls.iter().map(String::as_str).collect()
        };

        let mut urls: Vec<Url> = Vec::with_capacity(raw.len());
        for entry in raw {
            let url = normalize_url(entry)
                .map_err(|e| ConfigError::InvalidUrl(format!("Invalid entry URL '{}': {}", entry, e)))?;
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
        Ok(urls)
    }
}
