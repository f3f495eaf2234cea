use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;
use url::Url;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use med_harvest::config::load_config;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// println!("Workers: {}", config.crawler.max_workers);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

impl Config {
    /// Hosts the crawl may touch: the configured allow-list, or the seed hosts when empty
    pub fn effective_allowed_hosts(&self, seeds: &[Url]) -> Vec<String> {
        let mut hosts: Vec<String> = if self.politeness.allowed_hosts.is_empty() {
            seeds
                .iter()
                .filter_map(|u| u.host_str().map(|h| h.to_lowercase()))
                .collect()
        } else {
            self.politeness
                .allowed_hosts
                .iter()
                .map(|h| h.to_lowercase())
                .collect()
        };
        hosts.sort();
        hosts.dedup();
        hosts
    }
}

/// Computes the crawl fingerprint of a configuration
///
/// Only the fields that define which URLs belong to the crawl are hashed: edition,
/// entry URLs, host allow-list, path filters and depth limit. Timing and worker settings
/// can change between runs without invalidating a checkpoint.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 digest
/// * `Err(ConfigError)` - The seed section could not be resolved
pub fn crawl_fingerprint(config: &Config) -> Result<String, ConfigError> {
    let seeds = config.seed.resolve_entry_urls()?;

    let mut hasher = Sha256::new();
    let mut field = |name: &str, value: &str| {
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    };

    field("language", config.seed.language.as_str());
    field("version", config.seed.version.as_str());

    let mut seed_strings: Vec<&str> = seeds.iter().map(Url::as_str).collect();
    seed_strings.sort_unstable();
    for seed in seed_strings {
        field("seed", seed);
    }
    for host in config.effective_allowed_hosts(&seeds) {
        field("host", &host);
    }

    let mut disallow = config.politeness.disallow.clone();
    disallow.sort();
    for pattern in &disallow {
        field("disallow", pattern);
    }
    let mut skip = config.politeness.skip_patterns.clone();
    skip.sort();
    for pattern in &skip {
        field("skip", pattern);
    }
    field("max-depth", &config.crawler.max_depth.to_string());

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    const VALID: &str = r#"
[crawler]
max-workers = 2
max-pages = 50

[politeness]
min-interval-ms = 5000

[user-agent]
crawler-name = "TestHarvester"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[checkpoint]
path = "./state/checkpoint.json"

[output]
database-path = "./harvest.db"

[seed]
language = "en"
version = "home"
"#;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.max_workers, 2);
        assert_eq!(config.crawler.max_pages, Some(50));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.checkpoint.interval_pages, 100);
        assert!(config.politeness.respect_robots);
        assert!(config
            .politeness
            .disallow
            .contains(&"/sitecore/".to_string()));
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/harvest.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let content = VALID.replace("max-workers = 2", "max-workers = 0");
        let result = parse_config(&content);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_per_host_intervals() {
        let content = VALID.replace(
            "min-interval-ms = 5000\n",
            "min-interval-ms = 5000\n\n\
             [politeness.hosts.\"*.msdmanuals.cn\"]\nmin-interval-ms = 6000\n\n\
             [politeness.hosts.\"www.msdvetmanual.com\"]\nmin-interval-ms = 7000\n",
        );
        let politeness = parse_config(&content).unwrap().politeness;

        assert_eq!(politeness.hosts.len(), 2);
        assert_eq!(politeness.interval_for("www.msdmanuals.com"), Duration::from_secs(5));
        assert_eq!(politeness.interval_for("www.msdmanuals.cn"), Duration::from_secs(6));
        assert_eq!(politeness.interval_for("msdmanuals.cn:8443"), Duration::from_secs(6));
        assert_eq!(politeness.interval_for("www.msdvetmanual.com"), Duration::from_secs(7));
    }

    #[test]
    fn test_default_allowed_hosts_come_from_seeds() {
        let config = parse_config(VALID).unwrap();
        let seeds = config.seed.resolve_entry_urls().unwrap();
        assert_eq!(
            config.effective_allowed_hosts(&seeds),
            vec!["www.msdmanuals.com".to_string()]
        );
    }

    #[test]
    fn test_fingerprint_ignores_timing_settings() {
        let a = parse_config(VALID).unwrap();
        let b = parse_config(&VALID.replace("min-interval-ms = 5000", "min-interval-ms = 9000"))
            .unwrap();
        assert_eq!(crawl_fingerprint(&a).unwrap(), crawl_fingerprint(&b).unwrap());
        assert_eq!(crawl_fingerprint(&a).unwrap().len(), 64);
    }

    #[test]
    fn test_fingerprint_tracks_seed_edition() {
        let a = parse_config(VALID).unwrap();
        let b = parse_config(&VALID.replace("version = \"home\"", "version = \"professional\""))
            .unwrap();
        assert_ne!(crawl_fingerprint(&a).unwrap(), crawl_fingerprint(&b).unwrap());
    }
}
