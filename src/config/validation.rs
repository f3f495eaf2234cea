use crate::config::types::{
    CheckpointConfig, Config, CrawlerConfig, OutputConfig, PolitenessConfig, RetryConfig,
    UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_politeness_config(&config.politeness)?;
    validate_retry_config(&config.retry)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_checkpoint_config(&config.checkpoint)?;
    validate_output_config(&config.output)?;
    config.seed.resolve_entry_urls()?;
    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_workers < 1 || config.max_workers > 64 {
        return Err(ConfigError::Validation(format!(
            "max-workers must be between 1 and 64, got {}",
            config.max_workers
        )));
    }

    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max-pages must be >= 1 when set".to_string(),
        ));
    }

    if config.fetch_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "fetch-timeout-ms must be >= 100ms, got {}ms",
            config.fetch_timeout_ms
        )));
    }

    if config.max_idle_ms == 0 {
        return Err(ConfigError::Validation(
            "max-idle-ms must be > 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_politeness_config(config: &PolitenessConfig) -> Result<(), ConfigError> {
    if config.max_interval_ms < config.min_interval_ms {
        return Err(ConfigError::Validation(format!(
            "max-interval-ms ({}) must be >= min-interval-ms ({})",
            config.max_interval_ms, config.min_interval_ms
        )));
    }

    if !config.rate_limit_factor.is_finite() || config.rate_limit_factor <= 1.0 {
        return Err(ConfigError::Validation(format!(
            "rate-limit-factor must be > 1.0, got {}",
            config.rate_limit_factor
        )));
    }

    for host in &config.allowed_hosts {
        validate_domain_pattern(host)?;
    }

    for (host, overrides) in &config.hosts {
        let name = match host.rsplit_once(':') {
            Some((name, port)) if port.parse::<u16>().is_ok() => name,
            _ => host.as_str(),
        };
        validate_domain_pattern(name)?;
        if overrides.min_interval_ms > config.max_interval_ms {
            return Err(ConfigError::Validation(format!(
                "min-interval-ms of host '{}' ({}) must be <= max-interval-ms ({})",
                host, overrides.min_interval_ms, config.max_interval_ms
            )));
        }
    }

    if config.disallow.iter().any(|p| p.trim().is_empty()) {
        return Err(ConfigError::InvalidPattern(
            "disallow patterns cannot be empty".to_string(),
        ));
    }

    if config.skip_patterns.iter().any(|p| p.trim().is_empty()) {
        return Err(ConfigError::InvalidPattern(
            "skip patterns cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "max-attempts must be >= 1".to_string(),
        ));
    }

    if config.backoff_base_ms == 0 {
        return Err(ConfigError::Validation(
            "backoff-base-ms must be > 0".to_string(),
        ));
    }

    if config.backoff_cap_ms < config.backoff_base_ms {
        return Err(ConfigError::Validation(format!(
            "backoff-cap-ms ({}) must be >= backoff-base-ms ({})",
            config.backoff_cap_ms, config.backoff_base_ms
        )));
    }

    if config.jitter_percent > 100 {
        return Err(ConfigError::Validation(format!(
            "jitter-percent must be <= 100, got {}",
            config.jitter_percent
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler-name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler-name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_checkpoint_config(config: &CheckpointConfig) -> Result<(), ConfigError> {
    if config.path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "checkpoint path cannot be empty".to_string(),
        ));
    }

    if config.interval_pages < 1 || config.interval_secs < 1 {
        return Err(ConfigError::Validation(
            "checkpoint intervals must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates a host pattern (supports a leading `*.` wildcard)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    let domain = pattern.strip_prefix("*.").unwrap_or(pattern);

    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Host pattern cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
        || domain.contains("..")
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Host '{}' has misplaced dots or hyphens",
            domain
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let (local, domain) = email.split_once('@').ok_or_else(|| {
        ConfigError::Validation(format!("Invalid email format: '{}'", email))
    })?;

    if local.is_empty() || domain.is_empty() || domain.contains('@') || !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    Ok(())
}
