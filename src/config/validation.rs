use crate::cache::parse_reset_time;
use crate::config::types::{CacheConfig, Config, CrawlerConfig, StorageConfig, UserAgentConfig};
use crate::ConfigError;
use regex::Regex;
use url::Url;

/// Upper bound on download workers
const MAX_WORKERS: usize = 32;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_storage_config(&config.storage)?;
    validate_cache_config(&config.cache)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > MAX_WORKERS {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and {}, got {}",
            MAX_WORKERS, config.workers
        )));
    }

    if config.consumer_timeout < 100 {
        return Err(ConfigError::Validation(format!(
            "consumer_timeout must be >= 100ms, got {}ms",
            config.consumer_timeout
        )));
    }

    if config.request_timeout < 1 {
        return Err(ConfigError::Validation(
            "request_timeout must be at least 1 second".to_string(),
        ));
    }

    let base_url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if base_url.scheme() != "http" && base_url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' must use HTTP or HTTPS",
            config.base_url
        )));
    }

    if !config.page_param.contains("{}") {
        return Err(ConfigError::Validation(format!(
            "page_param '{}' must contain a '{{}}' placeholder for the page number",
            config.page_param
        )));
    }

    if config.link_class.split_whitespace().next().is_none() {
        return Err(ConfigError::Validation(
            "link_class cannot be empty".to_string(),
        ));
    }

    let pattern = Regex::new(&config.link_pattern).map_err(|e| {
        ConfigError::InvalidPattern(format!("Invalid link_pattern '{}': {}", config.link_pattern, e))
    })?;

    // Group 0 is the whole match
    if pattern.captures_len() < 2 {
        return Err(ConfigError::InvalidPattern(format!(
            "link_pattern '{}' must capture the date token in a group",
            config.link_pattern
        )));
    }

    if config.date_format.trim().is_empty() {
        return Err(ConfigError::Validation(
            "date_format cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates cache configuration
fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    parse_reset_time(&config.reset_time).map_err(|_| {
        ConfigError::Validation(format!(
            "reset_time must be HH:MM, got '{}'",
            config.reset_time
        ))
    })?;

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
