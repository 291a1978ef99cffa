use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use regex::{Captures, Regex};
use sha2::{Digest, Sha256};
use std::path::Path;

/// `$env{NAME}` references inside the configuration file
const ENV_REFERENCE: &str = r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}";

/// Loads and parses a configuration file from the given path
///
/// `$env{NAME}` references are replaced with the value of the environment
/// variable before parsing, so connection parameters such as the database
/// path can be supplied by the environment.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, expand, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use spimex_harvest::config::load_config;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// println!("Workers: {}", config.crawler.workers);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses configuration text (after environment expansion) and validates it
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let expanded = expand_env_vars(content)?;
    check_unexpanded_vars(&expanded)?;

    let config: Config = toml::from_str(&expanded)?;

    validate(&config)?;

    Ok(config)
}

/// Expands `$env{NAME}` references; unset variables are left in place
pub fn expand_env_vars(text: &str) -> Result<String, ConfigError> {
    let re = env_reference()?;

    let expanded = re.replace_all(text, |caps: &Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });

    Ok(expanded.into_owned())
}

/// Fails with the list of referenced variables that are still unexpanded
fn check_unexpanded_vars(text: &str) -> Result<(), ConfigError> {
    let re = env_reference()?;

    let mut missing: Vec<String> = re
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    missing.sort();
    missing.dedup();

    Err(ConfigError::MissingEnv(missing.join(", ")))
}

fn env_reference() -> Result<Regex, ConfigError> {
    Regex::new(ENV_REFERENCE).map_err(|e| ConfigError::InvalidPattern(e.to_string()))
}

/// Computes a SHA-256 hash of the configuration file content
///
/// The hash is recorded on each harvest run so runs made with different
/// settings can be told apart.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(hash_content(&content))
}

/// Hex-encoded SHA-256 of arbitrary configuration text
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
