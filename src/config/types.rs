use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Spimex-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Listing discovery and download behavior
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Listing page base URL; report hrefs are resolved against it
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    /// Pagination suffix; `{}` is replaced with the page number
    #[serde(rename = "page-param", default = "default_page_param")]
    pub page_param: String,

    /// Class attribute of report anchors (space separated, all required)
    #[serde(rename = "link-class", default = "default_link_class")]
    pub link_class: String,

    /// Regex applied to hrefs; the first capture group is the date token
    #[serde(rename = "link-pattern", default = "default_link_pattern")]
    pub link_pattern: String,

    /// chrono format of the date token
    #[serde(rename = "date-format", default = "default_date_format")]
    pub date_format: String,

    /// Static lower bound used when the database holds no bulletins yet
    #[serde(rename = "cutoff-date")]
    pub cutoff_date: NaiveDate,

    /// Number of concurrent download workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// How long a worker waits on the link queue before re-checking for completion (milliseconds)
    #[serde(rename = "consumer-timeout", default = "default_consumer_timeout")]
    pub consumer_timeout: u64,

    /// Pause between listing page requests (milliseconds)
    #[serde(rename = "request-delay", default = "default_request_delay")]
    pub request_delay: u64,

    /// Whole-request timeout for the HTTP client (seconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl CrawlerConfig {
    pub fn consumer_timeout(&self) -> Duration {
        Duration::from_millis(self.consumer_timeout)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Format: CrawlerName/Version (+ContactURL; ContactEmail)
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Response cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Wall-clock time (HH:MM, local) at which the whole cache is flushed daily
    #[serde(rename = "reset-time", default = "default_reset_time")]
    pub reset_time: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            reset_time: default_reset_time(),
        }
    }
}

fn default_base_url() -> String {
    "https://spimex.com/markets/oil_products/trades/results/".to_string()
}

fn default_page_param() -> String {
    "?page=page-{}".to_string()
}

fn default_link_class() -> String {
    "accordeon-inner__item-title link xls".to_string()
}

fn default_link_pattern() -> String {
    r"/upload/reports/oil_xls/oil_xls_(\d{8})".to_string()
}

fn default_date_format() -> String {
    "%Y%m%d".to_string()
}

fn default_workers() -> usize {
    3
}

fn default_consumer_timeout() -> u64 {
    5000
}

fn default_request_delay() -> u64 {
    300
}

fn default_request_timeout() -> u64 {
    30
}

fn default_reset_time() -> String {
    "14:11".to_string()
}
