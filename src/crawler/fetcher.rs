//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the harvester, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests for listing pages and report files
//! - Error classification (404 vs. other statuses vs. transport failures)

use crate::config::UserAgentConfig;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;

/// Result of a fetch operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    /// Successfully fetched the resource
    Success {
        /// Final URL after redirects
        final_url: String,
        /// HTTP status code
        status_code: u16,
        /// Raw response body
        body: Vec<u8>,
    },

    /// The server answered 404
    NotFound,
}

/// Fetch failures other than 404
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to read body of {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            Self::Status { url, .. } | Self::Network { url, .. } | Self::Body { url, .. } => url,
        }
    }

    /// True for timeouts and connection failures
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500,
            Self::Network { source, .. } => source.is_timeout() || source.is_connect(),
            Self::Body { .. } => false,
        }
    }
}

/// Source of listing pages and report files
#[async_trait]
pub trait FetchClient: Send + Sync {
    /// Fetches a URL
    ///
    /// # Returns
    ///
    /// * `Ok(FetchResult::Success)` - 2xx response with its body
    /// * `Ok(FetchResult::NotFound)` - 404 response
    /// * `Err(FetchError)` - Any other status or a transport failure
    async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Total request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use spimex_harvest::config::UserAgentConfig;
/// use spimex_harvest::crawler::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     crawler_name: "SpimexHarvest".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "ops@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// reqwest-backed fetch client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a fetcher with the configured user agent and timeout
    pub fn from_config(config: &UserAgentConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config, timeout)?))
    }
}

#[async_trait]
impl FetchClient for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Network {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        let final_url = response.url().to_string();

        if status == StatusCode::NOT_FOUND {
            tracing::debug!("404 for {}", url);
            return Ok(FetchResult::NotFound);
        }

        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|source| FetchError::Body {
            url: url.to_string(),
            source,
        })?;

        Ok(FetchResult::Success {
            final_url,
            status_code: status.as_u16(),
            body: body.to_vec(),
        })
    }
}
