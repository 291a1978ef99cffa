//! Listing page discovery
//!
//! Walks the paginated report listing from page 1, picks out the report
//! anchors, parses their dates and queues the ones inside the crawl window.
//! The listing is ordered newest first, so the first date at or below the
//! lower bound ends discovery.

use crate::config::CrawlerConfig;
use crate::crawler::{CompletionTracker, FetchClient, FetchResult, LinkEntry, LinkSender};
use crate::state::{CrawlState, DateVerdict};
use crate::ConfigError;
use chrono::{Local, NaiveDate};
use regex::Regex;
use scraper::{Html, Selector};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Why discovery stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A listing page could not be fetched
    FetchFailed,

    /// A listing page answered 404
    NotFound,

    /// A link dated at or below the window's lower bound was reached
    DateBoundary,

    /// A page yielded no acceptable link
    EmptyPage,

    /// Every link consumer is gone
    QueueClosed,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FetchFailed => "fetch_failed",
            Self::NotFound => "not_found",
            Self::DateBoundary => "date_boundary",
            Self::EmptyPage => "empty_page",
            Self::QueueClosed => "queue_closed",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of one discovery pass
#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    pub pages_visited: u32,
    pub links_queued: usize,
    pub malformed_links: usize,
    pub future_links: usize,
    pub stop_reason: StopReason,
}

/// Compiled rules for recognizing report anchors on a listing page
#[derive(Debug, Clone)]
pub struct ListingRules {
    selector: Selector,
    pattern: Regex,
    date_format: String,
}

impl ListingRules {
    /// Compiles the anchor selector and link pattern
    ///
    /// The link class is a space-separated class list; an anchor must carry
    /// every class in it.
    pub fn new(link_class: &str, link_pattern: &str, date_format: &str) -> Result<Self, ConfigError> {
        let classes: Vec<&str> = link_class.split_whitespace().collect();
        if classes.is_empty() {
            return Err(ConfigError::InvalidPattern(
                "link class must name at least one class".to_string(),
            ));
        }

        let css = format!("a.{}", classes.join("."));
        let selector = Selector::parse(&css).map_err(|e| {
            ConfigError::InvalidPattern(format!("invalid link selector '{}': {:?}", css, e))
        })?;

        let pattern = Regex::new(link_pattern).map_err(|e| {
            ConfigError::InvalidPattern(format!("invalid link pattern '{}': {}", link_pattern, e))
        })?;
        if pattern.captures_len() < 2 {
            return Err(ConfigError::InvalidPattern(format!(
                "link pattern '{}' needs a capture group for the date",
                link_pattern
            )));
        }

        Ok(Self {
            selector,
            pattern,
            date_format: date_format.to_string(),
        })
    }

    pub fn from_config(config: &CrawlerConfig) -> Result<Self, ConfigError> {
        Self::new(&config.link_class, &config.link_pattern, &config.date_format)
    }

    /// Parses the date token captured from an href
    ///
    /// `None` if the href does not match the pattern, `Some(Err(token))`
    /// if it matches but the token is not a valid date.
    fn report_date(&self, href: &str) -> Option<Result<NaiveDate, String>> {
        let token = self.pattern.captures(href)?.get(1)?.as_str();
        Some(NaiveDate::parse_from_str(token, &self.date_format).map_err(|_| token.to_string()))
    }
}

/// Report links found on one listing page, in document order
#[derive(Debug, Default)]
pub struct PageScan {
    pub accepted: Vec<LinkEntry>,
    pub hit_boundary: bool,
    pub malformed: usize,
    pub future: usize,
}

/// Strips query and fragment and resolves an href against the base URL
pub fn normalize_report_url(href: &str, base: &Url) -> Option<Url> {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    let mut url = base.join(path).ok()?;
    url.set_query(None);
    url.set_fragment(None);
    Some(url)
}

/// Scans a listing page against the crawl window
///
/// Stops at the first rejected date: one at or below the lower bound, or
/// one after today. Malformed dates are skipped and the page continues.
pub fn scan_page(
    html: &str,
    rules: &ListingRules,
    base: &Url,
    state: &CrawlState,
    today: NaiveDate,
) -> PageScan {
    let document = Html::parse_document(html);
    let mut scan = PageScan::default();

    for element in document.select(&rules.selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };

        let date = match rules.report_date(href) {
            None => continue,
            Some(Ok(date)) => date,
            Some(Err(token)) => {
                tracing::warn!("Skipping link with malformed date '{}': {}", token, href);
                scan.malformed += 1;
                continue;
            }
        };

        let verdict = state.verdict_on(date, today);
        if verdict.is_boundary() {
            if verdict == DateVerdict::Future {
                tracing::warn!("Reached link dated in the future ({}), stopping: {}", date, href);
                scan.future += 1;
            } else {
                tracing::info!(
                    "Reached {} outside window {}, stopping",
                    date,
                    state.describe_window()
                );
            }
            scan.hit_boundary = true;
            break;
        }

        match normalize_report_url(href, base) {
            Some(url) => scan.accepted.push(LinkEntry::new(url.to_string(), date)),
            None => {
                tracing::warn!("Skipping unresolvable link: {}", href);
                scan.malformed += 1;
            }
        }
    }

    scan
}

/// Marks discovery done when dropped, including on panic
struct DiscoveryDone(Arc<CompletionTracker>);

impl Drop for DiscoveryDone {
    fn drop(&mut self) {
        self.0.mark_discovery_done();
    }
}

/// Producer of report links
pub struct LinkDiscoverer {
    fetcher: Arc<dyn FetchClient>,
    rules: ListingRules,
    base_url: Url,
    page_param: String,
    request_delay: Duration,
}

impl LinkDiscoverer {
    pub fn new(
        fetcher: Arc<dyn FetchClient>,
        rules: ListingRules,
        base_url: Url,
        page_param: impl Into<String>,
        request_delay: Duration,
    ) -> Self {
        Self {
            fetcher,
            rules,
            base_url,
            page_param: page_param.into(),
            request_delay,
        }
    }

    /// Builds a discoverer from crawler settings
    pub fn from_config(
        fetcher: Arc<dyn FetchClient>,
        config: &CrawlerConfig,
    ) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;

        Ok(Self::new(
            fetcher,
            ListingRules::from_config(config)?,
            base_url,
            config.page_param.clone(),
            config.request_delay(),
        ))
    }

    /// URL of a listing page (1-based)
    pub fn page_url(&self, page: u32) -> String {
        format!(
            "{}{}",
            self.base_url,
            self.page_param.replace("{}", &page.to_string())
        )
    }

    /// Walks listing pages until a stop condition holds
    ///
    /// Consumes the sender; the queue closes and the tracker's
    /// discovery-done flag is set on every exit path.
    pub async fn discover(
        &self,
        mut state: CrawlState,
        links: LinkSender,
        tracker: Arc<CompletionTracker>,
    ) -> DiscoveryReport {
        let _done = DiscoveryDone(Arc::clone(&tracker));
        tracker.mark_started();

        let mut report = DiscoveryReport {
            pages_visited: 0,
            links_queued: 0,
            malformed_links: 0,
            future_links: 0,
            stop_reason: StopReason::EmptyPage,
        };

        tracing::info!("Discovering reports in window {}", state.describe_window());

        'pages: loop {
            let url = self.page_url(state.current_page);
            tracing::info!("Fetching listing page {}: {}", state.current_page, url);

            let body = match self.fetcher.fetch(&url).await {
                Ok(FetchResult::Success { body, .. }) => body,
                Ok(FetchResult::NotFound) => {
                    tracing::warn!("Listing page {} not found, stopping", state.current_page);
                    report.stop_reason = StopReason::NotFound;
                    break;
                }
                Err(e) => {
                    tracing::error!("Failed to fetch listing page {}: {}", state.current_page, e);
                    report.stop_reason = StopReason::FetchFailed;
                    break;
                }
            };
            report.pages_visited += 1;

            let html = String::from_utf8_lossy(&body);
            let today = Local::now().date_naive();
            let scan = scan_page(&html, &self.rules, &self.base_url, &state, today);

            report.malformed_links += scan.malformed;
            report.future_links += scan.future;
            let accepted = scan.accepted.len();

            for entry in scan.accepted {
                tracing::info!("Queued report {} ({})", entry.url, entry.report_date);
                if !links.send(entry) {
                    tracing::warn!("Link queue closed, stopping discovery");
                    report.stop_reason = StopReason::QueueClosed;
                    break 'pages;
                }
                report.links_queued += 1;
            }

            if scan.hit_boundary {
                report.stop_reason = StopReason::DateBoundary;
                break;
            }

            if accepted == 0 {
                tracing::info!("Page {} has no new reports, stopping", state.current_page);
                report.stop_reason = StopReason::EmptyPage;
                break;
            }

            tokio::time::sleep(self.request_delay).await;
            state.advance_page();
        }

        drop(links);
        tracing::info!(
            "Discovery finished after {} pages: {} links queued ({})",
            report.pages_visited,
            report.links_queued,
            report.stop_reason
        );

        report
    }
}
