//! Read-only queries over stored bulletins
//!
//! Four handlers back the read surface: the plain bulletin listing, the
//! most recent trading dates, bulletin dynamics over a date range and the
//! latest trading results.
//! [`QueryRoutes`] registers each of them behind the response cache.

use crate::cache::{cached, CacheArgs, Cached, QueryHandler, ResponseCache};
use crate::extract::BulletinRecord;
use crate::storage::{BulletinFilter, SqliteStorage, Storage, StorageError};
use crate::{HarvestError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

pub const DEFAULT_DATES_LIMIT: usize = 10;
pub const MAX_DATES_LIMIT: usize = 100;
pub const DEFAULT_DYNAMICS_LIMIT: usize = 1000;
pub const DEFAULT_RESULTS_LIMIT: usize = 100;
pub const DEFAULT_LIST_LIMIT: usize = 100;

type SharedStorage = Arc<Mutex<SqliteStorage>>;

fn with_storage<T>(
    storage: &SharedStorage,
    f: impl FnOnce(&SqliteStorage) -> std::result::Result<T, StorageError>,
) -> Result<T> {
    let guard = storage
        .lock()
        .map_err(|_| StorageError::Database("storage lock poisoned".to_string()))?;
    Ok(f(&guard)?)
}

fn opt(value: &Option<impl ToString>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

fn check_limit(limit: usize) -> Result<()> {
    if limit < 1 {
        return Err(HarvestError::InvalidArgument(
            "limit must be at least 1".to_string(),
        ));
    }
    Ok(())
}

// ===== Bulletin listing =====

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulletinsArgs {
    pub limit: usize,
}

impl Default for BulletinsArgs {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIST_LIMIT,
        }
    }
}

impl CacheArgs for BulletinsArgs {
    fn cache_args(&self) -> Vec<(&'static str, String)> {
        vec![("limit", self.limit.to_string())]
    }
}

/// Most recent bulletins without filters
pub struct BulletinsHandler {
    storage: SharedStorage,
}

impl BulletinsHandler {
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl QueryHandler for BulletinsHandler {
    type Args = BulletinsArgs;
    type Output = Vec<BulletinRecord>;

    fn name(&self) -> &'static str {
        "list_bulletins"
    }

    async fn handle(&self, args: BulletinsArgs) -> Result<Vec<BulletinRecord>> {
        check_limit(args.limit)?;
        with_storage(&self.storage, |s| {
            s.latest_bulletins(&BulletinFilter::default(), args.limit)
        })
    }
}

// ===== Trading dates =====

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradingDatesArgs {
    pub limit: usize,
}

impl Default for TradingDatesArgs {
    fn default() -> Self {
        Self {
            limit: DEFAULT_DATES_LIMIT,
        }
    }
}

impl CacheArgs for TradingDatesArgs {
    fn cache_args(&self) -> Vec<(&'static str, String)> {
        vec![("limit", self.limit.to_string())]
    }
}

/// Most recent distinct trading dates
pub struct TradingDatesHandler {
    storage: SharedStorage,
}

impl TradingDatesHandler {
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl QueryHandler for TradingDatesHandler {
    type Args = TradingDatesArgs;
    type Output = Vec<NaiveDate>;

    fn name(&self) -> &'static str {
        "get_last_trading_dates"
    }

    async fn handle(&self, args: TradingDatesArgs) -> Result<Vec<NaiveDate>> {
        if !(1..=MAX_DATES_LIMIT).contains(&args.limit) {
            return Err(HarvestError::InvalidArgument(format!(
                "limit must be between 1 and {}, got {}",
                MAX_DATES_LIMIT, args.limit
            )));
        }

        with_storage(&self.storage, |s| s.last_trading_dates(args.limit))
    }
}

// ===== Dynamics =====

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicsArgs {
    pub filter: BulletinFilter,
    pub limit: usize,
}

impl Default for DynamicsArgs {
    fn default() -> Self {
        Self {
            filter: BulletinFilter::default(),
            limit: DEFAULT_DYNAMICS_LIMIT,
        }
    }
}

impl CacheArgs for DynamicsArgs {
    fn cache_args(&self) -> Vec<(&'static str, String)> {
        vec![
            ("oil_id", opt(&self.filter.oil_id)),
            ("delivery_type_id", opt(&self.filter.delivery_type_id)),
            ("delivery_basis_id", opt(&self.filter.delivery_basis_id)),
            ("start_date", opt(&self.filter.start_date)),
            ("end_date", opt(&self.filter.end_date)),
            ("limit", self.limit.to_string()),
        ]
    }
}

/// Bulletins over a period, newest first
pub struct DynamicsHandler {
    storage: SharedStorage,
}

impl DynamicsHandler {
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl QueryHandler for DynamicsHandler {
    type Args = DynamicsArgs;
    type Output = Vec<BulletinRecord>;

    fn name(&self) -> &'static str {
        "get_dynamics"
    }

    async fn handle(&self, args: DynamicsArgs) -> Result<Vec<BulletinRecord>> {
        check_limit(args.limit)?;
        if let (Some(start), Some(end)) = (args.filter.start_date, args.filter.end_date) {
            if start > end {
                return Err(HarvestError::InvalidArgument(format!(
                    "start_date {} is after end_date {}",
                    start, end
                )));
            }
        }

        with_storage(&self.storage, |s| s.query_bulletins(&args.filter, args.limit))
    }
}

// ===== Trading results =====

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradingResultsArgs {
    pub oil_id: Option<String>,
    pub delivery_type_id: Option<String>,
    pub delivery_basis_id: Option<String>,
    pub limit: usize,
}

impl Default for TradingResultsArgs {
    fn default() -> Self {
        Self {
            oil_id: None,
            delivery_type_id: None,
            delivery_basis_id: None,
            limit: DEFAULT_RESULTS_LIMIT,
        }
    }
}

impl TradingResultsArgs {
    fn filter(&self) -> BulletinFilter {
        BulletinFilter {
            oil_id: self.oil_id.clone(),
            delivery_type_id: self.delivery_type_id.clone(),
            delivery_basis_id: self.delivery_basis_id.clone(),
            start_date: None,
            end_date: None,
        }
    }
}

impl CacheArgs for TradingResultsArgs {
    fn cache_args(&self) -> Vec<(&'static str, String)> {
        vec![
            ("oil_id", opt(&self.oil_id)),
            ("delivery_type_id", opt(&self.delivery_type_id)),
            ("delivery_basis_id", opt(&self.delivery_basis_id)),
            ("limit", self.limit.to_string()),
        ]
    }
}

/// Latest results matching the code filters, newest date first
pub struct TradingResultsHandler {
    storage: SharedStorage,
}

impl TradingResultsHandler {
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl QueryHandler for TradingResultsHandler {
    type Args = TradingResultsArgs;
    type Output = Vec<BulletinRecord>;

    fn name(&self) -> &'static str {
        "get_trading_results"
    }

    async fn handle(&self, args: TradingResultsArgs) -> Result<Vec<BulletinRecord>> {
        check_limit(args.limit)?;

        let filter = args.filter();
        with_storage(&self.storage, |s| s.latest_bulletins(&filter, args.limit))
    }
}

// ===== Registration =====

/// Names of the available queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Bulletins,
    Dynamics,
    TradingResults,
    TradingDates,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bulletins => "bulletins",
            Self::Dynamics => "dynamics",
            Self::TradingResults => "trading-results",
            Self::TradingDates => "trading-dates",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for QueryKind {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bulletins" => Ok(Self::Bulletins),
            "dynamics" => Ok(Self::Dynamics),
            "trading-results" => Ok(Self::TradingResults),
            "trading-dates" => Ok(Self::TradingDates),
            other => Err(HarvestError::InvalidArgument(format!(
                "unknown query '{}'",
                other
            ))),
        }
    }
}

/// The query handlers, each wrapped in the response cache
pub struct QueryRoutes {
    pub bulletins: Cached<BulletinsHandler>,
    pub dynamics: Cached<DynamicsHandler>,
    pub trading_results: Cached<TradingResultsHandler>,
    pub trading_dates: Cached<TradingDatesHandler>,
    cache: ResponseCache,
}

impl QueryRoutes {
    pub fn new(storage: SharedStorage, cache: ResponseCache) -> Self {
        Self {
            bulletins: cached(
                BulletinsHandler::new(Arc::clone(&storage)),
                cache.clone(),
                "bulletins",
            ),
            dynamics: cached(
                DynamicsHandler::new(Arc::clone(&storage)),
                cache.clone(),
                "dynamics",
            ),
            trading_results: cached(
                TradingResultsHandler::new(Arc::clone(&storage)),
                cache.clone(),
                "trading_results",
            ),
            trading_dates: cached(
                TradingDatesHandler::new(storage),
                cache.clone(),
                "trading_dates",
            ),
            cache,
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Runs a query with default arguments and an optional limit
    pub async fn run(&self, kind: QueryKind, limit: Option<usize>) -> Result<serde_json::Value> {
        let value = match kind {
            QueryKind::Bulletins => {
                let mut args = BulletinsArgs::default();
                if let Some(limit) = limit {
                    args.limit = limit;
                }
                serde_json::to_value(self.bulletins.handle(args).await?)?
            }
            QueryKind::Dynamics => {
                let mut args = DynamicsArgs::default();
                if let Some(limit) = limit {
                    args.limit = limit;
                }
                serde_json::to_value(self.dynamics.handle(args).await?)?
            }
            QueryKind::TradingResults => {
                let mut args = TradingResultsArgs::default();
                if let Some(limit) = limit {
                    args.limit = limit;
                }
                serde_json::to_value(self.trading_results.handle(args).await?)?
            }
            QueryKind::TradingDates => {
                let mut args = TradingDatesArgs::default();
                if let Some(limit) = limit {
                    args.limit = limit;
                }
                serde_json::to_value(self.trading_dates.handle(args).await?)?
            }
        };

        Ok(value)
    }
}
