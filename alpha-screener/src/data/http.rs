//! HTTP market data fetcher (Polygon-compatible REST API).
//!
//! # Rate Limits
//! - Proactive token-bucket throttling before every request
//! - 429 responses surface as `ProviderError::RateLimited` and are retried
//!   by the backfill orchestrator in a later round
//!
//! # Budget
//! Option chains are paginated. The first page is charged by the caller;
//! every follow-up page is charged here against the same run budget.

use alpha_common::config::MarketDataConfig;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::budget::RunBudget;
use super::cache::ResponseCache;
use super::provider::{Endpoint, FetchParams, MarketDataFetcher, ProviderError};
use crate::options::TRUNCATED_AFTER_PAGES;
use super::rate_limiter::{shared_limiter, SharedRateLimiter};

// ============================================================================
// Constants
// ============================================================================

/// Full-market stock snapshot endpoint
const SNAPSHOT_ENDPOINT: &str = "/v2/snapshot/locale/us/markets/stocks/tickers";

/// Option chain snapshot endpoint prefix
const OPTIONS_ENDPOINT: &str = "/v3/snapshot/options";

/// Daily aggregates endpoint prefix
const AGGS_ENDPOINT: &str = "/v2/aggs/ticker";

/// Contracts per option chain page (API max is 250)
const CHAIN_PAGE_LIMIT: u32 = 250;

/// Upper bound on chain pages followed for one underlying
const MAX_CHAIN_PAGES: usize = 8;

/// Retry hint after a 429
const RATE_LIMIT_RETRY_SECS: u64 = 2;

// ============================================================================
// Fetcher
// ============================================================================

/// reqwest-backed implementation of [`MarketDataFetcher`].
pub struct HttpMarketDataFetcher {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    rate_limiter: SharedRateLimiter,
    cache: ResponseCache,
}

impl HttpMarketDataFetcher {
    /// Create a fetcher with explicit settings.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        rate_limit_rpm: u32,
        request_timeout: Duration,
        cache_ttl_secs: i64,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
            rate_limiter: shared_limiter("market_data", rate_limit_rpm),
            cache: ResponseCache::with_ttl(cache_ttl_secs),
        }
    }

    /// Create from config
    pub fn from_config(config: &MarketDataConfig) -> Self {
        Self::new(
            config.base_url.clone(),
            config.api_key.clone(),
            config.rate_limit_rpm,
            Duration::from_secs(config.request_timeout_secs),
            config.cache_ttl_secs,
        )
    }

    /// Resolve the URL (without credentials) for an endpoint.
    fn build_url(&self, endpoint: Endpoint, params: &FetchParams) -> Result<String, ProviderError> {
        let symbol = || {
            params
                .get("symbol")
                .filter(|s| !s.is_empty())
                .ok_or_else(|| ProviderError::InvalidRequest(format!("{} requires a symbol", endpoint)))
        };

        let url = match endpoint {
            Endpoint::MarketSnapshot => format!("{}{}", self.base_url, SNAPSHOT_ENDPOINT),
            Endpoint::OptionsChain => format!(
                "{}{}/{}?limit={}",
                self.base_url,
                OPTIONS_ENDPOINT,
                symbol()?,
                CHAIN_PAGE_LIMIT
            ),
            Endpoint::DailyBars => {
                let from = params
                    .get("from")
                    .ok_or_else(|| ProviderError::InvalidRequest("daily_bars requires from".into()))?;
                let to = params
                    .get("to")
                    .ok_or_else(|| ProviderError::InvalidRequest("daily_bars requires to".into()))?;
                format!(
                    "{}{}/{}/range/1/day/{}/{}?adjusted=true&sort=asc&limit=120",
                    self.base_url,
                    AGGS_ENDPOINT,
                    symbol()?,
                    from,
                    to
                )
            }
        };

        Ok(url)
    }

    /// GET a URL and decode the JSON body.
    async fn get_json(&self, url: &str, endpoint: Endpoint, params: &FetchParams) -> Result<Value, ProviderError> {
        self.rate_limiter.acquire().await;

        debug!(url = %url, endpoint = %endpoint, "Fetching from market data API");

        let mut request = self.client.get(url).header("accept", "application/json");
        if let Some(key) = &self.api_key {
            request = request.query(&[("apiKey", key.as_str())]);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else if e.is_connect() {
                ProviderError::Network("Connection failed".into())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ProviderError::Auth(format!("HTTP {}", status)));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited {
                retry_after_secs: Some(RATE_LIMIT_RETRY_SECS),
            });
        }

        if status == reqwest::StatusCode::NOT_FOUND && endpoint == Endpoint::OptionsChain {
            let symbol = params.get("symbol").cloned().unwrap_or_default();
            return Err(ProviderError::NoOptionsListed(symbol));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Internal(format!("HTTP {}: {}", status, body)));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ProviderError::Malformed(format!("Failed to parse response: {}", e)))
    }

    /// Fetch every page of an option chain and merge the `results` arrays.
    async fn fetch_chain(
        &self,
        first_url: &str,
        params: &FetchParams,
        budget: Option<&RunBudget>,
    ) -> Result<Value, ProviderError> {
        let mut page = self.get_json(first_url, Endpoint::OptionsChain, params).await?;
        let mut contracts = take_results(&mut page);

        if contracts.is_empty() {
            let symbol = params.get("symbol").cloned().unwrap_or_default();
            return Err(ProviderError::NoOptionsListed(symbol));
        }

        let mut next = next_url(&page);
        let mut pages = 1;
        let mut truncated = false;

        while let Some(url) = next {
            if pages >= MAX_CHAIN_PAGES {
                warn!(
                    symbol = params.get("symbol").map(String::as_str).unwrap_or_default(),
                    pages,
                    contracts = contracts.len(),
                    "Option chain page limit reached, analytics use a partial chain"
                );
                truncated = true;
                break;
            }
            if let Some(budget) = budget {
                if !budget.try_consume() {
                    return Err(ProviderError::BudgetExhausted {
                        used: budget.used(),
                        cap: budget.cap(),
                    });
                }
            }

            let mut body = self.get_json(&url, Endpoint::OptionsChain, params).await?;
            contracts.extend(take_results(&mut body));
            next = next_url(&body);
            pages += 1;
        }

        Ok(chain_document(contracts, truncated.then_some(pages)))
    }
}

/// Merged chain; `truncated_after` marks a chain cut at the page limit.
fn chain_document(contracts: Vec<Value>, truncated_after: Option<usize>) -> Value {
    let mut doc = serde_json::json!({ "results": contracts });
    if let Some(pages) = truncated_after {
        doc[TRUNCATED_AFTER_PAGES] = Value::from(pages);
    }
    doc
}

fn take_results(body: &mut Value) -> Vec<Value> {
    match body.get_mut("results").map(Value::take) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

fn next_url(body: &Value) -> Option<String> {
    body.get("next_url")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl MarketDataFetcher for HttpMarketDataFetcher {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch(
        &self,
        endpoint: Endpoint,
        params: &FetchParams,
        use_cache: bool,
        budget: Option<&RunBudget>,
    ) -> Result<Value, ProviderError> {
        let url = self.build_url(endpoint, params)?;

        if use_cache {
            if let Some(hit) = self.cache.get(&url) {
                debug!(endpoint = %endpoint, "Serving cached response");
                return Ok(hit);
            }
        }

        let body = match endpoint {
            Endpoint::OptionsChain => self.fetch_chain(&url, params, budget).await?,
            _ => self.get_json(&url, endpoint, params).await?,
        };

        if use_cache {
            self.cache.insert(url, body.clone());
        }

        Ok(body)
    }
}
