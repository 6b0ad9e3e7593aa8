//! Market data module for US equities and their option chains.
//!
//! Provides the raw snapshot types the pipeline scores, the
//! [`MarketDataFetcher`] capability the pipeline pulls data through, and a
//! reqwest-backed implementation with proactive rate limiting and a TTL
//! response cache.
//!
//! # Cost control
//! Every upstream call made on behalf of a pipeline run is charged to a
//! shared [`RunBudget`]. Once the budget is spent, further calls fail fast
//! with [`ProviderError::BudgetExhausted`] instead of blocking.

mod budget;
mod cache;
mod history;
mod http;
mod provider;
mod rate_limiter;
mod snapshot;

pub use budget::{BudgetUsage, RunBudget};
pub use cache::ResponseCache;
pub use history::history_from_bars;
pub use http::HttpMarketDataFetcher;
pub use provider::{symbol_params, Endpoint, FetchParams, MarketDataFetcher, ProviderError};
pub use rate_limiter::{shared_limiter, RateLimiter, SharedRateLimiter};
pub use snapshot::{parse_market_snapshot, Benchmark, History, MarketRegime, TickerSnapshot};
