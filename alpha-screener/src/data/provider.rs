//! Market data capability used by the pipeline.
//!
//! Defines the `MarketDataFetcher` trait that every upstream integration
//! implements. The pipeline never talks HTTP directly; it asks for an
//! [`Endpoint`] with string parameters and receives raw JSON back.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use super::budget::RunBudget;

// ============================================================================
// Endpoints
// ============================================================================

/// Upstream endpoints the pipeline needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Full-market snapshot of every listed ticker
    MarketSnapshot,
    /// Option chain snapshot for one underlying (`symbol` param)
    OptionsChain,
    /// Daily bars for one symbol (`symbol`, `from`, `to` params)
    DailyBars,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MarketSnapshot => write!(f, "market_snapshot"),
            Self::OptionsChain => write!(f, "options_chain"),
            Self::DailyBars => write!(f, "daily_bars"),
        }
    }
}

/// Query parameters for a fetch. Ordered so cache keys are stable.
pub type FetchParams = BTreeMap<String, String>;

// ============================================================================
// Provider Error
// ============================================================================

/// Errors specific to market data providers.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Network error (connection failed, reset)
    Network(String),
    /// The per-request deadline elapsed
    Timeout,
    /// Authentication error (invalid or missing key)
    Auth(String),
    /// Rate limit exceeded
    RateLimited { retry_after_secs: Option<u64> },
    /// The underlying has no listed options
    NoOptionsListed(String),
    /// The run's request budget is spent
    BudgetExhausted { used: u64, cap: u64 },
    /// The response could not be interpreted
    Malformed(String),
    /// Invalid request parameters
    InvalidRequest(String),
    /// Internal provider error
    Internal(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::Timeout => write!(f, "Request timed out"),
            Self::Auth(msg) => write!(f, "Authentication error: {}", msg),
            Self::RateLimited { retry_after_secs } => {
                write!(f, "Rate limited")?;
                if let Some(secs) = retry_after_secs {
                    write!(f, ", retry after {} seconds", secs)?;
                }
                Ok(())
            }
            Self::NoOptionsListed(symbol) => write!(f, "No options listed for {}", symbol),
            Self::BudgetExhausted { used, cap } => {
                write!(f, "Request budget exhausted ({}/{})", used, cap)
            }
            Self::Malformed(msg) => write!(f, "Malformed response: {}", msg),
            Self::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    /// Check if the error is worth retrying in a later round.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::Timeout
                | Self::RateLimited { .. }
                | Self::Malformed(_)
                | Self::Internal(_)
        )
    }

    /// Check if the symbol should be permanently removed from enrichment.
    pub fn is_permanent_exclusion(&self) -> bool {
        matches!(self, Self::NoOptionsListed(_))
    }

    /// Check if this is a budget stop.
    pub fn is_budget_exhausted(&self) -> bool {
        matches!(self, Self::BudgetExhausted { .. })
    }
}

// ============================================================================
// Fetcher Trait
// ============================================================================

/// Trait for market data fetchers.
///
/// Implementations must be safe to call concurrently from the backfill
/// worker pool.
#[async_trait]
pub trait MarketDataFetcher: Send + Sync {
    /// Get the fetcher name (for logging)
    fn name(&self) -> &'static str;

    /// Fetch raw JSON for `endpoint`.
    ///
    /// # Arguments
    /// * `endpoint` - Which upstream resource to read
    /// * `params` - Endpoint parameters (`symbol`, date range, ...)
    /// * `use_cache` - Whether a cached response may be served
    /// * `budget` - The caller's run budget. The caller charges the primary
    ///   request itself; implementations charge any follow-up requests they
    ///   issue (pagination) and fail with `BudgetExhausted` when it is spent.
    async fn fetch(
        &self,
        endpoint: Endpoint,
        params: &FetchParams,
        use_cache: bool,
        budget: Option<&RunBudget>,
    ) -> Result<Value, ProviderError>;
}

/// Build a single-symbol parameter map.
pub fn symbol_params(symbol: &str) -> FetchParams {
    let mut params = FetchParams::new();
    params.insert("symbol".to_string(), symbol.to_string());
    params
}
