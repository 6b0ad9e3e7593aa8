//! Shared fixtures for the integration tests: a scripted market data
//! fetcher and a pipeline harness over temporary stores.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use tempfile::TempDir;

use alpha_screener::backfill::ManualClock;
use alpha_screener::data::{Endpoint, FetchParams, MarketDataFetcher, ProviderError, RunBudget};
use alpha_screener::{FileReportStore, JsonFileTrackerStore, ScreenerConfig, ShortlistPipeline};

// ============================================================================
// Tickers
// ============================================================================

/// One row of the market snapshot.
#[derive(Debug, Clone)]
pub struct TickerSpec {
    pub symbol: String,
    pub price: f64,
    pub change_pct: f64,
    pub volume: f64,
    pub volume_ratio: f64,
    /// Day high / price
    pub high_factor: f64,
    /// Day low / price
    pub low_factor: f64,
    /// VWAP / price
    pub vwap_factor: f64,
}

impl TickerSpec {
    /// A healthy up-day: 1% above VWAP, low dipped under VWAP, 3% range.
    pub fn new(symbol: &str, price: f64, change_pct: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            price,
            change_pct,
            volume: 1_000_000.0,
            volume_ratio: 1.2,
            high_factor: 1.01,
            low_factor: 0.98,
            vwap_factor: 1.0 / 1.01,
        }
    }

    pub fn volume_ratio(mut self, ratio: f64) -> Self {
        self.volume_ratio = ratio;
        self
    }

    /// A weak down-day below VWAP, closing near the low.
    pub fn weak(symbol: &str, price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            price,
            change_pct: -2.0,
            volume: 1_000_000.0,
            volume_ratio: 0.5,
            high_factor: 1.03,
            low_factor: 0.995,
            vwap_factor: 1.02,
        }
    }

    pub fn to_json(&self) -> Value {
        let p = self.price;
        json!({
            "ticker": self.symbol,
            "day": {
                "c": p,
                "h": p * self.high_factor,
                "l": p * self.low_factor,
                "v": self.volume,
                "vw": p * self.vwap_factor,
            },
            "prevDay": {
                "c": p / (1.0 + self.change_pct / 100.0),
                "v": self.volume / self.volume_ratio,
            },
            "lastTrade": { "p": p },
        })
    }
}

/// Three-letter symbol for index `i`.
pub fn symbol(i: usize) -> String {
    let first = (b'A' + (i / 26) as u8) as char;
    let second = (b'A' + (i % 26) as u8) as char;
    format!("Q{}{}", first, second)
}

/// `n` liquid tickers whose day change rises with the index.
pub fn universe(n: usize) -> Vec<TickerSpec> {
    (0..n)
        .map(|i| TickerSpec::new(&symbol(i), 50.0 + i as f64, 1.0 + 0.05 * i as f64))
        .collect()
}

/// Option chain with calls skewed above spot and a put floor just below.
pub fn chain_doc(spot: f64) -> Value {
    let contract = |kind: &str, strike: f64, oi: f64| {
        json!({
            "details": { "contract_type": kind, "strike_price": strike },
            "open_interest": oi,
            "greeks": { "gamma": 0.02 },
        })
    };
    json!({
        "results": [
            contract("call", spot * 0.97, 100.0),
            contract("call", spot * 1.08, 500.0),
            contract("put", spot * 0.97, 300.0),
            contract("put", spot * 0.90, 50.0),
        ]
    })
}

/// 25 sessions of gently rising closes ending just below `price`.
pub fn bars_doc(price: f64) -> Value {
    let results: Vec<Value> = (0..25)
        .map(|k| {
            let close = price * (1.0 - 0.002 * (24 - k) as f64);
            json!({ "t": k as i64 * 86_400_000, "c": close, "h": close * 1.005 })
        })
        .collect();
    json!({ "results": results })
}

// ============================================================================
// Mock market
// ============================================================================

/// How the chain endpoint answers for one symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChainScript {
    Listed,
    NoOptions,
    /// Every call fails with a network error
    Broken,
    /// The first `n` calls fail, then the chain is served
    FlakyThenListed(u32),
}

/// Scripted upstream.
pub struct MockMarket {
    tickers: Vec<TickerSpec>,
    scripts: HashMap<String, ChainScript>,
    serve_bars: bool,
    snapshot_calls: AtomicU32,
    bar_calls: AtomicU32,
    chain_calls: Mutex<HashMap<String, u32>>,
}

impl MockMarket {
    pub fn new(tickers: Vec<TickerSpec>) -> Self {
        Self {
            tickers,
            scripts: HashMap::new(),
            serve_bars: false,
            snapshot_calls: AtomicU32::new(0),
            bar_calls: AtomicU32::new(0),
            chain_calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn script(mut self, symbol: &str, script: ChainScript) -> Self {
        self.scripts.insert(symbol.to_string(), script);
        self
    }

    pub fn with_bars(mut self) -> Self {
        self.serve_bars = true;
        self
    }

    pub fn snapshot_calls(&self) -> u32 {
        self.snapshot_calls.load(Ordering::SeqCst)
    }

    pub fn bar_calls(&self) -> u32 {
        self.bar_calls.load(Ordering::SeqCst)
    }

    pub fn chain_calls(&self, symbol: &str) -> u32 {
        self.chain_calls.lock().unwrap().get(symbol).copied().unwrap_or(0)
    }

    pub fn total_chain_calls(&self) -> u32 {
        self.chain_calls.lock().unwrap().values().sum()
    }

    fn price_of(&self, symbol: &str) -> Option<f64> {
        self.tickers.iter().find(|t| t.symbol == symbol).map(|t| t.price)
    }
}

#[async_trait]
impl MarketDataFetcher for MockMarket {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn fetch(
        &self,
        endpoint: Endpoint,
        params: &FetchParams,
        _use_cache: bool,
        _budget: Option<&RunBudget>,
    ) -> Result<Value, ProviderError> {
        match endpoint {
            Endpoint::MarketSnapshot => {
                self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
                let rows: Vec<Value> = self.tickers.iter().map(TickerSpec::to_json).collect();
                Ok(json!({ "tickers": rows }))
            }
            Endpoint::DailyBars => {
                self.bar_calls.fetch_add(1, Ordering::SeqCst);
                let symbol = params.get("symbol").cloned().unwrap_or_default();
                match (self.serve_bars, self.price_of(&symbol)) {
                    (true, Some(price)) => Ok(bars_doc(price)),
                    _ => Ok(json!({ "results": [] })),
                }
            }
            Endpoint::OptionsChain => {
                let symbol = params
                    .get("symbol")
                    .cloned()
                    .ok_or_else(|| ProviderError::InvalidRequest("missing symbol".into()))?;
                let call = {
                    let mut calls = self.chain_calls.lock().unwrap();
                    let count = calls.entry(symbol.clone()).or_insert(0);
                    *count += 1;
                    *count
                };
                let price = self
                    .price_of(&symbol)
                    .ok_or_else(|| ProviderError::InvalidRequest(format!("unknown {}", symbol)))?;

                match self.scripts.get(&symbol).copied().unwrap_or(ChainScript::Listed) {
                    ChainScript::Listed => Ok(chain_doc(price)),
                    ChainScript::NoOptions => Err(ProviderError::NoOptionsListed(symbol)),
                    ChainScript::Broken => Err(ProviderError::Network("connection reset".into())),
                    ChainScript::FlakyThenListed(n) if call <= n => {
                        Err(ProviderError::Network("connection reset".into()))
                    }
                    ChainScript::FlakyThenListed(_) => Ok(chain_doc(price)),
                }
            }
        }
    }
}

// ============================================================================
// Harness
// ============================================================================

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

/// Fast defaults: three rounds, no history, generous budget.
pub fn test_config() -> ScreenerConfig {
    let mut config = ScreenerConfig::default();
    config.backfill.max_rounds = 3;
    config.backfill.round_interval_secs = 20;
    config.backfill.per_ticker_timeout_ms = 5_000;
    config.backfill.request_budget = 1_000;
    config.backfill.fetch_history = false;
    config.report.markdown = false;
    config
}

/// Mock market, manual clock and stores under a temp directory.
pub struct Harness {
    pub dir: TempDir,
    pub market: Arc<MockMarket>,
    pub clock: Arc<ManualClock>,
    pub reports: Arc<FileReportStore>,
    pub tracker: Arc<JsonFileTrackerStore>,
}

impl Harness {
    pub fn new(market: MockMarket) -> Self {
        let dir = TempDir::new().unwrap();
        let reports = Arc::new(FileReportStore::new(dir.path().join("reports")));
        let tracker = Arc::new(JsonFileTrackerStore::new(dir.path().join("tracker.json")));
        Self {
            dir,
            market: Arc::new(market),
            clock: Arc::new(ManualClock::new()),
            reports,
            tracker,
        }
    }

    pub fn pipeline(&self, config: ScreenerConfig) -> ShortlistPipeline<MockMarket, ManualClock> {
        ShortlistPipeline::new(
            config,
            self.market.clone(),
            self.clock.clone(),
            self.reports.clone(),
            self.tracker.clone(),
        )
    }
}
