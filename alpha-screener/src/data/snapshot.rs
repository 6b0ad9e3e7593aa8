//! Raw per-symbol market data and run-level context.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

// ============================================================================
// Ticker Snapshot
// ============================================================================

/// Raw market data for one symbol. Refreshed every run, never persisted on
/// its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerSnapshot {
    /// Ticker symbol (e.g., "NVDA")
    pub symbol: String,
    /// Last trade price
    pub price: f64,
    /// Previous session close
    pub prev_close: f64,
    /// Current session volume
    pub volume: f64,
    /// Previous session volume
    #[serde(default)]
    pub prev_volume: Option<f64>,
    /// Session VWAP
    #[serde(default)]
    pub vwap: Option<f64>,
    /// Session high
    #[serde(default)]
    pub day_high: Option<f64>,
    /// Session low
    #[serde(default)]
    pub day_low: Option<f64>,
}

impl TickerSnapshot {
    /// Percentage change versus the previous close.
    pub fn change_percent(&self) -> f64 {
        if self.prev_close > 0.0 {
            (self.price / self.prev_close - 1.0) * 100.0
        } else {
            0.0
        }
    }

    /// Price × volume.
    pub fn dollar_volume(&self) -> f64 {
        self.price * self.volume
    }

    /// Current volume over previous-session volume, when the latter is known.
    pub fn volume_ratio(&self) -> Option<f64> {
        self.prev_volume
            .filter(|v| *v > 0.0)
            .map(|prev| self.volume / prev)
    }

    /// Intraday high-low range as a percentage of price.
    pub fn intraday_range_pct(&self) -> Option<f64> {
        match (self.day_high, self.day_low) {
            (Some(high), Some(low)) if high >= low && self.price > 0.0 => {
                Some((high - low) / self.price * 100.0)
            }
            _ => None,
        }
    }

    /// Position of the price within the day range (0 = low, 1 = high).
    pub fn day_range_position(&self) -> Option<f64> {
        match (self.day_high, self.day_low) {
            (Some(high), Some(low)) if high > low => {
                Some(((self.price - low) / (high - low)).clamp(0.0, 1.0))
            }
            _ => None,
        }
    }

    /// Whether every required field is a usable number.
    pub fn is_well_formed(&self) -> bool {
        self.price.is_finite()
            && self.price > 0.0
            && self.prev_close.is_finite()
            && self.prev_close > 0.0
            && self.volume.is_finite()
            && self.volume >= 0.0
    }
}

// ============================================================================
// Multi-horizon history
// ============================================================================

/// Optional longer-horizon context for a symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    /// 1-week percentage change
    #[serde(rename = "change1W", default)]
    pub change_1w: Option<f64>,
    /// 1-month percentage change
    #[serde(rename = "change1M", default)]
    pub change_1m: Option<f64>,
    /// Reference high (highest high over the lookback window)
    #[serde(rename = "referenceHigh", default)]
    pub reference_high: Option<f64>,
}

// ============================================================================
// Regime & Benchmark
// ============================================================================

/// Macro regime label supplied to the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketRegime {
    #[serde(rename = "Risk-On")]
    RiskOn,
    #[serde(rename = "Neutral")]
    Neutral,
    #[serde(rename = "Risk-Off")]
    RiskOff,
}

impl Default for MarketRegime {
    fn default() -> Self {
        Self::Neutral
    }
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RiskOn => write!(f, "Risk-On"),
            Self::Neutral => write!(f, "Neutral"),
            Self::RiskOff => write!(f, "Risk-Off"),
        }
    }
}

impl std::str::FromStr for MarketRegime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['_', ' '], "-").as_str() {
            "risk-on" | "riskon" | "on" => Ok(Self::RiskOn),
            "neutral" => Ok(Self::Neutral),
            "risk-off" | "riskoff" | "off" => Ok(Self::RiskOff),
            _ => Err(format!("Unknown market regime: {}", s)),
        }
    }
}

/// Benchmark composite used for relative strength.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Benchmark {
    /// Composite 1-day change (%)
    pub change_1d: f64,
    /// Composite 1-week change (%), when known
    #[serde(default)]
    pub change_1w: Option<f64>,
}

impl Benchmark {
    /// Average the 1-day change of the benchmark symbols found in `universe`.
    ///
    /// Returns a flat benchmark when none of them are present.
    pub fn from_universe(universe: &[TickerSnapshot], symbols: &[String]) -> Self {
        let wanted: HashSet<&str> = symbols.iter().map(String::as_str).collect();
        let changes: Vec<f64> = universe
            .iter()
            .filter(|t| wanted.contains(t.symbol.as_str()) && t.is_well_formed())
            .map(TickerSnapshot::change_percent)
            .collect();

        if changes.is_empty() {
            return Self::default();
        }

        Self {
            change_1d: changes.iter().sum::<f64>() / changes.len() as f64,
            change_1w: None,
        }
    }

    /// Fill the 1-week change from the benchmark symbols' history.
    ///
    /// Left `None` when no benchmark symbol has a 1-week change.
    pub fn with_history(mut self, histories: &HashMap<String, History>, symbols: &[String]) -> Self {
        let weeks: Vec<f64> = symbols
            .iter()
            .filter_map(|s| histories.get(s).and_then(|h| h.change_1w))
            .filter(|c| c.is_finite())
            .collect();

        if !weeks.is_empty() {
            self.change_1w = Some(weeks.iter().sum::<f64>() / weeks.len() as f64);
        }
        self
    }
}

// ============================================================================
// Upstream parsing
// ============================================================================

/// Parse a full-market snapshot document into ticker snapshots.
///
/// Expected shape:
/// `{"tickers": [{"ticker", "day": {c,h,l,v,vw}, "prevDay": {c,v}, "lastTrade": {p}}]}`.
/// Entries without a usable price or previous close are skipped.
pub fn parse_market_snapshot(doc: &Value) -> Vec<TickerSnapshot> {
    let Some(rows) = doc.get("tickers").and_then(Value::as_array) else {
        return Vec::new();
    };

    rows.iter().filter_map(parse_snapshot_row).collect()
}

fn parse_snapshot_row(row: &Value) -> Option<TickerSnapshot> {
    let symbol = row.get("ticker")?.as_str()?.to_string();
    let day = row.get("day");
    let prev = row.get("prevDay");

    let num = |obj: Option<&Value>, key: &str| -> Option<f64> {
        obj.and_then(|o| o.get(key))
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite() && *v > 0.0)
    };

    let price = row
        .get("lastTrade")
        .and_then(|t| t.get("p"))
        .and_then(Value::as_f64)
        .filter(|p| *p > 0.0)
        .or_else(|| num(day, "c"))?;
    let prev_close = num(prev, "c")?;

    Some(TickerSnapshot {
        symbol,
        price,
        prev_close,
        volume: num(day, "v").unwrap_or(0.0),
        prev_volume: num(prev, "v"),
        vwap: num(day, "vw"),
        day_high: num(day, "h"),
        day_low: num(day, "l"),
    })
}
