//! Universe sanitizer and preliminary ranker.
//!
//! Implements a small funnel:
//! 1. Symbol filter: special characters, derivative-like suffixes, duplicates
//! 2. Price filter: last price below the floor
//! 3. Liquidity filter: dollar volume below the floor
//!
//! The survivors are scored cheaply (no options, no history) and the top-K
//! become the heavy subset that is allowed to spend on options enrichment.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::{info, warn};

use crate::config::UniverseConfig;
use crate::data::{MarketRegime, TickerSnapshot};
use crate::scoring::{score_ticker, ScoredTicker, ScoringMode};

// ============================================================================
// Filter Stage
// ============================================================================

/// Funnel stage identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterStage {
    Input,
    Symbol,
    Price,
    Liquidity,
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Symbol => write!(f, "symbol"),
            Self::Price => write!(f, "price"),
            Self::Liquidity => write!(f, "liquidity"),
        }
    }
}

/// Result of one funnel stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterResult {
    pub stage: FilterStage,
    pub passed: usize,
    pub eliminated: usize,
    /// Elimination rate (%)
    pub elimination_rate: f64,
}

impl FilterResult {
    pub fn new(stage: FilterStage, input_count: usize, passed_count: usize) -> Self {
        let eliminated = input_count.saturating_sub(passed_count);
        let elimination_rate = if input_count > 0 {
            (eliminated as f64 / input_count as f64) * 100.0
        } else {
            0.0
        };

        Self {
            stage,
            passed: passed_count,
            eliminated,
            elimination_rate,
        }
    }
}

/// Why a symbol was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    SpecialCharacter,
    DerivativeSuffix,
    Duplicate,
    Malformed,
    LowPrice,
    LowDollarVolume,
}

/// Sanitizer funnel report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizeReport {
    pub input: usize,
    pub eligible: usize,
    pub stages: Vec<FilterResult>,
    pub rejected: BTreeMap<RejectReason, usize>,
}

// ============================================================================
// Symbol rules
// ============================================================================

const SPECIAL_CHARACTERS: [char; 3] = ['.', '/', '-'];

/// Suffixes that mark warrants, units and rights on names longer than 4 characters.
const DERIVATIVE_SUFFIXES: [&str; 4] = ["WS", "W", "U", "R"];

/// Classify a symbol that must not enter the universe.
pub fn reject_symbol(symbol: &str) -> Option<RejectReason> {
    if symbol.is_empty() || symbol.chars().any(char::is_whitespace) {
        return Some(RejectReason::Malformed);
    }
    if symbol.contains(SPECIAL_CHARACTERS) {
        return Some(RejectReason::SpecialCharacter);
    }
    if symbol.len() > 4 && DERIVATIVE_SUFFIXES.iter().any(|s| symbol.ends_with(s)) {
        return Some(RejectReason::DerivativeSuffix);
    }
    None
}

// ============================================================================
// Sanitizer
// ============================================================================

/// Drop ineligible tickers.
pub fn sanitize(universe: &[TickerSnapshot], config: &UniverseConfig) -> (Vec<TickerSnapshot>, SanitizeReport) {
    let mut rejected: BTreeMap<RejectReason, usize> = BTreeMap::new();
    let mut reject = |reason: RejectReason| *rejected.entry(reason).or_insert(0) += 1;

    let mut seen = HashSet::new();
    let symbols: Vec<&TickerSnapshot> = universe
        .iter()
        .filter(|t| {
            if let Some(reason) = reject_symbol(&t.symbol) {
                reject(reason);
                return false;
            }
            if !t.is_well_formed() {
                reject(RejectReason::Malformed);
                return false;
            }
            if !seen.insert(t.symbol.as_str()) {
                reject(RejectReason::Duplicate);
                return false;
            }
            true
        })
        .collect();

    let priced: Vec<&TickerSnapshot> = symbols
        .iter()
        .copied()
        .filter(|t| {
            let ok = t.price >= config.min_price;
            if !ok {
                reject(RejectReason::LowPrice);
            }
            ok
        })
        .collect();

    let liquid: Vec<TickerSnapshot> = priced
        .iter()
        .copied()
        .filter(|t| {
            let ok = t.dollar_volume() >= config.min_dollar_volume;
            if !ok {
                reject(RejectReason::LowDollarVolume);
            }
            ok
        })
        .cloned()
        .collect();

    let report = SanitizeReport {
        input: universe.len(),
        eligible: liquid.len(),
        stages: vec![
            FilterResult::new(FilterStage::Input, universe.len(), universe.len()),
            FilterResult::new(FilterStage::Symbol, universe.len(), symbols.len()),
            FilterResult::new(FilterStage::Price, symbols.len(), priced.len()),
            FilterResult::new(FilterStage::Liquidity, priced.len(), liquid.len()),
        ],
        rejected,
    };

    info!(
        input = report.input,
        eligible = report.eligible,
        "Universe sanitized"
    );

    (liquid, report)
}

// ============================================================================
// Preliminary Ranker
// ============================================================================

/// Order by alpha score descending, then symbol ascending.
pub fn by_alpha_then_symbol(a: &ScoredTicker, b: &ScoredTicker) -> Ordering {
    b.alpha_score
        .total_cmp(&a.alpha_score)
        .then_with(|| a.symbol().cmp(b.symbol()))
}

/// Score every ticker options-free and sort.
pub fn preliminary_rank(tickers: &[TickerSnapshot], regime: MarketRegime) -> Vec<ScoredTicker> {
    let mut ranked: Vec<ScoredTicker> = tickers
        .iter()
        .filter_map(|t| match score_ticker(t, regime, None, None, ScoringMode::Standard) {
            Ok(scored) => Some(scored),
            Err(e) => {
                warn!(symbol = %t.symbol, error = %e, "Skipping ticker in preliminary rank");
                None
            }
        })
        .collect();

    ranked.sort_by(by_alpha_then_symbol);
    ranked
}

/// Symbols of the top-K ranked tickers.
pub fn heavy_subset(ranked: &[ScoredTicker], top_k: usize) -> Vec<String> {
    ranked
        .iter()
        .take(top_k)
        .map(|t| t.symbol().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(symbol: &str, price: f64, volume: f64, change_pct: f64) -> TickerSnapshot {
        TickerSnapshot {
            symbol: symbol.into(),
            price,
            prev_close: price / (1.0 + change_pct / 100.0),
            volume,
            prev_volume: Some(volume),
            vwap: Some(price),
            day_high: Some(price * 1.01),
            day_low: Some(price * 0.99),
        }
    }

    #[test]
    fn test_symbol_rules() {
        assert_eq!(reject_symbol("BRK.B"), Some(RejectReason::SpecialCharacter));
        assert_eq!(reject_symbol("BF-B"), Some(RejectReason::SpecialCharacter));
        assert_eq!(reject_symbol("ABCDW"), Some(RejectReason::DerivativeSuffix));
        assert_eq!(reject_symbol("ABCDWS"), Some(RejectReason::DerivativeSuffix));
        assert_eq!(reject_symbol("SPACU"), Some(RejectReason::DerivativeSuffix));
        assert_eq!(reject_symbol("ABCDR"), Some(RejectReason::DerivativeSuffix));
        // Short names keep their trailing letters.
        assert_eq!(reject_symbol("SNOW"), None);
        assert_eq!(reject_symbol("UBER"), None);
        assert_eq!(reject_symbol("NVDA"), None);
        assert_eq!(reject_symbol(""), Some(RejectReason::Malformed));
    }

    #[test]
    fn test_sanitize_funnel() {
        let universe = vec![
            snap("NVDA", 120.0, 1_000_000.0, 1.0),
            snap("BRK.B", 400.0, 1_000_000.0, 0.5),
            snap("PENNY", 3.0, 50_000_000.0, 2.0),
            snap("THIN", 10.0, 100_000.0, 1.0),
            snap("NVDA", 120.0, 1_000_000.0, 1.0),
        ];

        let (kept, report) = sanitize(&universe, &UniverseConfig::default());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].symbol, "NVDA");
        assert_eq!(report.input, 5);
        assert_eq!(report.eligible, 1);
        assert_eq!(report.rejected.get(&RejectReason::SpecialCharacter), Some(&1));
        assert_eq!(report.rejected.get(&RejectReason::Duplicate), Some(&1));
        assert_eq!(report.rejected.get(&RejectReason::LowPrice), Some(&1));
        assert_eq!(report.rejected.get(&RejectReason::LowDollarVolume), Some(&1));
        assert_eq!(report.stages.len(), 4);
        assert_eq!(report.stages[3].eliminated, 1);
    }

    #[test]
    fn test_preliminary_rank_is_deterministic() {
        let tickers = vec![
            snap("BBB", 50.0, 1_000_000.0, 1.0),
            snap("AAA", 50.0, 1_000_000.0, 1.0),
            snap("CCC", 50.0, 1_000_000.0, 3.0),
        ];

        let ranked = preliminary_rank(&tickers, MarketRegime::Neutral);
        let order: Vec<&str> = ranked.iter().map(ScoredTicker::symbol).collect();
        assert_eq!(order, vec!["CCC", "AAA", "BBB"]);
        assert_eq!(heavy_subset(&ranked, 2), vec!["CCC".to_string(), "AAA".to_string()]);
    }
}
