//! Trend-persistence gate.
//!
//! Four boolean gates plus a retest classifier, evaluated only for the top
//! candidates of the selection pool.

use alpha_common::util::round1;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::TpgConfig;
use crate::data::Benchmark;
use crate::scoring::{rsi_proxy, ScoredTicker};

// ============================================================================
// Types
// ============================================================================

/// Where price sits relative to VWAP and the prior close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetestStatus {
    /// Above VWAP with no pullback yet
    FirstBreak,
    /// Below VWAP but above the prior close
    Pullback,
    /// Above VWAP after the low touched it
    RetestOk,
    /// Below VWAP and the prior close
    Fail,
    /// No VWAP or prior close
    NoData,
}

impl fmt::Display for RetestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstBreak => write!(f, "FIRST_BREAK"),
            Self::Pullback => write!(f, "PULLBACK"),
            Self::RetestOk => write!(f, "RETEST_OK"),
            Self::Fail => write!(f, "FAIL"),
            Self::NoData => write!(f, "NO_DATA"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TpgGates {
    pub near_high: bool,
    pub retest_recovery: bool,
    pub relative_strength: bool,
    pub peer_sync: bool,
}

impl TpgGates {
    pub fn count(&self) -> u8 {
        [self.near_high, self.retest_recovery, self.relative_strength, self.peer_sync]
            .iter()
            .filter(|g| **g)
            .count() as u8
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TpgResult {
    pub passed: bool,
    /// Number of gates passed (0..=4)
    pub score: u8,
    pub gates: TpgGates,
    pub retest_status: RetestStatus,
    pub rs_composite: f64,
    /// Score adjustment in `[0, 30]`
    pub adjustment: f64,
}

// ============================================================================
// Evaluation
// ============================================================================

/// Evaluate the gate for one ticker.
pub fn evaluate(ticker: &ScoredTicker, benchmark: &Benchmark, config: &TpgConfig) -> TpgResult {
    let snap = &ticker.snapshot;
    let change = snap.change_percent();
    let rs = relative_strength(ticker, benchmark);

    let reference_high = ticker
        .history
        .as_ref()
        .and_then(|h| h.reference_high)
        .or(snap.day_high)
        .filter(|h| *h > 0.0);

    let near_high = reference_high
        .map(|high| snap.price >= high * (1.0 - config.near_high_pct / 100.0))
        .unwrap_or(false);

    let retest_recovery = match (snap.day_high, snap.day_low, snap.vwap) {
        (Some(high), Some(low), Some(vwap)) if high > 0.0 && low > 0.0 => {
            let pulled_back = (high - low) / high * 100.0 >= config.pullback_pct;
            let recovered = (snap.price / low - 1.0) * 100.0 >= config.recovery_pct;
            pulled_back && recovered && snap.price > vwap
        }
        _ => false,
    };

    let gates = TpgGates {
        near_high,
        retest_recovery,
        relative_strength: rs > 0.0,
        peer_sync: change > 0.0 && rs > 0.0,
    };

    let retest_status = retest_status(ticker, config);
    let score = gates.count();
    let adjustment = adjustment(ticker, &gates, retest_status, rs, config);

    TpgResult {
        passed: score >= config.pass_gates,
        score,
        gates,
        retest_status,
        rs_composite: round1(rs),
        adjustment,
    }
}

/// Relative strength vs. the benchmark, blended with the 1-week spread when
/// both weeks are known.
pub fn relative_strength(ticker: &ScoredTicker, benchmark: &Benchmark) -> f64 {
    let day_spread = ticker.snapshot.change_percent() - benchmark.change_1d;
    let week_spread = ticker
        .history
        .as_ref()
        .and_then(|h| h.change_1w)
        .zip(benchmark.change_1w)
        .map(|(own, bench)| own - bench);

    match week_spread {
        Some(week) => 0.7 * day_spread + 0.3 * week,
        None => day_spread,
    }
}

/// Classify the intraday retest state.
pub fn retest_status(ticker: &ScoredTicker, config: &TpgConfig) -> RetestStatus {
    let snap = &ticker.snapshot;
    let Some(vwap) = snap.vwap.filter(|v| *v > 0.0) else {
        return RetestStatus::NoData;
    };
    if snap.prev_close <= 0.0 {
        return RetestStatus::NoData;
    }

    if snap.price > vwap {
        let touched_vwap = snap.day_low.is_some_and(|low| low <= vwap);
        let ranged = snap
            .intraday_range_pct()
            .is_some_and(|range| range >= config.pullback_pct);
        if touched_vwap && ranged {
            RetestStatus::RetestOk
        } else {
            RetestStatus::FirstBreak
        }
    } else if snap.price > snap.prev_close {
        RetestStatus::Pullback
    } else {
        RetestStatus::Fail
    }
}

fn adjustment(
    ticker: &ScoredTicker,
    gates: &TpgGates,
    retest: RetestStatus,
    rs: f64,
    config: &TpgConfig,
) -> f64 {
    let mut value = 5.0 * f64::from(gates.count());

    value += match retest {
        RetestStatus::RetestOk => 5.0,
        RetestStatus::FirstBreak => -10.0,
        RetestStatus::Fail => -5.0,
        RetestStatus::Pullback | RetestStatus::NoData => 0.0,
    };

    if rs > config.strong_rs {
        value += 5.0;
    } else if rs > 0.0 {
        value += 2.0;
    }

    let change_1w = ticker.history.as_ref().and_then(|h| h.change_1w);
    let rsi = rsi_proxy(ticker.snapshot.change_percent(), change_1w);
    if !(20.0..=80.0).contains(&rsi) {
        value -= 5.0;
    } else if !(30.0..=70.0).contains(&rsi) {
        value -= 2.0;
    }

    if ticker
        .snapshot
        .volume_ratio()
        .is_some_and(|ratio| ratio < config.stale_volume_ratio)
    {
        value -= 3.0;
    }

    value.clamp(0.0, 30.0)
}
