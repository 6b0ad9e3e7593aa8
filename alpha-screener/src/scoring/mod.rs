//! Five-factor scoring.
//!
//! A pure function from a snapshot (plus optional options analytics and
//! history) to a [`ScoredTicker`]:
//!
//! | factor    | drivers                                          |
//! |-----------|--------------------------------------------------|
//! | momentum  | day change, volume surprise                      |
//! | options   | OI skew, gamma sign, walls, max pain (or proxy)  |
//! | structure | price vs VWAP, position in the day range         |
//! | regime    | macro regime label                               |
//! | risk      | RSI-proxy distance from 50                       |
//!
//! Each factor is clamped to `[0, 20]` and rounded to one decimal;
//! `alphaScore` is their rounded sum.

mod decision;
mod horizon;
mod types;

pub use decision::{decide, gate_status};
pub use horizon::{blend, month_score, week_score};
pub use types::{
    Action, Decision, Eligibility, EntryState, GateReason, GateStatus, MultiTimeframe, Ranking,
    ScoredTicker, SubScores, Trigger, Velocity,
};

use alpha_common::util::round1;
use thiserror::Error;

use crate::data::{History, MarketRegime, TickerSnapshot};
use crate::options::{OptionsAnalytics, OptionsMetrics, OptionsStatus};

/// Allowed gap between the factor sum and `alphaScore`.
pub const SUM_TOLERANCE: f64 = 0.11;

const FACTOR_MAX: f64 = 20.0;

// ============================================================================
// Errors
// ============================================================================

/// Integrity violations raised while scoring.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    #[error("{symbol}: snapshot has non-positive or non-finite fields")]
    InvalidSnapshot { symbol: String },

    #[error("{symbol}: sub-scores sum to {sum} but alphaScore is {alpha}")]
    SubScoreMismatch { symbol: String, sum: f64, alpha: f64 },

    #[error("{symbol}: strict scoring requires OK options, got {status}")]
    OptionsNotOk { symbol: String, status: OptionsStatus },
}

/// Scoring strictness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoringMode {
    /// Options may be missing; a volatility proxy stands in
    #[default]
    Standard,
    /// Options must be `OK` (batch reports)
    Strict,
}

// ============================================================================
// Scoring
// ============================================================================

/// Score one ticker.
pub fn score_ticker(
    snapshot: &TickerSnapshot,
    regime: MarketRegime,
    options: Option<&OptionsAnalytics>,
    history: Option<&History>,
    mode: ScoringMode,
) -> Result<ScoredTicker, ScoringError> {
    if !snapshot.is_well_formed() {
        return Err(ScoringError::InvalidSnapshot {
            symbol: snapshot.symbol.clone(),
        });
    }

    let options = options.cloned().unwrap_or_default();
    if mode == ScoringMode::Strict && !options.is_ok() {
        return Err(ScoringError::OptionsNotOk {
            symbol: snapshot.symbol.clone(),
            status: options.status(),
        });
    }

    let change = snapshot.change_percent();
    let change_1w = history.and_then(|h| h.change_1w).filter(|c| c.is_finite());

    let sub_scores = SubScores {
        momentum: factor(momentum_raw(snapshot, change)),
        options: factor(options_raw(snapshot, change, &options)),
        structure: factor(structure_raw(snapshot)),
        regime: factor(regime_raw(regime, change)),
        risk: factor(risk_raw(change, change_1w)),
    };
    let alpha_score = round1(sub_scores.sum());

    let sum = sub_scores.sum();
    if !((sum - alpha_score).abs() <= SUM_TOLERANCE) {
        return Err(ScoringError::SubScoreMismatch {
            symbol: snapshot.symbol.clone(),
            sum,
            alpha: alpha_score,
        });
    }

    let velocity = velocity(sub_scores.momentum);
    let multi_tf = blend(alpha_score, history);
    let gates = gate_status(alpha_score, &sub_scores, options.status());
    let decision = decide(alpha_score, &gates, options.status(), &multi_tf);

    Ok(ScoredTicker {
        snapshot: snapshot.clone(),
        change_percent: round1(change),
        history: history.cloned(),
        options,
        sub_scores,
        alpha_score,
        velocity,
        multi_tf,
        gate_status: gates,
        decision,
        ranking: Ranking {
            power_score: alpha_score,
            final_score: alpha_score,
            ..Ranking::default()
        },
    })
}

/// Re-check the factor sum of an already scored ticker.
pub fn verify_sum(ticker: &ScoredTicker) -> Result<(), ScoringError> {
    let sum = ticker.sub_scores.sum();
    if (sum - ticker.alpha_score).abs() <= SUM_TOLERANCE {
        Ok(())
    } else {
        Err(ScoringError::SubScoreMismatch {
            symbol: ticker.symbol().to_string(),
            sum,
            alpha: ticker.alpha_score,
        })
    }
}

fn factor(raw: f64) -> f64 {
    if raw.is_finite() {
        round1(raw.clamp(0.0, FACTOR_MAX))
    } else {
        0.0
    }
}

fn velocity(momentum: f64) -> Velocity {
    if momentum >= 13.0 {
        Velocity::Up
    } else if momentum <= 7.0 {
        Velocity::Down
    } else {
        Velocity::Flat
    }
}

// ============================================================================
// Factors
// ============================================================================

fn momentum_raw(snapshot: &TickerSnapshot, change: f64) -> f64 {
    let volume_surprise = snapshot
        .volume_ratio()
        .map(|ratio| ((ratio - 1.0) * 5.0).clamp(-3.0, 5.0))
        .unwrap_or(0.0);
    10.0 + 1.5 * change + volume_surprise
}

fn options_raw(snapshot: &TickerSnapshot, change: f64, options: &OptionsAnalytics) -> f64 {
    match options.metrics() {
        Some(metrics) if options.is_ok() => chain_score(snapshot.price, metrics),
        _ => {
            let range = snapshot.intraday_range_pct().unwrap_or_else(|| change.abs());
            (12.0 - range).clamp(4.0, 12.0)
        }
    }
}

fn chain_score(price: f64, metrics: &OptionsMetrics) -> f64 {
    let mut score = 10.0;

    if let Some(pcr) = metrics.put_call_oi_ratio {
        score += if pcr < 0.7 {
            4.0
        } else if pcr < 1.0 {
            2.0
        } else if pcr > 1.3 {
            -4.0
        } else {
            -1.0
        };
    }

    match metrics.net_gex {
        Some(gex) if gex > 0.0 => score += 2.0,
        Some(gex) if gex < 0.0 => score -= 1.0,
        _ => {}
    }

    if let Some(wall) = metrics.call_wall.filter(|w| *w > price) {
        let headroom_pct = (wall / price - 1.0) * 100.0;
        score += (headroom_pct * 0.5).min(4.0);
    }

    if let Some(floor) = metrics.put_floor.filter(|f| *f <= price) {
        if (price - floor) / price * 100.0 <= 5.0 {
            score += 2.0;
        }
    }

    if let Some(pain) = metrics.max_pain {
        score += if price >= pain { 1.0 } else { -1.0 };
    }

    score
}

fn structure_raw(snapshot: &TickerSnapshot) -> f64 {
    let vwap_term = snapshot
        .vwap
        .filter(|v| *v > 0.0)
        .map(|vwap| (2.0 * (snapshot.price / vwap - 1.0) * 100.0).clamp(-6.0, 6.0))
        .unwrap_or(0.0);
    let range_term = (snapshot.day_range_position().unwrap_or(0.5) - 0.5) * 8.0;
    10.0 + vwap_term + range_term
}

fn regime_raw(regime: MarketRegime, change: f64) -> f64 {
    match regime {
        MarketRegime::RiskOn => 16.0,
        MarketRegime::Neutral => 10.0,
        MarketRegime::RiskOff if change > 0.0 => 6.0,
        MarketRegime::RiskOff => 4.0,
    }
}

/// RSI proxy in `[0, 100]`.
pub fn rsi_proxy(change_1d: f64, change_1w: Option<f64>) -> f64 {
    (50.0 + 4.0 * change_1d + change_1w.unwrap_or(0.0)).clamp(0.0, 100.0)
}

fn risk_raw(change: f64, change_1w: Option<f64>) -> f64 {
    (rsi_proxy(change, change_1w) - 50.0).abs() * 0.4
}
