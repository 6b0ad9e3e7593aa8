//! Anti-churn continuity bonus, quality tiers and power score.
//!
//! Runs once per pipeline run, after backfill and before selection. Reads
//! yesterday's decisions and writes only to each ticker's [`Ranking`].

use alpha_common::util::round1;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

use crate::config::AntiChurnConfig;
use crate::data::MarketRegime;
use crate::scoring::{Action, Ranking, ScoredTicker};

// ============================================================================
// Quality Tier
// ============================================================================

/// Quality tier, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualityTier {
    S,
    A,
    B,
    C,
}

impl QualityTier {
    /// Bound the tier so it is no better than `ceiling`.
    pub fn capped_at(self, ceiling: QualityTier) -> QualityTier {
        self.max(ceiling)
    }

    /// Regime-aware power multiplier.
    pub fn multiplier(self, regime: MarketRegime) -> f64 {
        match (regime, self) {
            (MarketRegime::RiskOn, Self::S) => 1.10,
            (MarketRegime::RiskOn, Self::A) => 1.05,
            (MarketRegime::RiskOn, Self::B) => 1.00,
            (MarketRegime::RiskOn, Self::C) => 0.95,
            (MarketRegime::Neutral, Self::S) => 1.06,
            (MarketRegime::Neutral, Self::A) => 1.03,
            (MarketRegime::Neutral, Self::B) => 1.00,
            (MarketRegime::Neutral, Self::C) => 0.97,
            (MarketRegime::RiskOff, Self::S) => 1.03,
            (MarketRegime::RiskOff, Self::A) => 1.00,
            (MarketRegime::RiskOff, Self::B) => 0.97,
            (MarketRegime::RiskOff, Self::C) => 0.92,
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::S => "S",
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        };
        write!(f, "{}", label)
    }
}

/// Assign a tier from the score, options status and gates.
pub fn quality_tier(ticker: &ScoredTicker, regime: MarketRegime, new_entrant: bool) -> QualityTier {
    let alpha = ticker.alpha_score;
    let mut tier = if alpha >= 75.0 && ticker.options.is_ok() && ticker.entry_passes() {
        QualityTier::S
    } else if alpha >= 60.0 && ticker.is_eligible() {
        QualityTier::A
    } else if alpha >= 45.0 {
        QualityTier::B
    } else {
        QualityTier::C
    };

    if !ticker.options.is_ok() {
        tier = tier.capped_at(QualityTier::B);
    }
    if new_entrant && regime == MarketRegime::RiskOff {
        tier = tier.capped_at(QualityTier::A);
    }
    tier
}

/// Power score: `(alpha + bonus) × multiplier(tier, regime)`.
pub fn power_score(alpha: f64, bonus: f64, tier: QualityTier, regime: MarketRegime) -> f64 {
    round1((alpha + bonus) * tier.multiplier(regime))
}

// ============================================================================
// Prior Selection
// ============================================================================

/// What yesterday's report said about a symbol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorEntry {
    pub action: Action,
    pub alpha_score: f64,
}

/// Yesterday's decisions keyed by symbol.
#[derive(Debug, Clone, Default)]
pub struct PriorSelection {
    entries: HashMap<String, PriorEntry>,
}

impl PriorSelection {
    pub fn from_tickers<'a>(tickers: impl IntoIterator<Item = &'a ScoredTicker>) -> Self {
        let entries = tickers
            .into_iter()
            .map(|t| {
                (
                    t.symbol().to_string(),
                    PriorEntry {
                        action: t.decision.action,
                        alpha_score: t.alpha_score,
                    },
                )
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, symbol: &str) -> Option<&PriorEntry> {
        self.entries.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.entries.contains_key(symbol)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Anti-churn
// ============================================================================

/// Continuity bonus for a ticker that held a live decision yesterday.
pub fn continuity_bonus(ticker: &ScoredTicker, prior: &PriorEntry, config: &AntiChurnConfig) -> f64 {
    let base = match prior.action {
        Action::Maintain => config.maintain_bonus,
        Action::Caution => config.caution_bonus,
        Action::Exit | Action::Replace => return 0.0,
    };

    let score_drop = prior.alpha_score - ticker.alpha_score;
    let qualifies = ticker.is_eligible()
        && ticker.decision.confidence >= config.min_confidence
        && score_drop < config.max_score_drop
        && ticker.sub_scores.risk < config.max_risk;

    if qualifies {
        base
    } else {
        0.0
    }
}

/// Outcome of an amplification pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AmplifySummary {
    pub boosted: usize,
    pub new_entrants: usize,
}

/// Apply continuity bonus, tier and power score to every ticker.
pub fn amplify(
    tickers: &mut [ScoredTicker],
    prior: &PriorSelection,
    regime: MarketRegime,
    config: &AntiChurnConfig,
) -> AmplifySummary {
    let mut summary = AmplifySummary::default();

    for ticker in tickers.iter_mut() {
        let previous = prior.get(ticker.symbol());
        let bonus = previous
            .map(|p| continuity_bonus(ticker, p, config))
            .unwrap_or(0.0);
        let new_entrant = previous.is_none();
        let tier = quality_tier(ticker, regime, new_entrant);
        let power = power_score(ticker.alpha_score, bonus, tier, regime);

        if bonus > 0.0 {
            summary.boosted += 1;
            debug!(symbol = %ticker.symbol(), bonus, "Continuity bonus applied");
        }
        if new_entrant {
            summary.new_entrants += 1;
        }

        ticker.ranking = Ranking {
            continuity_bonus: bonus,
            is_boosted: bonus > 0.0,
            quality_tier: Some(tier),
            power_score: power,
            tpg: None,
            tpg_adjustment: 0.0,
            final_score: power,
        };
    }

    info!(
        tickers = tickers.len(),
        boosted = summary.boosted,
        new_entrants = summary.new_entrants,
        regime = %regime,
        "Amplification complete"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TickerSnapshot;
    use crate::options::{OptionsAnalytics, OptionsMetrics};
    use crate::scoring::{score_ticker, ScoringMode};

    fn scored(symbol: &str, price: f64, prev_close: f64, ok: bool) -> ScoredTicker {
        let snapshot = TickerSnapshot {
            symbol: symbol.into(),
            price,
            prev_close,
            volume: 11_000_000.0,
            prev_volume: Some(10_000_000.0),
            vwap: Some(price * 0.99),
            day_high: Some(price * 1.002),
            day_low: Some(price * 0.97),
        };
        let options = ok.then(|| {
            OptionsAnalytics::ok(OptionsMetrics {
                max_pain: Some(price * 0.95),
                net_gex: Some(1.0e9),
                put_call_oi_ratio: Some(0.6),
                call_wall: Some(price * 1.1),
                put_floor: Some(price * 0.98),
            })
        });
        score_ticker(&snapshot, MarketRegime::RiskOn, options.as_ref(), None, ScoringMode::Standard)
            .unwrap()
    }

    #[test]
    fn test_prior_maintain_gets_bonus() {
        let ticker = scored("NVDA", 101.0, 100.0, true);
        assert!(ticker.decision.confidence >= 70);
        assert!(ticker.sub_scores.risk < 18.0);

        let prior = PriorEntry {
            action: Action::Maintain,
            alpha_score: ticker.alpha_score + 5.0,
        };
        let config = AntiChurnConfig::default();
        assert_eq!(continuity_bonus(&ticker, &prior, &config), 5.0);

        let caution = PriorEntry {
            action: Action::Caution,
            ..prior
        };
        assert_eq!(continuity_bonus(&ticker, &caution, &config), 2.0);

        let big_drop = PriorEntry {
            alpha_score: ticker.alpha_score + 12.0,
            ..prior
        };
        assert_eq!(continuity_bonus(&ticker, &big_drop, &config), 0.0);

        let exited = PriorEntry {
            action: Action::Exit,
            ..prior
        };
        assert_eq!(continuity_bonus(&ticker, &exited, &config), 0.0);
    }

    #[test]
    fn test_amplify_marks_boosted() {
        let mut tickers = vec![scored("NVDA", 101.0, 100.0, true), scored("AMD", 101.0, 100.0, true)];
        let prior = PriorSelection::from_tickers(&tickers[..1]);

        let summary = amplify(&mut tickers, &prior, MarketRegime::RiskOn, &AntiChurnConfig::default());
        assert_eq!(summary.boosted, 1);
        assert_eq!(summary.new_entrants, 1);
        assert!(tickers[0].ranking.is_boosted);
        assert_eq!(tickers[0].ranking.continuity_bonus, 5.0);
        assert!(!tickers[1].ranking.is_boosted);
        assert!(tickers[0].ranking.final_score > tickers[1].ranking.final_score);
    }

    #[test]
    fn test_tier_caps() {
        let without_options = scored("AMD", 103.0, 100.0, false);
        assert!(quality_tier(&without_options, MarketRegime::RiskOn, false) >= QualityTier::B);

        let with_options = scored("AMD", 103.0, 100.0, true);
        let tier = quality_tier(&with_options, MarketRegime::RiskOff, true);
        assert!(tier >= QualityTier::A);
    }

    #[test]
    fn test_power_score_preserves_order_within_tier() {
        for regime in [MarketRegime::RiskOn, MarketRegime::Neutral, MarketRegime::RiskOff] {
            let high = power_score(72.0, 0.0, QualityTier::A, regime);
            let low = power_score(70.0, 0.0, QualityTier::A, regime);
            assert!(high > low);
        }
        assert_eq!(power_score(50.0, 5.0, QualityTier::B, MarketRegime::Neutral), 55.0);
    }
}
