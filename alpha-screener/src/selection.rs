//! Final selection engine.
//!
//! Shapes the amplified candidates into 3 ALPHA + 7 CORE + 2 HIGH_RISK:
//!
//! 1. Pool: incumbents still present, at most N challengers, then backfill
//!    from the excluded challengers until the pool is full
//! 2. TPG on the pool leaders, adjustment added to the final score
//! 3. ALPHA: first TPG-passed candidates that are not a first break
//!    (pure score order with a fallback flag when too few qualify)
//! 4. HIGH_RISK: largest velocity-weighted momentum plus absolute move
//! 5. CORE: the rest by score

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{SelectionConfig, TpgConfig};
use crate::data::Benchmark;
use crate::scoring::ScoredTicker;
use crate::tpg::{self, RetestStatus};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Alpha,
    Core,
    HighRisk,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alpha => write!(f, "ALPHA"),
            Self::Core => write!(f, "CORE"),
            Self::HighRisk => write!(f, "HIGH_RISK"),
        }
    }
}

/// One ranked, role-tagged entry of the shortlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedItem {
    pub rank: usize,
    pub role: Role,
    #[serde(flatten)]
    pub ticker: ScoredTicker,
    pub tpg_passed: bool,
    pub is_incumbent: bool,
    pub backfilled: bool,
}

impl SelectedItem {
    pub fn symbol(&self) -> &str {
        self.ticker.symbol()
    }
}

/// Output of the selection engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalSelection {
    pub items: Vec<SelectedItem>,
    /// ALPHA picks came from pure score order
    pub top3_fallback: bool,
    /// Fewer items than the full shape
    pub partial: bool,
    pub new_entrants_admitted: usize,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl FinalSelection {
    pub fn by_role(&self, role: Role) -> impl Iterator<Item = &SelectedItem> {
        self.items.iter().filter(move |i| i.role == role)
    }

    pub fn count(&self, role: Role) -> usize {
        self.by_role(role).count()
    }

    /// ALPHA symbols in rank order.
    pub fn top3(&self) -> Vec<String> {
        self.by_role(Role::Alpha).map(|i| i.symbol().to_string()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SelectionError {
    #[error("only {available} eligible candidates, at least {floor} required")]
    UnderSupply { available: usize, floor: usize },
}

// ============================================================================
// Ordering
// ============================================================================

/// Final score desc, alpha desc, symbol asc.
pub fn by_final_score(a: &ScoredTicker, b: &ScoredTicker) -> Ordering {
    b.ranking
        .final_score
        .total_cmp(&a.ranking.final_score)
        .then_with(|| b.alpha_score.total_cmp(&a.alpha_score))
        .then_with(|| a.symbol().cmp(b.symbol()))
}

/// `|velocity-weighted momentum| + |change%|`.
pub fn high_risk_metric(ticker: &ScoredTicker) -> f64 {
    (ticker.velocity.sign() * ticker.sub_scores.momentum).abs() + ticker.change_percent.abs()
}

struct PoolEntry {
    ticker: ScoredTicker,
    is_incumbent: bool,
    backfilled: bool,
}

// ============================================================================
// Engine
// ============================================================================

/// Select the shortlist.
pub fn select(
    candidates: Vec<ScoredTicker>,
    incumbents: &[String],
    benchmark: &Benchmark,
    config: &SelectionConfig,
    tpg_config: &TpgConfig,
) -> Result<FinalSelection, SelectionError> {
    let total = config.total_slots();
    let incumbent_set: HashSet<&str> = incumbents.iter().map(String::as_str).collect();

    let mut eligible: Vec<ScoredTicker> = candidates.into_iter().filter(ScoredTicker::is_eligible).collect();
    eligible.sort_by(by_final_score);

    let (held, challengers): (Vec<ScoredTicker>, Vec<ScoredTicker>) = eligible
        .into_iter()
        .partition(|t| incumbent_set.contains(t.symbol()));

    let mut pool: Vec<PoolEntry> = held
        .into_iter()
        .map(|ticker| PoolEntry {
            ticker,
            is_incumbent: true,
            backfilled: false,
        })
        .collect();

    let mut challengers = challengers.into_iter();
    let mut new_entrants_admitted = 0;
    for ticker in challengers.by_ref().take(config.max_new_entrants) {
        new_entrants_admitted += 1;
        pool.push(PoolEntry {
            ticker,
            is_incumbent: false,
            backfilled: false,
        });
    }
    for ticker in challengers {
        if pool.len() >= total {
            break;
        }
        pool.push(PoolEntry {
            ticker,
            is_incumbent: false,
            backfilled: true,
        });
    }

    if pool.len() < config.min_candidates {
        return Err(SelectionError::UnderSupply {
            available: pool.len(),
            floor: config.min_candidates,
        });
    }

    pool.sort_by(|a, b| by_final_score(&a.ticker, &b.ticker));
    pool.truncate(total);

    for entry in pool.iter_mut().take(tpg_config.candidates) {
        let result = tpg::evaluate(&entry.ticker, benchmark, tpg_config);
        let ranking = &mut entry.ticker.ranking;
        ranking.tpg_adjustment = result.adjustment;
        ranking.final_score += result.adjustment;
        ranking.tpg = Some(result);
    }
    pool.sort_by(|a, b| by_final_score(&a.ticker, &b.ticker));

    let mut warnings = Vec::new();

    let qualifies = |entry: &PoolEntry| {
        entry
            .ticker
            .ranking
            .tpg
            .as_ref()
            .is_some_and(|r| r.passed && r.retest_status != RetestStatus::FirstBreak)
    };

    let qualified: Vec<usize> = pool
        .iter()
        .enumerate()
        .filter(|(_, e)| qualifies(*e))
        .map(|(i, _)| i)
        .take(config.alpha_slots)
        .collect();

    let top3_fallback = qualified.len() < config.alpha_slots;
    let alpha_idx: Vec<usize> = if top3_fallback {
        let msg = format!(
            "Only {} TPG-qualified candidates; ALPHA picks fall back to score order",
            qualified.len()
        );
        warn!("{}", msg);
        warnings.push(msg);
        (0..config.alpha_slots.min(pool.len())).collect()
    } else {
        qualified
    };

    let mut slots: Vec<Option<PoolEntry>> = pool.into_iter().map(Some).collect();
    let mut alpha: Vec<PoolEntry> = alpha_idx.iter().filter_map(|i| slots[*i].take()).collect();
    alpha.sort_by(|a, b| by_final_score(&a.ticker, &b.ticker));

    let mut rest: Vec<PoolEntry> = slots.into_iter().flatten().collect();
    rest.sort_by(|a, b| {
        high_risk_metric(&b.ticker)
            .total_cmp(&high_risk_metric(&a.ticker))
            .then_with(|| a.ticker.symbol().cmp(b.ticker.symbol()))
    });
    let hr_count = config.high_risk_slots.min(rest.len());
    let mut core: Vec<PoolEntry> = rest.split_off(hr_count);
    let high_risk = rest;
    core.sort_by(|a, b| by_final_score(&a.ticker, &b.ticker));
    core.truncate(config.core_slots);

    let mut items = Vec::with_capacity(total);
    for (role, group) in [(Role::Alpha, alpha), (Role::Core, core), (Role::HighRisk, high_risk)] {
        for entry in group {
            let tpg_passed = entry.ticker.ranking.tpg.as_ref().is_some_and(|r| r.passed);
            items.push(SelectedItem {
                rank: items.len() + 1,
                role,
                ticker: entry.ticker,
                tpg_passed,
                is_incumbent: entry.is_incumbent,
                backfilled: entry.backfilled,
            });
        }
    }

    let partial = items.len() < total;
    if partial {
        let msg = format!("Partial selection: {} of {} slots filled", items.len(), total);
        warn!("{}", msg);
        warnings.push(msg);
    }

    info!(
        items = items.len(),
        new_entrants = new_entrants_admitted,
        top3_fallback,
        partial,
        "Final selection complete"
    );

    Ok(FinalSelection {
        items,
        top3_fallback,
        partial,
        new_entrants_admitted,
        warnings,
    })
}
