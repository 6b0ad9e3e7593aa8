//! Scored ticker model.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::amplifier::QualityTier;
use crate::data::{History, TickerSnapshot};
use crate::options::OptionsAnalytics;
use crate::tpg::TpgResult;

// ============================================================================
// Sub-scores
// ============================================================================

/// The five scoring factors, each in `[0, 20]` with one decimal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub momentum: f64,
    pub options: f64,
    pub structure: f64,
    pub regime: f64,
    pub risk: f64,
}

impl SubScores {
    pub fn sum(&self) -> f64 {
        self.momentum + self.options + self.structure + self.regime + self.risk
    }
}

// ============================================================================
// Velocity
// ============================================================================

/// Direction of the momentum factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Velocity {
    #[serde(rename = "▲")]
    Up,
    #[serde(rename = "►")]
    Flat,
    #[serde(rename = "▼")]
    Down,
}

impl Velocity {
    /// Signed weight used when ranking high-risk candidates.
    pub fn sign(&self) -> f64 {
        match self {
            Self::Up => 1.0,
            Self::Flat => 0.0,
            Self::Down => -1.0,
        }
    }
}

impl fmt::Display for Velocity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "▲"),
            Self::Flat => write!(f, "►"),
            Self::Down => write!(f, "▼"),
        }
    }
}

// ============================================================================
// Multi-timeframe
// ============================================================================

/// 1D/1W/1M horizon blend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiTimeframe {
    #[serde(rename = "score1D")]
    pub score_1d: f64,
    #[serde(rename = "score1W", default)]
    pub score_1w: Option<f64>,
    #[serde(rename = "score1M", default)]
    pub score_1m: Option<f64>,
    pub blended: f64,
    /// Composition weights, e.g. "50/30/20"
    pub weights: String,
    #[serde(rename = "fallbackReason", default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl MultiTimeframe {
    /// Whether either longer horizon is above `threshold`.
    pub fn longer_horizon_above(&self, threshold: f64) -> bool {
        self.score_1w.is_some_and(|s| s > threshold) || self.score_1m.is_some_and(|s| s > threshold)
    }
}

// ============================================================================
// Gate status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Eligibility {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryState {
    Pass,
    Wait,
    Fail,
}

/// Why a ticker is not (yet) an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GateReason {
    #[serde(rename = "SCORE_LT_40")]
    ScoreBelow40,
    #[serde(rename = "OPTIONS_FAILED")]
    OptionsFailed,
    #[serde(rename = "OPTIONS_PENDING")]
    OptionsPending,
    #[serde(rename = "SCORE_LT_60")]
    ScoreBelow60,
    #[serde(rename = "MOMENTUM_LT_12")]
    MomentumBelow12,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateStatus {
    pub eligible: Eligibility,
    pub entry_now: EntryState,
    /// At most three reason codes
    pub reasons: Vec<GateReason>,
}

impl GateStatus {
    pub fn is_eligible(&self) -> bool {
        self.eligible == Eligibility::Pass
    }
}

// ============================================================================
// Decision
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Maintain,
    Caution,
    Exit,
    Replace,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Maintain => write!(f, "MAINTAIN"),
            Self::Caution => write!(f, "CAUTION"),
            Self::Exit => write!(f, "EXIT"),
            Self::Replace => write!(f, "REPLACE"),
        }
    }
}

/// Code naming what drove a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trigger {
    #[serde(rename = "SCORE_LT_40")]
    ScoreBelow40,
    #[serde(rename = "OPTIONS_FAILED")]
    OptionsFailed,
    #[serde(rename = "ENTRY_PASS")]
    EntryPass,
    #[serde(rename = "MTF_CONFIRM")]
    MtfConfirm,
    #[serde(rename = "MTF_STRONG")]
    MtfStrong,
    #[serde(rename = "ENTRY_WAIT")]
    EntryWait,
    #[serde(rename = "TIME_STOP")]
    TimeStop,
}

/// Single source of truth for what to do with a ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    /// 1..=99
    pub confidence: u8,
    /// At most three trigger codes
    pub triggers: Vec<Trigger>,
}

// ============================================================================
// Ranking (post-scoring adjustments)
// ============================================================================

/// Adjustments applied after scoring. `alphaScore` is never touched; every
/// later stage writes here instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ranking {
    #[serde(default)]
    pub continuity_bonus: f64,
    #[serde(default)]
    pub is_boosted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_tier: Option<QualityTier>,
    #[serde(default)]
    pub power_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tpg: Option<TpgResult>,
    #[serde(default)]
    pub tpg_adjustment: f64,
    /// Score used for ordering
    #[serde(default)]
    pub final_score: f64,
}

// ============================================================================
// Scored Ticker
// ============================================================================

/// A snapshot with its decomposed score and decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredTicker {
    #[serde(flatten)]
    pub snapshot: TickerSnapshot,
    pub change_percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<History>,
    pub options: OptionsAnalytics,
    pub sub_scores: SubScores,
    pub alpha_score: f64,
    pub velocity: Velocity,
    #[serde(rename = "multiTF")]
    pub multi_tf: MultiTimeframe,
    pub gate_status: GateStatus,
    #[serde(rename = "decisionSSOT")]
    pub decision: Decision,
    #[serde(default)]
    pub ranking: Ranking,
}

impl ScoredTicker {
    pub fn symbol(&self) -> &str {
        &self.snapshot.symbol
    }

    pub fn is_eligible(&self) -> bool {
        self.gate_status.is_eligible()
    }

    pub fn entry_passes(&self) -> bool {
        self.gate_status.entry_now == EntryState::Pass
    }
}
