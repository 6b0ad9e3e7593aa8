//! Screener configuration.
//!
//! Decoded from the opaque `screener` block of `~/.alpha-shortlist/config.json`.
//! Every threshold is a named, overridable parameter with a default.

use alpha_common::{Config, Error, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// Main Screener Configuration
// ============================================================================

/// Configuration for the shortlist pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenerConfig {
    #[serde(default)]
    pub universe: UniverseConfig,

    #[serde(default)]
    pub backfill: BackfillConfig,

    #[serde(default)]
    pub anti_churn: AntiChurnConfig,

    #[serde(default)]
    pub tpg: TpgConfig,

    #[serde(default)]
    pub selection: SelectionConfig,

    #[serde(default)]
    pub tracker: TrackerConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

impl ScreenerConfig {
    /// Decode the `screener` block of the shared config, or use defaults.
    pub fn from_config(config: &Config) -> Result<Self> {
        match &config.screener {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| Error::Config(format!("Invalid screener config: {}", e))),
            None => Ok(Self::default()),
        }
    }
}

// ============================================================================
// Universe
// ============================================================================

/// Sanitizer and preliminary ranker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseConfig {
    /// Size of the heavy subset sent to options enrichment
    #[serde(default = "default_heavy_top_k")]
    pub heavy_top_k: usize,

    /// Minimum last price (USD)
    #[serde(default = "default_min_price")]
    pub min_price: f64,

    /// Minimum price × volume (USD)
    #[serde(default = "default_min_dollar_volume")]
    pub min_dollar_volume: f64,

    /// Eligible tickers required in production before any spend
    #[serde(default = "default_min_eligible")]
    pub min_eligible: usize,

    /// Symbols averaged into the relative-strength benchmark
    #[serde(default = "default_benchmark_symbols")]
    pub benchmark_symbols: Vec<String>,

    /// Calendar days of daily bars requested for 1W/1M history
    #[serde(default = "default_history_lookback_days")]
    pub history_lookback_days: i64,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            heavy_top_k: default_heavy_top_k(),
            min_price: default_min_price(),
            min_dollar_volume: default_min_dollar_volume(),
            min_eligible: default_min_eligible(),
            benchmark_symbols: default_benchmark_symbols(),
            history_lookback_days: default_history_lookback_days(),
        }
    }
}

fn default_heavy_top_k() -> usize {
    60
}

fn default_min_price() -> f64 {
    5.0
}

fn default_min_dollar_volume() -> f64 {
    20_000_000.0
}

fn default_min_eligible() -> usize {
    50
}

fn default_benchmark_symbols() -> Vec<String> {
    vec!["SPY".to_string(), "QQQ".to_string()]
}

fn default_history_lookback_days() -> i64 {
    45 // enough calendar days for 21 sessions
}

// ============================================================================
// Backfill
// ============================================================================

/// Round loop and cost settings for options enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackfillConfig {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Target spacing between round starts (seconds)
    #[serde(default = "default_round_interval_secs")]
    pub round_interval_secs: u64,

    /// Deadline for one ticker's chain fetch (milliseconds)
    #[serde(default = "default_per_ticker_timeout_ms")]
    pub per_ticker_timeout_ms: u64,

    /// Worker pool size within a round
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Upstream calls allowed per run
    #[serde(default = "default_request_budget")]
    pub request_budget: u64,

    /// Fetch daily bars for the heavy subset
    #[serde(default = "default_true")]
    pub fetch_history: bool,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            round_interval_secs: default_round_interval_secs(),
            per_ticker_timeout_ms: default_per_ticker_timeout_ms(),
            concurrency: default_concurrency(),
            request_budget: default_request_budget(),
            fetch_history: true,
        }
    }
}

fn default_max_rounds() -> u32 {
    20
}

fn default_round_interval_secs() -> u64 {
    20
}

fn default_per_ticker_timeout_ms() -> u64 {
    60_000
}

fn default_concurrency() -> usize {
    3
}

fn default_request_budget() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Anti-churn
// ============================================================================

/// Continuity bonus thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntiChurnConfig {
    /// Minimum current confidence
    #[serde(default = "default_min_confidence")]
    pub min_confidence: u8,

    /// Score drop (previous − current) must stay below this
    #[serde(default = "default_max_score_drop")]
    pub max_score_drop: f64,

    /// Current risk sub-score must stay below this
    #[serde(default = "default_max_risk")]
    pub max_risk: f64,

    /// Bonus when the previous action was MAINTAIN
    #[serde(default = "default_maintain_bonus")]
    pub maintain_bonus: f64,

    /// Bonus when the previous action was CAUTION
    #[serde(default = "default_caution_bonus")]
    pub caution_bonus: f64,
}

impl Default for AntiChurnConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            max_score_drop: default_max_score_drop(),
            max_risk: default_max_risk(),
            maintain_bonus: default_maintain_bonus(),
            caution_bonus: default_caution_bonus(),
        }
    }
}

fn default_min_confidence() -> u8 {
    70
}

fn default_max_score_drop() -> f64 {
    12.0
}

fn default_max_risk() -> f64 {
    18.0
}

fn default_maintain_bonus() -> f64 {
    5.0
}

fn default_caution_bonus() -> f64 {
    2.0
}

// ============================================================================
// Trend-persistence gate
// ============================================================================

/// Gate thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TpgConfig {
    /// How many pool leaders are evaluated
    #[serde(default = "default_tpg_candidates")]
    pub candidates: usize,

    /// Max distance below the reference high (%)
    #[serde(default = "default_near_high_pct")]
    pub near_high_pct: f64,

    /// Minimum high-to-low pullback (%)
    #[serde(default = "default_pullback_pct")]
    pub pullback_pct: f64,

    /// Minimum recovery off the low (%)
    #[serde(default = "default_recovery_pct")]
    pub recovery_pct: f64,

    /// Gates required to pass
    #[serde(default = "default_pass_gates")]
    pub pass_gates: u8,

    /// Relative strength earning the full RS bonus
    #[serde(default = "default_strong_rs")]
    pub strong_rs: f64,

    /// Volume ratio below which the catalyst is stale
    #[serde(default = "default_stale_volume_ratio")]
    pub stale_volume_ratio: f64,
}

impl Default for TpgConfig {
    fn default() -> Self {
        Self {
            candidates: default_tpg_candidates(),
            near_high_pct: default_near_high_pct(),
            pullback_pct: default_pullback_pct(),
            recovery_pct: default_recovery_pct(),
            pass_gates: default_pass_gates(),
            strong_rs: default_strong_rs(),
            stale_volume_ratio: default_stale_volume_ratio(),
        }
    }
}

fn default_tpg_candidates() -> usize {
    10
}

fn default_near_high_pct() -> f64 {
    5.0
}

fn default_pullback_pct() -> f64 {
    1.0
}

fn default_recovery_pct() -> f64 {
    0.5
}

fn default_pass_gates() -> u8 {
    2
}

fn default_strong_rs() -> f64 {
    2.0
}

fn default_stale_volume_ratio() -> f64 {
    0.8
}

// ============================================================================
// Selection
// ============================================================================

/// Final selection shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    #[serde(default = "default_alpha_slots")]
    pub alpha_slots: usize,

    #[serde(default = "default_core_slots")]
    pub core_slots: usize,

    #[serde(default = "default_high_risk_slots")]
    pub high_risk_slots: usize,

    /// Challengers admitted to the pool before backfill
    #[serde(default = "default_max_new_entrants")]
    pub max_new_entrants: usize,

    /// Below this many candidates the run aborts
    #[serde(default = "default_min_candidates")]
    pub min_candidates: usize,
}

impl SelectionConfig {
    pub fn total_slots(&self) -> usize {
        self.alpha_slots + self.core_slots + self.high_risk_slots
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            alpha_slots: default_alpha_slots(),
            core_slots: default_core_slots(),
            high_risk_slots: default_high_risk_slots(),
            max_new_entrants: default_max_new_entrants(),
            min_candidates: default_min_candidates(),
        }
    }
}

fn default_alpha_slots() -> usize {
    3
}

fn default_core_slots() -> usize {
    7
}

fn default_high_risk_slots() -> usize {
    2
}

fn default_max_new_entrants() -> usize {
    3
}

fn default_min_candidates() -> usize {
    6
}

// ============================================================================
// Tracker
// ============================================================================

/// Time-stop policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Default first target above the entry price (%)
    #[serde(default = "default_target_pct")]
    pub target_pct: f64,

    /// Volume ratio below which a day counts as fading
    #[serde(default = "default_fade_volume_ratio")]
    pub fade_volume_ratio: f64,

    /// Pressure added on a fading day
    #[serde(default = "default_fade_pressure")]
    pub fade_pressure: u32,

    /// Extra pressure from day 2 on
    #[serde(default = "default_followup_pressure")]
    pub followup_pressure: u32,

    /// Pressure at which a Top-3 member is marked REPLACE
    #[serde(default = "default_rotation_threshold")]
    pub rotation_threshold: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            target_pct: default_target_pct(),
            fade_volume_ratio: default_fade_volume_ratio(),
            fade_pressure: default_fade_pressure(),
            followup_pressure: default_followup_pressure(),
            rotation_threshold: default_rotation_threshold(),
        }
    }
}

fn default_target_pct() -> f64 {
    5.0
}

fn default_fade_volume_ratio() -> f64 {
    0.8
}

fn default_fade_pressure() -> u32 {
    3
}

fn default_followup_pressure() -> u32 {
    2
}

fn default_rotation_threshold() -> u32 {
    8
}

// ============================================================================
// Report
// ============================================================================

/// Report persistence settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Report kind (sub-directory in the report store)
    #[serde(default = "default_report_kind")]
    pub kind: String,

    /// Also write a Markdown rendering next to the JSON
    #[serde(default = "default_true")]
    pub markdown: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            kind: default_report_kind(),
            markdown: true,
        }
    }
}

fn default_report_kind() -> String {
    "shortlist".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = ScreenerConfig::default();
        assert_eq!(config.universe.heavy_top_k, 60);
        assert_eq!(config.backfill.max_rounds, 20);
        assert_eq!(config.backfill.per_ticker_timeout_ms, 60_000);
        assert_eq!(config.anti_churn.min_confidence, 70);
        assert_eq!(config.selection.total_slots(), 12);
        assert_eq!(config.tracker.rotation_threshold, 8);
        assert_eq!(config.report.kind, "shortlist");
    }

    #[test]
    fn test_partial_block_keeps_other_defaults() {
        let mut shared = Config::default();
        shared.screener = Some(json!({
            "universe": {"heavy_top_k": 40},
            "anti_churn": {"max_risk": 15.0}
        }));

        let config = ScreenerConfig::from_config(&shared).unwrap();
        assert_eq!(config.universe.heavy_top_k, 40);
        assert_eq!(config.universe.min_price, 5.0);
        assert_eq!(config.anti_churn.max_risk, 15.0);
        assert_eq!(config.anti_churn.maintain_bonus, 5.0);
        assert_eq!(config.backfill.concurrency, 3);
    }

    #[test]
    fn test_invalid_block_is_config_error() {
        let mut shared = Config::default();
        shared.screener = Some(json!({"universe": {"heavy_top_k": "many"}}));
        assert!(matches!(ScreenerConfig::from_config(&shared), Err(Error::Config(_))));
    }
}
