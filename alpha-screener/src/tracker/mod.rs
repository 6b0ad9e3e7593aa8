//! Continuity tracker.
//!
//! Cross-run memory of the Top-3: time-stop entries with rebuild pressure
//! and the IN/OUT/NO_CHANGE changelog between consecutive report days.
//!
//! A rerun on the same report date diffs against the previous day's Top-3
//! and accumulates pressure from the previous day's entries, so replaying a
//! day yields the same state.

pub mod changelog;
pub mod store;

pub use changelog::{build_changelog, ChangeKind, ChangelogEntry};
pub use store::{JsonFileTrackerStore, SqliteTrackerStore, TrackerStore};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::TrackerConfig;
use crate::selection::SelectedItem;

// ============================================================================
// State
// ============================================================================

/// Time-stop bookkeeping for one Top-3 member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeStopEntry {
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub target1: f64,
    pub target1_hit: bool,
    /// Report sessions since the entry session
    pub days_since_entry: i64,
    pub rebuild_pressure: u32,
}

impl TimeStopEntry {
    fn open(today: NaiveDate, obs: &TopObservation, config: &TrackerConfig) -> Self {
        let target1 = (obs.price * (1.0 + config.target_pct / 100.0) * 100.0).round() / 100.0;
        let mut entry = Self {
            entry_date: today,
            entry_price: obs.price,
            target1,
            target1_hit: false,
            days_since_entry: 0,
            rebuild_pressure: 0,
        };
        entry.mark_target(obs);
        entry
    }

    fn mark_target(&mut self, obs: &TopObservation) {
        let high = obs.day_high.unwrap_or(obs.price).max(obs.price);
        if high >= self.target1 {
            self.target1_hit = true;
        }
    }

    /// Advance the entry by one report session.
    ///
    /// Called once per new report date on the previous session's entry, so
    /// weekends and holidays between runs do not count.
    fn advance(&mut self, obs: &TopObservation, config: &TrackerConfig) {
        self.days_since_entry += 1;
        self.mark_target(obs);

        if self.target1_hit {
            self.rebuild_pressure = 0;
            return;
        }

        let fading = obs
            .volume_ratio
            .map(|r| r < config.fade_volume_ratio)
            .unwrap_or(false);
        if self.days_since_entry >= 1 && fading {
            self.rebuild_pressure += config.fade_pressure;
            if self.days_since_entry >= 2 {
                self.rebuild_pressure += config.followup_pressure;
            }
        }
    }
}

/// Persisted tracker state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerState {
    #[serde(default)]
    pub top3: Vec<String>,
    #[serde(default)]
    pub entries: BTreeMap<String, TimeStopEntry>,
    #[serde(default)]
    pub last_report_date: Option<NaiveDate>,
    #[serde(default)]
    pub last_changelog: Vec<ChangelogEntry>,
    /// Top-3 as of the report day before `last_report_date`
    #[serde(default)]
    pub prior_top3: Vec<String>,
    #[serde(default)]
    pub prior_entries: BTreeMap<String, TimeStopEntry>,
}

impl TrackerState {
    /// Top-3 and entries that a run on `today` compares against.
    pub fn baseline(&self, today: NaiveDate) -> (&[String], &BTreeMap<String, TimeStopEntry>) {
        if self.last_report_date == Some(today) {
            (&self.prior_top3, &self.prior_entries)
        } else {
            (&self.top3, &self.entries)
        }
    }

    pub fn pressure_of(&self, symbol: &str) -> u32 {
        self.entries.get(symbol).map(|e| e.rebuild_pressure).unwrap_or(0)
    }
}

// ============================================================================
// Update
// ============================================================================

/// What the tracker needs to know about one Top-3 member today.
#[derive(Debug, Clone, PartialEq)]
pub struct TopObservation {
    pub symbol: String,
    pub price: f64,
    pub day_high: Option<f64>,
    /// Volume relative to the previous day
    pub volume_ratio: Option<f64>,
}

impl From<&SelectedItem> for TopObservation {
    fn from(item: &SelectedItem) -> Self {
        let snapshot = &item.ticker.snapshot;
        Self {
            symbol: snapshot.symbol.clone(),
            price: snapshot.price,
            day_high: snapshot.day_high,
            volume_ratio: snapshot.volume_ratio(),
        }
    }
}

/// Result of one tracker run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerUpdate {
    pub changelog: Vec<ChangelogEntry>,
    /// Top-3 members whose pressure reached the rotation threshold
    pub rotation_due: Vec<String>,
}

/// Apply today's Top-3 to the tracker state.
///
/// `shortlist_rank_of` resolves a symbol's rank in today's full shortlist
/// and feeds the rank-based OUT trigger.
pub fn apply(
    state: &mut TrackerState,
    top3: &[TopObservation],
    shortlist_rank_of: impl Fn(&str) -> Option<usize>,
    today: NaiveDate,
    config: &TrackerConfig,
) -> TrackerUpdate {
    let same_day = state.last_report_date == Some(today);
    let (base_top3, base_entries) = state.baseline(today);
    let base_top3 = base_top3.to_vec();
    let base_entries = base_entries.clone();

    let mut entries = BTreeMap::new();
    for obs in top3 {
        let entry = match base_entries.get(&obs.symbol) {
            Some(existing) => {
                let mut entry = existing.clone();
                entry.advance(obs, config);
                entry
            }
            None => TimeStopEntry::open(today, obs, config),
        };
        debug!(
            symbol = %obs.symbol,
            days = entry.days_since_entry,
            pressure = entry.rebuild_pressure,
            target_hit = entry.target1_hit,
            "Time-stop entry updated"
        );
        entries.insert(obs.symbol.clone(), entry);
    }

    let current: Vec<String> = top3.iter().map(|o| o.symbol.clone()).collect();
    let changelog = build_changelog(
        &base_top3,
        &current,
        |symbol| base_entries.get(symbol).map(|e| e.rebuild_pressure).unwrap_or(0),
        shortlist_rank_of,
    );

    let rotation_due: Vec<String> = current
        .iter()
        .filter(|s| {
            entries
                .get(s.as_str())
                .map(|e| e.rebuild_pressure >= config.rotation_threshold)
                .unwrap_or(false)
        })
        .cloned()
        .collect();

    if !same_day {
        state.prior_top3 = std::mem::take(&mut state.top3);
        state.prior_entries = std::mem::take(&mut state.entries);
    }
    state.top3 = current;
    state.entries = entries;
    state.last_report_date = Some(today);
    state.last_changelog = changelog.clone();

    info!(
        date = %today,
        top3 = ?state.top3,
        changes = changelog.len(),
        rotation_due = ?rotation_due,
        replay = same_day,
        "Tracker updated"
    );

    TrackerUpdate {
        changelog,
        rotation_due,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(symbol: &str, price: f64, ratio: Option<f64>) -> TopObservation {
        TopObservation {
            symbol: symbol.to_string(),
            price,
            day_high: None,
            volume_ratio: ratio,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn top(list: &[(&str, f64, Option<f64>)]) -> Vec<TopObservation> {
        list.iter().map(|(s, p, r)| obs(s, *p, *r)).collect()
    }

    #[test]
    fn test_first_run_opens_entries() {
        let mut state = TrackerState::default();
        let update = apply(
            &mut state,
            &top(&[("A", 100.0, None), ("B", 50.0, None), ("C", 20.0, None)]),
            |_| None,
            day(4),
            &TrackerConfig::default(),
        );

        assert_eq!(update.changelog.len(), 3);
        assert!(update.changelog.iter().all(|e| e.kind == ChangeKind::In));
        let a = &state.entries["A"];
        assert_eq!(a.entry_date, day(4));
        assert!((a.target1 - 105.0).abs() < 1e-9);
        assert_eq!(a.rebuild_pressure, 0);
        assert_eq!(state.last_report_date, Some(day(4)));
    }

    #[test]
    fn test_fading_volume_accumulates_pressure() {
        let config = TrackerConfig::default();
        let mut state = TrackerState::default();
        let fading = Some(0.7);

        apply(&mut state, &top(&[("A", 100.0, fading)]), |_| None, day(4), &config);
        assert_eq!(state.pressure_of("A"), 0);

        apply(&mut state, &top(&[("A", 101.0, fading)]), |_| None, day(5), &config);
        assert_eq!(state.pressure_of("A"), 3);

        let update = apply(&mut state, &top(&[("A", 101.5, fading)]), |_| None, day(6), &config);
        assert_eq!(state.pressure_of("A"), 8);
        assert_eq!(update.rotation_due, vec!["A".to_string()]);
    }

    #[test]
    fn test_weekend_counts_as_one_session() {
        let config = TrackerConfig::default();
        let mut state = TrackerState::default();
        let friday = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let monday = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();

        apply(&mut state, &top(&[("A", 100.0, Some(0.7))]), |_| None, friday, &config);
        apply(&mut state, &top(&[("A", 100.5, Some(0.7))]), |_| None, monday, &config);
        assert_eq!(state.entries["A"].days_since_entry, 1);
        assert_eq!(state.pressure_of("A"), 3);

        let update = apply(&mut state, &top(&[("A", 100.8, Some(0.7))]), |_| None, tuesday, &config);
        assert_eq!(state.entries["A"].days_since_entry, 2);
        assert_eq!(state.pressure_of("A"), 8);
        assert_eq!(update.rotation_due, vec!["A".to_string()]);
    }

    #[test]
    fn test_target_hit_resets_pressure() {
        let config = TrackerConfig::default();
        let mut state = TrackerState::default();
        apply(&mut state, &top(&[("A", 100.0, None)]), |_| None, day(4), &config);
        apply(&mut state, &top(&[("A", 100.0, Some(0.5))]), |_| None, day(5), &config);
        assert_eq!(state.pressure_of("A"), 3);

        let mut hit = obs("A", 103.0, Some(0.5));
        hit.day_high = Some(105.5);
        apply(&mut state, &[hit], |_| None, day(6), &config);
        assert!(state.entries["A"].target1_hit);
        assert_eq!(state.pressure_of("A"), 0);
    }

    #[test]
    fn test_same_day_rerun_is_idempotent() {
        let config = TrackerConfig::default();
        let mut state = TrackerState::default();
        apply(&mut state, &top(&[("A", 100.0, None), ("B", 50.0, None)]), |_| None, day(4), &config);

        let today = top(&[("A", 100.0, Some(0.6)), ("C", 30.0, None)]);
        let first = apply(&mut state, &today, |_| Some(5), day(5), &config);
        let snapshot = state.clone();
        let second = apply(&mut state, &today, |_| Some(5), day(5), &config);

        assert_eq!(first, second);
        assert_eq!(state, snapshot);
        assert_eq!(state.pressure_of("A"), 3);
        assert_eq!(state.prior_top3, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_leaving_symbol_entry_is_dropped() {
        let config = TrackerConfig::default();
        let mut state = TrackerState::default();
        apply(&mut state, &top(&[("A", 100.0, None), ("B", 50.0, None)]), |_| None, day(4), &config);
        let update = apply(&mut state, &top(&[("A", 100.0, None), ("C", 10.0, None)]), |_| None, day(5), &config);

        assert!(!state.entries.contains_key("B"));
        assert!(state.entries.contains_key("C"));
        let out = update
            .changelog
            .iter()
            .find(|e| e.kind == ChangeKind::Out)
            .unwrap();
        assert_eq!(out.symbol, "B");
        assert_eq!(out.trigger, "RANK 2→OUT");
    }
}
