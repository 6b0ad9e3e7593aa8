//! Backfill orchestrator.
//!
//! Enriches the heavy subset with options analytics over bounded rounds:
//!
//! ```text
//!   ┌──────────── round N ────────────┐
//!   │ pending = heavy − OK − excluded │
//!   │ fan-out (buffer_unordered)      │──▶ merge by symbol ──▶ score all
//!   └─────────────────────────────────┘
//!          │ converged / budget spent / max rounds ──▶ stop
//!          └──▶ sleep(interval − elapsed) ──▶ round N+1
//! ```
//!
//! `OK` results are frozen once obtained and never fetched again.

mod clock;
mod progress;

pub use clock::{Clock, ManualClock, SystemClock};
pub use progress::{ProgressEvent, ProgressSender};

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::BackfillConfig;
use crate::data::{
    symbol_params, BudgetUsage, Endpoint, History, MarketDataFetcher, MarketRegime, ProviderError,
    RunBudget, TickerSnapshot,
};
use crate::options::{analytics_from_chain, truncation_note, ChainError, OptionsAnalytics, OptionsStatus};
use crate::scoring::{score_ticker, ScoredTicker, ScoringError, ScoringMode};
use progress::publish;

// ============================================================================
// Stop Reason & Summary
// ============================================================================

/// Why the round loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopReason {
    /// No heavy ticker is left pending
    Converged,
    /// The round cap was reached
    MaxRounds,
    /// The request budget is spent
    BudgetExhausted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged => write!(f, "converged"),
            Self::MaxRounds => write!(f, "max_rounds"),
            Self::BudgetExhausted => write!(f, "budget_exhausted"),
        }
    }
}

/// Backfill statistics carried into the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillSummary {
    pub rounds: u32,
    pub stop_reason: StopReason,
    pub heavy: usize,
    pub ok: usize,
    pub pending: usize,
    pub failed: usize,
    pub no_options: usize,
    pub fetch_attempts: u64,
    pub budget: BudgetUsage,
}

/// Scored universe after backfill, in symbol order.
#[derive(Debug, Clone)]
pub struct BackfillOutcome {
    pub scored: Vec<ScoredTicker>,
    pub summary: BackfillSummary,
}

/// What the orchestrator works on.
#[derive(Debug, Clone, Copy)]
pub struct BackfillInput<'a> {
    /// Sanitized universe
    pub tickers: &'a [TickerSnapshot],
    /// Symbols allowed to spend on options enrichment
    pub heavy: &'a [String],
    /// Daily-bar history by symbol
    pub histories: &'a HashMap<String, History>,
    pub regime: MarketRegime,
}

// ============================================================================
// Merge
// ============================================================================

/// Score `base` with the options object of a prior round, if any.
///
/// Only the options analytics are carried over. Every other field comes
/// from the current snapshot.
pub fn merge_enrichment(
    base: &TickerSnapshot,
    prior: Option<&OptionsAnalytics>,
    history: Option<&History>,
    regime: MarketRegime,
) -> Result<ScoredTicker, ScoringError> {
    score_ticker(base, regime, prior, history, ScoringMode::Standard)
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Round-based options enrichment.
pub struct BackfillOrchestrator<'a, F: ?Sized, C: ?Sized> {
    fetcher: &'a F,
    clock: &'a C,
    config: &'a BackfillConfig,
    progress: Option<&'a ProgressSender>,
}

impl<'a, F, C> BackfillOrchestrator<'a, F, C>
where
    F: MarketDataFetcher + ?Sized,
    C: Clock + ?Sized,
{
    pub fn new(fetcher: &'a F, clock: &'a C, config: &'a BackfillConfig) -> Self {
        Self {
            fetcher,
            clock,
            config,
            progress: None,
        }
    }

    /// Publish progress events to `sender`.
    pub fn with_progress(mut self, sender: Option<&'a ProgressSender>) -> Self {
        self.progress = sender;
        self
    }

    /// Run the round loop.
    pub async fn run(&self, input: BackfillInput<'_>, budget: &RunBudget) -> Result<BackfillOutcome, ScoringError> {
        let prices: HashMap<&str, f64> = input
            .tickers
            .iter()
            .map(|t| (t.symbol.as_str(), t.price))
            .collect();
        let heavy: Vec<&str> = input
            .heavy
            .iter()
            .map(String::as_str)
            .filter(|s| prices.contains_key(s))
            .collect();

        let mut enrichment: BTreeMap<String, OptionsAnalytics> = BTreeMap::new();
        let mut excluded: BTreeSet<String> = BTreeSet::new();
        let mut given_up: BTreeSet<String> = BTreeSet::new();
        let mut last_error: BTreeMap<String, ProviderError> = BTreeMap::new();
        let mut fetch_attempts: u64 = 0;

        let interval = Duration::from_secs(self.config.round_interval_secs);
        let mut rounds = 0;
        let mut stop_reason = StopReason::MaxRounds;

        let is_pending = |symbol: &str,
                          enrichment: &BTreeMap<String, OptionsAnalytics>,
                          excluded: &BTreeSet<String>,
                          given_up: &BTreeSet<String>| {
            !enrichment.get(symbol).is_some_and(OptionsAnalytics::is_ok)
                && !excluded.contains(symbol)
                && !given_up.contains(symbol)
        };

        info!(
            universe = input.tickers.len(),
            heavy = heavy.len(),
            max_rounds = self.config.max_rounds,
            budget_cap = budget.cap(),
            "Starting options backfill"
        );

        for round in 1..=self.config.max_rounds {
            let pending: Vec<String> = heavy
                .iter()
                .filter(|s| is_pending(**s, &enrichment, &excluded, &given_up))
                .map(|s| s.to_string())
                .collect();

            if pending.is_empty() {
                stop_reason = StopReason::Converged;
                break;
            }
            if budget.is_exhausted() {
                warn!(round, used = budget.used(), cap = budget.cap(), "Request budget exhausted, stopping backfill");
                publish(
                    self.progress,
                    ProgressEvent::BudgetExhausted {
                        round,
                        used: budget.used(),
                        cap: budget.cap(),
                    },
                );
                stop_reason = StopReason::BudgetExhausted;
                break;
            }

            rounds = round;
            let started = self.clock.elapsed();
            publish(self.progress, ProgressEvent::RoundStarted { round, pending: pending.len() });
            debug!(round, pending = pending.len(), "Backfill round started");

            let concurrency = self.config.concurrency.max(1);
            let results: BTreeMap<String, Result<OptionsAnalytics, ProviderError>> = stream::iter(pending)
                .map(|symbol| {
                    let spot = prices.get(symbol.as_str()).copied().unwrap_or(0.0);
                    self.enrich_one(symbol, spot, budget, round)
                })
                .buffer_unordered(concurrency)
                .collect::<Vec<_>>()
                .await
                .into_iter()
                .collect();

            let mut budget_hit = false;
            for (symbol, result) in results {
                match result {
                    Ok(analytics) => {
                        last_error.remove(&symbol);
                        enrichment.insert(symbol, analytics);
                        fetch_attempts += 1;
                    }
                    Err(e) if e.is_budget_exhausted() => {
                        budget_hit = true;
                        last_error.insert(symbol, e);
                    }
                    Err(e) if e.is_permanent_exclusion() => {
                        fetch_attempts += 1;
                        excluded.insert(symbol.clone());
                        enrichment.insert(symbol, OptionsAnalytics::no_options());
                    }
                    Err(e) => {
                        fetch_attempts += 1;
                        if !e.is_recoverable() {
                            warn!(symbol = %symbol, error = %e, "Non-recoverable fetch error, not retrying");
                            given_up.insert(symbol.clone());
                        }
                        enrichment.insert(symbol.clone(), OptionsAnalytics::pending_after(e.to_string()));
                        last_error.insert(symbol, e);
                    }
                }
            }

            let ok = enrichment.values().filter(|a| a.is_ok()).count();
            let still_pending = heavy
                .iter()
                .filter(|s| is_pending(**s, &enrichment, &excluded, &given_up))
                .count();

            publish(
                self.progress,
                ProgressEvent::RoundCompleted {
                    round,
                    ok,
                    pending: still_pending,
                    budget_used: budget.used(),
                },
            );
            info!(round, ok, pending = still_pending, budget_used = budget.used(), "Backfill round completed");

            if still_pending == 0 {
                stop_reason = StopReason::Converged;
                break;
            }
            if budget_hit || budget.is_exhausted() {
                warn!(round, used = budget.used(), cap = budget.cap(), "Request budget exhausted, stopping backfill");
                publish(
                    self.progress,
                    ProgressEvent::BudgetExhausted {
                        round,
                        used: budget.used(),
                        cap: budget.cap(),
                    },
                );
                stop_reason = StopReason::BudgetExhausted;
                break;
            }
            if round == self.config.max_rounds {
                stop_reason = StopReason::MaxRounds;
                break;
            }

            let spent = self.clock.elapsed().saturating_sub(started);
            if spent < interval {
                self.clock.sleep(interval - spent).await;
            }
        }

        // Settle final statuses for heavy tickers that never reached OK.
        for symbol in &heavy {
            if enrichment.get(*symbol).is_some_and(OptionsAnalytics::is_ok) || excluded.contains(*symbol) {
                continue;
            }
            let status = match last_error.get(*symbol) {
                Some(e) if !e.is_budget_exhausted() => OptionsAnalytics::failed(e.to_string()),
                _ => OptionsAnalytics::pending(),
            };
            enrichment.insert(symbol.to_string(), status);
        }

        let mut scored = Vec::with_capacity(input.tickers.len());
        for ticker in input.tickers {
            let prior = enrichment.get(&ticker.symbol);
            let history = input.histories.get(&ticker.symbol);
            scored.push(merge_enrichment(ticker, prior, history, input.regime)?);
        }
        scored.sort_by(|a, b| a.symbol().cmp(b.symbol()));

        let count = |status: OptionsStatus| {
            heavy
                .iter()
                .filter(|s| enrichment.get(**s).is_some_and(|a| a.status() == status))
                .count()
        };
        let summary = BackfillSummary {
            rounds,
            stop_reason,
            heavy: heavy.len(),
            ok: count(OptionsStatus::Ok),
            pending: count(OptionsStatus::Pending),
            failed: count(OptionsStatus::Failed),
            no_options: count(OptionsStatus::NoOptions),
            fetch_attempts,
            budget: budget.usage(),
        };

        publish(self.progress, ProgressEvent::Finished { rounds, reason: stop_reason });
        info!(
            rounds,
            reason = %stop_reason,
            ok = summary.ok,
            failed = summary.failed,
            no_options = summary.no_options,
            "Backfill finished"
        );

        Ok(BackfillOutcome { scored, summary })
    }

    /// Fetch and analyse one chain under the per-ticker deadline.
    async fn enrich_one(
        &self,
        symbol: String,
        spot: f64,
        budget: &RunBudget,
        round: u32,
    ) -> (String, Result<OptionsAnalytics, ProviderError>) {
        if !budget.try_consume() {
            let err = ProviderError::BudgetExhausted {
                used: budget.used(),
                cap: budget.cap(),
            };
            return (symbol, Err(err));
        }

        let params = symbol_params(&symbol);
        let deadline = Duration::from_millis(self.config.per_ticker_timeout_ms);
        let fetched = tokio::time::timeout(
            deadline,
            self.fetcher.fetch(Endpoint::OptionsChain, &params, false, Some(budget)),
        )
        .await;

        let result = match fetched {
            Err(_) => Err(ProviderError::Timeout),
            Ok(Err(e)) => Err(e),
            Ok(Ok(doc)) => analytics_from_chain(&doc, spot)
                .map(|metrics| match truncation_note(&doc) {
                    Some(note) => {
                        warn!(symbol = %symbol, note = %note, "Options enriched from a partial chain");
                        OptionsAnalytics::ok(metrics).with_detail(note)
                    }
                    None => OptionsAnalytics::ok(metrics),
                })
                .map_err(|e| match e {
                    ChainError::NoContracts => ProviderError::NoOptionsListed(symbol.clone()),
                    other => ProviderError::Malformed(other.to_string()),
                }),
        };

        match &result {
            Ok(_) => {
                debug!(symbol = %symbol, round, "Options enriched");
                publish(
                    self.progress,
                    ProgressEvent::TickerEnriched {
                        round,
                        symbol: symbol.clone(),
                    },
                );
            }
            Err(e) => {
                debug!(symbol = %symbol, round, error = %e, "Options fetch failed");
                publish(
                    self.progress,
                    ProgressEvent::TickerFailed {
                        round,
                        symbol: symbol.clone(),
                        error: e.to_string(),
                        excluded: e.is_permanent_exclusion(),
                    },
                );
            }
        }

        (symbol, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FetchParams;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use crate::options::{OptionsMetrics, TRUNCATED_AFTER_PAGES};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Chain fetcher scripted per symbol: a list of outcomes consumed in order.
    struct ScriptedFetcher {
        script: Mutex<HashMap<String, Vec<Result<Value, ProviderError>>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        fn new(script: Vec<(&str, Vec<Result<Value, ProviderError>>)>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().map(|(s, v)| (s.to_string(), v)).collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls_for(&self, symbol: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|s| *s == symbol).count()
        }
    }

    #[async_trait]
    impl MarketDataFetcher for ScriptedFetcher {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn fetch(
            &self,
            _endpoint: Endpoint,
            params: &FetchParams,
            _use_cache: bool,
            _budget: Option<&RunBudget>,
        ) -> Result<Value, ProviderError> {
            let symbol = params.get("symbol").cloned().unwrap_or_default();
            self.calls.lock().unwrap().push(symbol.clone());
            let mut script = self.script.lock().unwrap();
            match script.get_mut(&symbol) {
                Some(outcomes) if outcomes.len() > 1 => outcomes.remove(0),
                Some(outcomes) if outcomes.len() == 1 => outcomes[0].clone(),
                _ => Err(ProviderError::Network("unscripted".into())),
            }
        }
    }

    fn chain() -> Value {
        json!({"results": [
            {"details": {"contract_type": "call", "strike_price": 105.0}, "open_interest": 1000.0, "greeks": {"gamma": 0.02}},
            {"details": {"contract_type": "put", "strike_price": 95.0}, "open_interest": 600.0, "greeks": {"gamma": 0.02}}
        ]})
    }

    fn snap(symbol: &str) -> TickerSnapshot {
        TickerSnapshot {
            symbol: symbol.into(),
            price: 100.0,
            prev_close: 99.0,
            volume: 1_000_000.0,
            prev_volume: Some(900_000.0),
            vwap: Some(99.5),
            day_high: Some(101.0),
            day_low: Some(98.5),
        }
    }

    fn config() -> BackfillConfig {
        BackfillConfig {
            max_rounds: 5,
            round_interval_secs: 20,
            per_ticker_timeout_ms: 1_000,
            concurrency: 2,
            request_budget: 100,
            fetch_history: false,
        }
    }

    fn status_of(outcome: &BackfillOutcome, symbol: &str) -> OptionsStatus {
        outcome
            .scored
            .iter()
            .find(|t| t.symbol() == symbol)
            .map(|t| t.options.status())
            .unwrap()
    }

    #[tokio::test]
    async fn test_retry_then_converge_without_refetching_ok() {
        let fetcher = ScriptedFetcher::new(vec![
            ("AAA", vec![Ok(chain())]),
            ("BBB", vec![Err(ProviderError::Timeout), Ok(chain())]),
            ("NOPE", vec![Err(ProviderError::NoOptionsListed("NOPE".into()))]),
        ]);
        let clock = ManualClock::new();
        let config = config();
        let tickers = vec![snap("AAA"), snap("BBB"), snap("NOPE"), snap("LIGHT")];
        let heavy = vec!["AAA".to_string(), "BBB".to_string(), "NOPE".to_string()];
        let histories = HashMap::new();
        let budget = RunBudget::new(100);

        let outcome = BackfillOrchestrator::new(&fetcher, &clock, &config)
            .run(
                BackfillInput {
                    tickers: &tickers,
                    heavy: &heavy,
                    histories: &histories,
                    regime: MarketRegime::Neutral,
                },
                &budget,
            )
            .await
            .unwrap();

        assert_eq!(outcome.summary.stop_reason, StopReason::Converged);
        assert_eq!(outcome.summary.rounds, 2);
        assert_eq!(fetcher.calls_for("AAA"), 1);
        assert_eq!(fetcher.calls_for("BBB"), 2);
        assert_eq!(fetcher.calls_for("NOPE"), 1);
        assert_eq!(fetcher.calls_for("LIGHT"), 0);
        assert_eq!(status_of(&outcome, "AAA"), OptionsStatus::Ok);
        assert_eq!(status_of(&outcome, "BBB"), OptionsStatus::Ok);
        assert_eq!(status_of(&outcome, "NOPE"), OptionsStatus::NoOptions);
        assert_eq!(status_of(&outcome, "LIGHT"), OptionsStatus::Pending);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(20)]);
        assert_eq!(budget.used(), 4);
    }

    #[tokio::test]
    async fn test_max_rounds_marks_failed() {
        let fetcher = ScriptedFetcher::new(vec![("BAD", vec![Err(ProviderError::Network("reset".into()))])]);
        let clock = ManualClock::new();
        let config = BackfillConfig {
            max_rounds: 3,
            ..config()
        };
        let tickers = vec![snap("BAD")];
        let heavy = vec!["BAD".to_string()];
        let histories = HashMap::new();
        let budget = RunBudget::new(100);

        let outcome = BackfillOrchestrator::new(&fetcher, &clock, &config)
            .run(
                BackfillInput {
                    tickers: &tickers,
                    heavy: &heavy,
                    histories: &histories,
                    regime: MarketRegime::Neutral,
                },
                &budget,
            )
            .await
            .unwrap();

        assert_eq!(outcome.summary.stop_reason, StopReason::MaxRounds);
        assert_eq!(outcome.summary.rounds, 3);
        assert_eq!(fetcher.calls_for("BAD"), 3);
        assert_eq!(status_of(&outcome, "BAD"), OptionsStatus::Failed);
        assert_eq!(clock.sleeps().len(), 2);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_is_soft_stop() {
        let fetcher = ScriptedFetcher::new(vec![
            ("AAA", vec![Ok(chain())]),
            ("BBB", vec![Ok(chain())]),
            ("CCC", vec![Ok(chain())]),
        ]);
        let clock = ManualClock::new();
        let config = BackfillConfig {
            concurrency: 1,
            ..config()
        };
        let tickers = vec![snap("AAA"), snap("BBB"), snap("CCC")];
        let heavy = vec!["AAA".to_string(), "BBB".to_string(), "CCC".to_string()];
        let histories = HashMap::new();
        let budget = RunBudget::new(2);

        let outcome = BackfillOrchestrator::new(&fetcher, &clock, &config)
            .run(
                BackfillInput {
                    tickers: &tickers,
                    heavy: &heavy,
                    histories: &histories,
                    regime: MarketRegime::Neutral,
                },
                &budget,
            )
            .await
            .unwrap();

        assert_eq!(outcome.summary.stop_reason, StopReason::BudgetExhausted);
        assert_eq!(outcome.summary.ok, 2);
        assert_eq!(outcome.summary.pending, 1);
        assert_eq!(outcome.scored.len(), 3);
        assert_eq!(budget.used(), 2);
    }

    #[tokio::test]
    async fn test_spent_budget_reports_exhaustion_before_first_round() {
        let fetcher = ScriptedFetcher::new(vec![("AAA", vec![Ok(chain())])]);
        let clock = ManualClock::new();
        let config = config();
        let tickers = vec![snap("AAA")];
        let heavy = vec!["AAA".to_string()];
        let histories = HashMap::new();
        let budget = RunBudget::new(1);
        assert!(budget.try_consume());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = BackfillOrchestrator::new(&fetcher, &clock, &config)
            .with_progress(Some(&tx))
            .run(
                BackfillInput {
                    tickers: &tickers,
                    heavy: &heavy,
                    histories: &histories,
                    regime: MarketRegime::Neutral,
                },
                &budget,
            )
            .await
            .unwrap();

        assert_eq!(outcome.summary.stop_reason, StopReason::BudgetExhausted);
        assert_eq!(outcome.summary.rounds, 0);
        assert_eq!(fetcher.calls_for("AAA"), 0);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                ProgressEvent::BudgetExhausted { round: 1, used: 1, cap: 1 },
                ProgressEvent::Finished {
                    rounds: 0,
                    reason: StopReason::BudgetExhausted
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_truncated_chain_keeps_ok_with_note() {
        let mut doc = chain();
        doc[TRUNCATED_AFTER_PAGES] = json!(8);
        let fetcher = ScriptedFetcher::new(vec![("AAA", vec![Ok(doc)])]);
        let clock = ManualClock::new();
        let config = config();
        let tickers = vec![snap("AAA")];
        let heavy = vec!["AAA".to_string()];
        let histories = HashMap::new();
        let budget = RunBudget::new(10);

        let outcome = BackfillOrchestrator::new(&fetcher, &clock, &config)
            .run(
                BackfillInput {
                    tickers: &tickers,
                    heavy: &heavy,
                    histories: &histories,
                    regime: MarketRegime::Neutral,
                },
                &budget,
            )
            .await
            .unwrap();

        assert_eq!(outcome.summary.stop_reason, StopReason::Converged);
        let ticker = outcome.scored.iter().find(|t| t.symbol() == "AAA").unwrap();
        assert_eq!(ticker.options.status(), OptionsStatus::Ok);
        assert!(ticker.options.metrics().is_some());
        assert!(ticker.options.detail().unwrap().contains("truncated after 8 pages"));
    }

    #[test]
    fn test_merge_enrichment_copies_only_options() {
        let base = snap("AAA");
        let prior = OptionsAnalytics::ok(OptionsMetrics {
            put_call_oi_ratio: Some(0.5),
            ..Default::default()
        });
        let merged = merge_enrichment(&base, Some(&prior), None, MarketRegime::Neutral).unwrap();
        assert_eq!(merged.snapshot, base);
        assert_eq!(merged.options, prior);

        let fresh = merge_enrichment(&base, None, None, MarketRegime::Neutral).unwrap();
        assert_eq!(fresh.options.status(), OptionsStatus::Pending);
    }
}
