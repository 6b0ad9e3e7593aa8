//! End-to-end shortlist pipeline.
//!
//! Orchestrates one daily run:
//! 1. Fetch and sanitize the market snapshot (quality gate in production)
//! 2. Preliminary rank and pick the heavy subset
//! 3. Pull multi-horizon history and backfill options for the heavy subset
//! 4. Amplify against the previous report, then select 3/7/2
//! 5. Update the continuity tracker and emit the snapshot
//!
//! Reports and tracker state are written once, at the end of the run.

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::amplifier::{amplify, PriorSelection};
use crate::backfill::{BackfillInput, BackfillOrchestrator, Clock, ProgressSender};
use crate::config::ScreenerConfig;
use crate::data::{
    history_from_bars, parse_market_snapshot, symbol_params, Benchmark, Endpoint, FetchParams, History,
    MarketDataFetcher, MarketRegime, ProviderError, RunBudget, TickerSnapshot,
};
use crate::error::{PipelineError, Result};
use crate::report::{next_run_id, OptionsCoverage, ReportStore, SelectionSummary, Snapshot, SnapshotFlags};
use crate::scoring::{verify_sum, Action, ScoringError, Trigger};
use crate::selection::{select, FinalSelection, Role};
use crate::tracker::{self, TopObservation, TrackerStore};
use crate::universe::{heavy_subset, preliminary_rank, sanitize};

/// Per-run switches.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub report_date: NaiveDate,
    pub regime: MarketRegime,
    /// Every emitted item must carry `OK` options
    pub strict: bool,
    /// Enforce the eligible-universe quality gate
    pub production: bool,
    /// Replace an existing report for the same date
    pub force: bool,
}

impl RunOptions {
    pub fn for_date(report_date: NaiveDate) -> Self {
        Self {
            report_date,
            regime: MarketRegime::default(),
            strict: false,
            production: false,
            force: false,
        }
    }
}

/// The daily shortlist pipeline.
pub struct ShortlistPipeline<F: ?Sized, C: ?Sized> {
    config: ScreenerConfig,
    fetcher: Arc<F>,
    clock: Arc<C>,
    reports: Arc<dyn ReportStore>,
    tracker: Arc<dyn TrackerStore>,
    progress: Option<ProgressSender>,
}

impl<F, C> ShortlistPipeline<F, C>
where
    F: MarketDataFetcher + ?Sized,
    C: Clock + ?Sized,
{
    pub fn new(
        config: ScreenerConfig,
        fetcher: Arc<F>,
        clock: Arc<C>,
        reports: Arc<dyn ReportStore>,
        tracker: Arc<dyn TrackerStore>,
    ) -> Self {
        Self {
            config,
            fetcher,
            clock,
            reports,
            tracker,
            progress: None,
        }
    }

    /// Publish backfill progress to `sender`.
    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn config(&self) -> &ScreenerConfig {
        &self.config
    }

    /// Run the pipeline for one report date.
    pub async fn run(&self, options: &RunOptions) -> Result<Snapshot> {
        let date = options.report_date;
        let kind = self.config.report.kind.as_str();
        let budget = RunBudget::new(self.config.backfill.request_budget);

        info!(
            date = %date,
            regime = %options.regime,
            strict = options.strict,
            production = options.production,
            fetcher = self.fetcher.name(),
            "Starting shortlist run"
        );

        let latest = self.reports.load_latest(kind)?;
        if let Some(existing) = latest.as_ref().filter(|s| s.report_date == date) {
            if !options.force {
                return Err(alpha_common::Error::AlreadyExists(format!(
                    "{} report for {} (run {}); use --force to overwrite",
                    kind, date, existing.run_id
                ))
                .into());
            }
        }

        // Phase 1: universe
        let universe = self.fetch_universe(&budget).await?;
        let benchmark = Benchmark::from_universe(&universe, &self.config.universe.benchmark_symbols);
        let (eligible, sanitize_report) = sanitize(&universe, &self.config.universe);

        if options.production && eligible.len() < self.config.universe.min_eligible {
            warn!(
                eligible = eligible.len(),
                minimum = self.config.universe.min_eligible,
                "Quality gate failed, aborting before enrichment"
            );
            return Err(PipelineError::QualityGate {
                eligible: eligible.len(),
                minimum: self.config.universe.min_eligible,
            });
        }

        // Phase 2: heavy subset
        let ranked = preliminary_rank(&eligible, options.regime);
        let heavy = heavy_subset(&ranked, self.config.universe.heavy_top_k);
        info!(
            eligible = eligible.len(),
            heavy = heavy.len(),
            "Phase 2 (Preliminary rank) complete"
        );

        // Phase 3: history + options backfill
        let histories = if self.config.backfill.fetch_history {
            let benchmark_symbols = &self.config.universe.benchmark_symbols;
            let mut wanted = heavy.clone();
            wanted.extend(benchmark_symbols.iter().filter(|s| !heavy.contains(s)).cloned());
            self.fetch_histories(&universe, &wanted, date, &budget).await
        } else {
            HashMap::new()
        };
        let benchmark = benchmark.with_history(&histories, &self.config.universe.benchmark_symbols);

        let orchestrator = BackfillOrchestrator::new(&*self.fetcher, &*self.clock, &self.config.backfill)
            .with_progress(self.progress.as_ref());
        let outcome = orchestrator
            .run(
                BackfillInput {
                    tickers: &eligible,
                    heavy: &heavy,
                    histories: &histories,
                    regime: options.regime,
                },
                &budget,
            )
            .await?;

        // Phase 4: amplify + select
        let prior_snapshot = self.reports.load_latest_before(kind, date)?;
        let prior = prior_snapshot
            .as_ref()
            .map(|s| PriorSelection::from_tickers(s.items.iter().map(|i| &i.ticker)))
            .unwrap_or_default();

        let mut scored = outcome.scored;
        amplify(&mut scored, &prior, options.regime, &self.config.anti_churn);

        let mut tracker_state = self.tracker.load()?;
        let incumbents = tracker_state.baseline(date).0.to_vec();

        let mut selection = select(
            scored,
            &incumbents,
            &benchmark,
            &self.config.selection,
            &self.config.tpg,
        )?;

        self.check_integrity(&selection, options.strict)?;

        // Phase 5: continuity
        let top3: Vec<TopObservation> = selection.by_role(Role::Alpha).map(TopObservation::from).collect();
        let ranks: HashMap<String, usize> = selection
            .items
            .iter()
            .map(|i| (i.symbol().to_string(), i.rank))
            .collect();
        let update = tracker::apply(
            &mut tracker_state,
            &top3,
            |symbol| ranks.get(symbol).copied(),
            date,
            &self.config.tracker,
        );
        mark_rotation(&mut selection, &update.rotation_due);

        let mut warnings = selection.warnings.clone();
        if outcome.summary.budget.current >= outcome.summary.budget.cap {
            warnings.push(format!(
                "Request budget exhausted ({}/{}), options coverage may be incomplete",
                outcome.summary.budget.current, outcome.summary.budget.cap
            ));
        }

        let now = Utc::now();
        let snapshot = Snapshot {
            run_id: next_run_id(now, latest.map(|s| s.run_id)),
            generated_at: now,
            report_date: date,
            regime: options.regime,
            selection: SelectionSummary::from_selection(&selection),
            options_status: OptionsCoverage::from_summary(&outcome.summary),
            flags: SnapshotFlags {
                partial: selection.partial,
                top3_fallback: selection.top3_fallback,
                strict: options.strict,
            },
            items: selection.items,
            changelog: update.changelog,
            backfill: outcome.summary,
            sanitize: sanitize_report,
            warnings,
        };

        self.reports.save(date, kind, &snapshot, options.force)?;
        self.tracker.save(&tracker_state)?;

        info!(
            run_id = snapshot.run_id,
            items = snapshot.items.len(),
            top3 = ?snapshot.selection.top3,
            coverage = snapshot.options_status.coverage_pct,
            options_status = %snapshot.options_status.status,
            "Shortlist run complete"
        );

        Ok(snapshot)
    }

    async fn fetch_universe(&self, budget: &RunBudget) -> Result<Vec<TickerSnapshot>> {
        if !budget.try_consume() {
            return Err(ProviderError::BudgetExhausted {
                used: budget.used(),
                cap: budget.cap(),
            }
            .into());
        }

        let doc = self
            .fetcher
            .fetch(Endpoint::MarketSnapshot, &FetchParams::new(), true, Some(budget))
            .await?;
        let universe = parse_market_snapshot(&doc);

        info!(tickers = universe.len(), "Phase 1 (Market snapshot) complete");
        Ok(universe)
    }

    /// Daily-bar history for the heavy subset and the benchmark symbols.
    /// Missing history only narrows the multi-horizon blend and the
    /// relative-strength spread, so failures are logged and skipped.
    async fn fetch_histories(
        &self,
        universe: &[TickerSnapshot],
        symbols: &[String],
        date: NaiveDate,
        budget: &RunBudget,
    ) -> HashMap<String, History> {
        let prices: HashMap<&str, f64> = universe.iter().map(|t| (t.symbol.as_str(), t.price)).collect();
        let from = date - ChronoDuration::days(self.config.universe.history_lookback_days);
        let concurrency = self.config.backfill.concurrency.max(1);

        let results: Vec<(String, std::result::Result<Option<History>, ProviderError>)> =
            stream::iter(symbols.iter().filter_map(|s| prices.get(s.as_str()).map(|p| (s.clone(), *p))))
                .map(|(symbol, price)| async move {
                    if !budget.try_consume() {
                        return (
                            symbol,
                            Err(ProviderError::BudgetExhausted {
                                used: budget.used(),
                                cap: budget.cap(),
                            }),
                        );
                    }
                    let mut params = symbol_params(&symbol);
                    params.insert("from".into(), from.format("%Y-%m-%d").to_string());
                    params.insert("to".into(), date.format("%Y-%m-%d").to_string());
                    let result = self
                        .fetcher
                        .fetch(Endpoint::DailyBars, &params, true, Some(budget))
                        .await
                        .map(|doc| history_from_bars(&doc, price));
                    (symbol, result)
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

        let mut histories = HashMap::new();
        let mut failed = 0usize;
        for (symbol, result) in results {
            match result {
                Ok(Some(history)) => {
                    histories.insert(symbol, history);
                }
                Ok(None) => debug!(symbol = %symbol, "No usable daily bars"),
                Err(e) => {
                    failed += 1;
                    debug!(symbol = %symbol, error = %e, "History fetch failed");
                }
            }
        }

        info!(
            requested = symbols.len(),
            loaded = histories.len(),
            failed,
            budget_used = budget.used(),
            "History loaded"
        );
        histories
    }

    fn check_integrity(&self, selection: &FinalSelection, strict: bool) -> Result<()> {
        for item in &selection.items {
            verify_sum(&item.ticker)?;
        }

        if strict {
            for item in &selection.items {
                if !item.ticker.options.is_ok() {
                    return Err(ScoringError::OptionsNotOk {
                        symbol: item.symbol().to_string(),
                        status: item.ticker.options.status(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}

/// Turn Top-3 members whose time-stop pressure reached the rotation
/// threshold into `REPLACE` decisions.
fn mark_rotation(selection: &mut FinalSelection, rotation_due: &[String]) {
    for item in selection.items.iter_mut() {
        if item.role != Role::Alpha || !rotation_due.iter().any(|s| s == item.symbol()) {
            continue;
        }
        let decision = &mut item.ticker.decision;
        decision.action = Action::Replace;
        decision.triggers.retain(|t| *t != Trigger::TimeStop);
        decision.triggers.insert(0, Trigger::TimeStop);
        decision.triggers.truncate(3);
        info!(symbol = %item.symbol(), "Time stop reached, marked for replacement");
    }
}
