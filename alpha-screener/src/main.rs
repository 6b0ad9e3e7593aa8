//! Alpha Screener - daily shortlist runner.
//!
//! `alpha-screener run` executes one pipeline run and stores the snapshot;
//! `alpha-screener show` prints a stored report.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use alpha_common::config::Config;
use alpha_common::logging::init_logging_with_exclusions;
use alpha_screener::backfill::{ProgressEvent, SystemClock};
use alpha_screener::data::{HttpMarketDataFetcher, MarketRegime};
use alpha_screener::report::render_markdown;
use alpha_screener::{
    FileReportStore, JsonFileTrackerStore, ReportStore, RunOptions, ScreenerConfig, ShortlistPipeline,
    SqliteTrackerStore, TrackerStore,
};

#[derive(Parser, Debug)]
#[command(name = "alpha-screener")]
#[command(version)]
#[command(about = "Daily equity shortlist: 3 alpha, 7 core, 2 high-risk", long_about = None)]
struct Cli {
    /// Config file (default: ~/.alpha-shortlist/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pipeline and store the snapshot
    Run {
        /// Report date (YYYY-MM-DD, default: today UTC)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Market regime (risk-on, neutral, risk-off)
        #[arg(long, default_value = "neutral")]
        regime: MarketRegime,

        /// Require OK options on every shortlisted ticker
        #[arg(long)]
        strict: bool,

        /// Enforce the eligible-universe quality gate
        #[arg(long)]
        production: bool,

        /// Overwrite an existing report for the same date
        #[arg(long)]
        force: bool,
    },

    /// Print a stored report
    Show {
        /// Report date (default: latest)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Print the raw JSON snapshot instead of Markdown
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_with_env(cli.config.as_deref()).context("Failed to load configuration")?;
    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    let screener = ScreenerConfig::from_config(&config).context("Invalid screener configuration")?;
    let data_dir = config.storage.data_dir();
    let reports = Arc::new(FileReportStore::new(data_dir.join("reports")));

    match cli.command {
        Commands::Run {
            date,
            regime,
            strict,
            production,
            force,
        } => {
            let tracker = open_tracker(&config, &data_dir)?;
            let options = RunOptions {
                report_date: date.unwrap_or_else(|| Utc::now().date_naive()),
                regime,
                strict,
                production,
                force,
            };
            run(config, screener, reports, tracker, options).await
        }
        Commands::Show { date, json } => show(&reports, &screener.report.kind, date, json),
    }
}

fn open_tracker(config: &Config, data_dir: &std::path::Path) -> Result<Arc<dyn TrackerStore>> {
    match config.storage.tracker_backend.as_str() {
        "sqlite" => {
            let store = SqliteTrackerStore::open(data_dir.join("tracker.db"))
                .context("Failed to open tracker database")?;
            Ok(Arc::new(store))
        }
        "json" => Ok(Arc::new(JsonFileTrackerStore::new(data_dir.join("tracker.json")))),
        other => anyhow::bail!("Unknown tracker backend: {} (expected json or sqlite)", other),
    }
}

async fn run(
    config: Config,
    screener: ScreenerConfig,
    reports: Arc<FileReportStore>,
    tracker: Arc<dyn TrackerStore>,
    options: RunOptions,
) -> Result<()> {
    info!("Alpha Screener v{}", env!("CARGO_PKG_VERSION"));

    if config.market_data.api_key.is_none() {
        warn!("No market data API key configured (set ALPHA_API_KEY)");
    }

    let markdown = screener.report.markdown;
    let kind = screener.report.kind.clone();
    let fetcher = Arc::new(HttpMarketDataFetcher::from_config(&config.market_data));
    let clock = Arc::new(SystemClock::new());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let progress = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            log_progress(&event);
        }
    });

    let pipeline = ShortlistPipeline::new(screener, fetcher, clock, reports.clone(), tracker).with_progress(tx);
    let result = pipeline.run(&options).await;
    drop(pipeline);
    let _ = progress.await;

    let snapshot = result.context("Shortlist run failed")?;

    if markdown {
        let path = reports
            .save_markdown(options.report_date, &kind, &snapshot)
            .context("Failed to write Markdown report")?;
        info!(path = %path.display(), "Markdown report written");
    }

    println!(
        "{} run {}: {} items, Top-3 {:?}, options {} ({:.1}%)",
        snapshot.report_date,
        snapshot.run_id,
        snapshot.items.len(),
        snapshot.selection.top3,
        snapshot.options_status.status,
        snapshot.options_status.coverage_pct
    );
    Ok(())
}

fn show(reports: &FileReportStore, kind: &str, date: Option<NaiveDate>, json: bool) -> Result<()> {
    let snapshot = match date {
        Some(d) => reports
            .load_latest_before(kind, d.succ_opt().unwrap_or(d))?
            .filter(|s| s.report_date == d),
        None => reports.load_latest(kind)?,
    };

    let Some(snapshot) = snapshot else {
        let what = date.map_or_else(|| "latest".to_string(), |d| d.to_string());
        return Err(alpha_common::Error::NotFound(format!(
            "{} {} report in {}",
            what,
            kind,
            reports.root().display()
        ))
        .into());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print!("{}", render_markdown(&snapshot));
    }
    Ok(())
}

fn log_progress(event: &ProgressEvent) {
    match event {
        ProgressEvent::RoundCompleted {
            round,
            ok,
            pending,
            budget_used,
        } => info!(round, ok, pending, budget_used, "Backfill round finished"),
        ProgressEvent::BudgetExhausted { round, used, cap } => {
            warn!(round, used, cap, "Backfill budget exhausted")
        }
        ProgressEvent::Finished { rounds, reason } => info!(rounds, reason = %reason, "Backfill finished"),
        other => debug!(event = ?other, "Backfill progress"),
    }
}
