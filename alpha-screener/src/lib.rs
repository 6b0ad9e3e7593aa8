//! Alpha Screener Library
//!
//! Daily equity shortlist selection: a broad US universe is sanitized,
//! the strongest names are enriched with options analytics under a strict
//! request budget, and a churn-resistant 12-name shortlist is emitted with
//! an explicit decision per ticker.
//!
//! # Architecture
//!
//! ```text
//!  market snapshot
//!        │
//!        ▼
//!  universe ──▶ backfill ──▶ amplifier ──▶ selection ──▶ tracker ──▶ report
//!  sanitize,    options      anti-churn,   TPG gate,     changelog,   snapshot,
//!  rank         rounds       tiers         3/7/2         time stop    markdown
//! ```
//!
//! # Key Concepts
//!
//! ## Scoring
//! - Five factors in `[0, 20]`: momentum, options, structure, regime, risk
//! - `alphaScore` is their sum and is never adjusted afterwards; later
//!   stages write to the ticker's `ranking` block
//!
//! ## Backfill
//! - Options for the heavy subset are fetched over bounded rounds
//! - `OK` results are frozen, tickers without listed options are excluded
//! - A shared request budget turns into a soft stop when spent
//!
//! ## Selection
//! - 3 ALPHA (trend-persistence confirmed), 7 CORE, 2 HIGH_RISK
//! - At most 3 new entrants per run, incumbents kept when still eligible

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod amplifier;
pub mod backfill;
pub mod config;
pub mod data;
pub mod error;
pub mod options;
pub mod pipeline;
pub mod report;
pub mod scoring;
pub mod selection;
pub mod tpg;
pub mod tracker;
pub mod universe;

pub use config::ScreenerConfig;
pub use error::PipelineError;
pub use pipeline::{RunOptions, ShortlistPipeline};
pub use report::{FileReportStore, ReportStore, Snapshot};
pub use tracker::{JsonFileTrackerStore, SqliteTrackerStore, TrackerStore};
