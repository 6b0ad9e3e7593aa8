//! Run snapshot and report persistence.
//!
//! A snapshot is the single emitted artifact of a pipeline run: the
//! role-tagged shortlist plus every status flag a consumer needs to judge
//! how complete the run was.

pub mod render;

pub use render::render_markdown;

use alpha_common::error::{Error, Result};
use alpha_common::util::{read_json_opt, write_atomic, write_json_atomic};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::backfill::BackfillSummary;
use crate::data::MarketRegime;
use crate::selection::{FinalSelection, Role, SelectedItem};
use crate::tracker::ChangelogEntry;
use crate::universe::SanitizeReport;

// ============================================================================
// Options coverage
// ============================================================================

/// Coverage at or above which the run counts as fully enriched (%).
pub const COVERAGE_OK_PCT: f64 = 90.0;
/// Coverage at or above which the run counts as partially enriched (%).
pub const COVERAGE_PARTIAL_PCT: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoverageStatus {
    Ok,
    Partial,
    Pending,
}

impl fmt::Display for CoverageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Partial => write!(f, "PARTIAL"),
            Self::Pending => write!(f, "PENDING"),
        }
    }
}

/// Share of option-listed heavy tickers that ended `OK`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsCoverage {
    pub status: CoverageStatus,
    pub coverage_pct: f64,
}

impl OptionsCoverage {
    /// Tickers without listed options are left out of the denominator.
    /// With nothing left to enrich the run counts as fully covered.
    pub fn from_summary(summary: &BackfillSummary) -> Self {
        let listed = summary.heavy.saturating_sub(summary.no_options);
        let coverage_pct = if listed == 0 {
            100.0
        } else {
            alpha_common::util::round1(summary.ok as f64 / listed as f64 * 100.0)
        };
        let status = if coverage_pct >= COVERAGE_OK_PCT {
            CoverageStatus::Ok
        } else if coverage_pct >= COVERAGE_PARTIAL_PCT {
            CoverageStatus::Partial
        } else {
            CoverageStatus::Pending
        };
        Self { status, coverage_pct }
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Symbols per role, in rank order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionSummary {
    pub total: usize,
    pub top3: Vec<String>,
    pub core: Vec<String>,
    pub high_risk: Vec<String>,
}

impl SelectionSummary {
    pub fn from_selection(selection: &FinalSelection) -> Self {
        let symbols = |role| {
            selection
                .by_role(role)
                .map(|i| i.symbol().to_string())
                .collect::<Vec<_>>()
        };
        Self {
            total: selection.items.len(),
            top3: symbols(Role::Alpha),
            core: symbols(Role::Core),
            high_risk: symbols(Role::HighRisk),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotFlags {
    /// Fewer than the full shape could be filled
    pub partial: bool,
    /// ALPHA picks fell back to pure score order
    pub top3_fallback: bool,
    /// Strict integrity checks were applied
    pub strict: bool,
}

/// Emitted artifact of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Strictly increasing across runs of the same report kind
    pub run_id: u64,
    pub generated_at: DateTime<Utc>,
    pub report_date: NaiveDate,
    pub regime: MarketRegime,
    pub items: Vec<SelectedItem>,
    pub selection: SelectionSummary,
    pub options_status: OptionsCoverage,
    pub flags: SnapshotFlags,
    #[serde(default)]
    pub changelog: Vec<ChangelogEntry>,
    pub backfill: BackfillSummary,
    pub sanitize: SanitizeReport,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Snapshot {
    pub fn top3(&self) -> &[String] {
        &self.selection.top3
    }

    pub fn item(&self, symbol: &str) -> Option<&SelectedItem> {
        self.items.iter().find(|i| i.symbol() == symbol)
    }
}

/// Next run id: wall-clock milliseconds, bumped past the previous id.
pub fn next_run_id(now: DateTime<Utc>, previous: Option<u64>) -> u64 {
    let now_ms = u64::try_from(now.timestamp_millis()).unwrap_or(0);
    match previous {
        Some(prev) => now_ms.max(prev.saturating_add(1)),
        None => now_ms,
    }
}

// ============================================================================
// Report store
// ============================================================================

/// Dated snapshot persistence, one snapshot per kind and report date.
pub trait ReportStore: Send + Sync {
    /// Most recent snapshot of `kind`, if any.
    fn load_latest(&self, kind: &str) -> Result<Option<Snapshot>>;

    /// Most recent snapshot of `kind` dated strictly before `date`, even
    /// when a report for `date` itself already exists.
    fn load_latest_before(&self, kind: &str, date: NaiveDate) -> Result<Option<Snapshot>>;

    /// Store `snapshot` under `date`. An existing report is only replaced
    /// when `force` is set.
    fn save(&self, date: NaiveDate, kind: &str, snapshot: &Snapshot, force: bool) -> Result<()>;
}

/// `<root>/<kind>/<YYYY-MM-DD>.json`, written atomically.
#[derive(Debug, Clone)]
pub struct FileReportStore {
    root: PathBuf,
}

impl FileReportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn report_path(&self, date: NaiveDate, kind: &str) -> PathBuf {
        self.root.join(kind).join(format!("{}.json", date.format("%Y-%m-%d")))
    }

    pub fn markdown_path(&self, date: NaiveDate, kind: &str) -> PathBuf {
        self.report_path(date, kind).with_extension("md")
    }

    /// Write the Markdown rendering next to the JSON report.
    pub fn save_markdown(&self, date: NaiveDate, kind: &str, snapshot: &Snapshot) -> Result<PathBuf> {
        let path = self.markdown_path(date, kind);
        write_atomic(&path, render_markdown(snapshot).as_bytes())?;
        debug!(path = %path.display(), "Markdown report written");
        Ok(path)
    }

    /// Report dates of `kind`, ascending.
    pub fn dates(&self, kind: &str) -> Result<Vec<NaiveDate>> {
        let dir = self.root.join(kind);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut dates = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());
            if let Some(date) = parsed {
                dates.push(date);
            }
        }
        dates.sort();
        Ok(dates)
    }

    fn load(&self, date: NaiveDate, kind: &str) -> Result<Option<Snapshot>> {
        let path = self.report_path(date, kind);
        read_json_opt(&path).map_err(|e| e.with_context(format!("Failed to read report {}", path.display())))
    }
}

impl ReportStore for FileReportStore {
    fn load_latest(&self, kind: &str) -> Result<Option<Snapshot>> {
        match self.dates(kind)?.last() {
            Some(date) => self.load(*date, kind),
            None => Ok(None),
        }
    }

    fn load_latest_before(&self, kind: &str, date: NaiveDate) -> Result<Option<Snapshot>> {
        match self.dates(kind)?.into_iter().filter(|d| *d < date).last() {
            Some(prior) => self.load(prior, kind),
            None => Ok(None),
        }
    }

    fn save(&self, date: NaiveDate, kind: &str, snapshot: &Snapshot, force: bool) -> Result<()> {
        let path = self.report_path(date, kind);
        if path.exists() && !force {
            return Err(Error::AlreadyExists(format!(
                "{} report for {} (use --force to overwrite)",
                kind, date
            )));
        }

        write_json_atomic(&path, snapshot)?;
        info!(
            path = %path.display(),
            run_id = snapshot.run_id,
            items = snapshot.items.len(),
            "Report saved"
        );
        Ok(())
    }
}
