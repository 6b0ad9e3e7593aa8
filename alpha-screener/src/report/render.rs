//! Markdown rendering of a run snapshot.

use std::fmt::Write;

use super::Snapshot;
use crate::selection::Role;

fn opt(value: Option<f64>, decimals: usize) -> String {
    value
        .map(|v| format!("{:.*}", decimals, v))
        .unwrap_or_else(|| "-".to_string())
}

/// Render the snapshot as a Markdown report.
pub fn render_markdown(snapshot: &Snapshot) -> String {
    let mut md = String::new();

    // Header
    let _ = write!(
        md,
        "# Alpha Shortlist {}\n\n**Run**: {}\n**Generated**: {}\n**Regime**: {}\n\n",
        snapshot.report_date.format("%Y-%m-%d"),
        snapshot.run_id,
        snapshot.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        snapshot.regime,
    );

    // Status
    md.push_str("## Status\n\n");
    let _ = writeln!(
        md,
        "- **Options coverage**: {} ({:.1}%)",
        snapshot.options_status.status, snapshot.options_status.coverage_pct
    );
    let _ = writeln!(
        md,
        "- **Backfill**: {} rounds, stopped on {}, budget {}/{}",
        snapshot.backfill.rounds,
        snapshot.backfill.stop_reason,
        snapshot.backfill.budget.current,
        snapshot.backfill.budget.cap
    );
    let _ = writeln!(md, "- **Selected**: {}", snapshot.selection.total);
    if snapshot.flags.partial {
        md.push_str("- **Partial**: fewer candidates than slots\n");
    }
    if snapshot.flags.top3_fallback {
        md.push_str("- **Top-3 fallback**: ranked by score, trend gate not met\n");
    }
    if snapshot.flags.strict {
        md.push_str("- **Strict**: integrity checks enforced\n");
    }
    md.push('\n');

    // Funnel
    if !snapshot.sanitize.stages.is_empty() {
        md.push_str("### Universe funnel\n\n");
        md.push_str("| Stage | Passed | Eliminated | Rate |\n");
        md.push_str("|-------|--------|------------|------|\n");
        for stage in &snapshot.sanitize.stages {
            let _ = writeln!(
                md,
                "| {} | {} | {} | {:.1}% |",
                stage.stage, stage.passed, stage.eliminated, stage.elimination_rate
            );
        }
        md.push('\n');
    }

    // Shortlist
    for (role, title) in [
        (Role::Alpha, "Top 3"),
        (Role::Core, "Core"),
        (Role::HighRisk, "High Risk"),
    ] {
        let items: Vec<_> = snapshot.items.iter().filter(|i| i.role == role).collect();
        if items.is_empty() {
            continue;
        }

        let _ = write!(md, "## {}\n\n", title);
        md.push_str("| # | Symbol | Score | Final | Vel | Action | Conf | Options | PCR | Max Pain |\n");
        md.push_str("|---|--------|-------|-------|-----|--------|------|---------|-----|----------|\n");
        for item in items {
            let t = &item.ticker;
            let metrics = t.options.metrics();
            let _ = writeln!(
                md,
                "| {} | {}{} | {:.1} | {:.1} | {} | {} | {} | {} | {} | {} |",
                item.rank,
                t.symbol(),
                if t.ranking.is_boosted { " ⟳" } else { "" },
                t.alpha_score,
                t.ranking.final_score,
                t.velocity,
                t.decision.action,
                t.decision.confidence,
                t.options.status(),
                opt(metrics.and_then(|m| m.put_call_oi_ratio), 2),
                opt(metrics.and_then(|m| m.max_pain), 2),
            );
        }
        md.push('\n');
    }

    let notes: Vec<_> = snapshot
        .items
        .iter()
        .filter_map(|i| i.ticker.options.detail().map(|d| (i.symbol(), i.ticker.options.status(), d)))
        .collect();
    if !notes.is_empty() {
        md.push_str("## Options Notes\n\n");
        for (symbol, status, detail) in notes {
            let _ = writeln!(md, "- **{}** {}: {}", symbol, status, detail);
        }
        md.push('\n');
    }

    // Changelog
    if !snapshot.changelog.is_empty() {
        md.push_str("## Changelog\n\n");
        for entry in &snapshot.changelog {
            let _ = writeln!(md, "- {} **{}** ({})", entry.kind, entry.symbol, entry.trigger);
        }
        md.push('\n');
    }

    if !snapshot.warnings.is_empty() {
        md.push_str("## Warnings\n\n");
        for warning in &snapshot.warnings {
            let _ = writeln!(md, "- {}", warning);
        }
        md.push('\n');
    }

    md
}
