//! IN / OUT / NO_CHANGE changelog between two Top-3 lists.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    In,
    Out,
    NoChange,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::In => write!(f, "IN"),
            Self::Out => write!(f, "OUT"),
            Self::NoChange => write!(f, "NO_CHANGE"),
        }
    }
}

/// One line of the changelog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangelogEntry {
    pub kind: ChangeKind,
    pub symbol: String,
    /// Rank in the previous Top-3 (1-based)
    #[serde(default)]
    pub prev_rank: Option<usize>,
    /// Rank in today's Top-3 (1-based)
    #[serde(default)]
    pub rank: Option<usize>,
    pub trigger: String,
}

/// Pressure at which an exit is attributed to the time stop outright.
pub const TIME_STOP_FULL: u32 = 8;
/// Pressure at which an exit is attributed to a partial time stop.
pub const TIME_STOP_PARTIAL: u32 = 5;

/// Diff two Top-3 lists.
///
/// * `pressure_of` - time-stop pressure of a leaving symbol
/// * `shortlist_rank_of` - rank of a symbol in today's full shortlist, if any
///
/// Output order: OUT by previous rank, IN by rank, NO_CHANGE by rank.
pub fn build_changelog(
    previous: &[String],
    current: &[String],
    pressure_of: impl Fn(&str) -> u32,
    shortlist_rank_of: impl Fn(&str) -> Option<usize>,
) -> Vec<ChangelogEntry> {
    let rank_in = |list: &[String], symbol: &str| list.iter().position(|s| s == symbol).map(|i| i + 1);

    let mut outs = Vec::new();
    for (i, symbol) in previous.iter().enumerate() {
        if current.contains(symbol) {
            continue;
        }
        let prev_rank = i + 1;
        let pressure = pressure_of(symbol);
        let trigger = if pressure >= TIME_STOP_FULL {
            format!("TimeStop +{}", TIME_STOP_FULL)
        } else if pressure >= TIME_STOP_PARTIAL {
            format!("+{}", TIME_STOP_PARTIAL)
        } else {
            match shortlist_rank_of(symbol) {
                Some(r) => format!("RANK {}→{}", prev_rank, r),
                None => format!("RANK {}→OUT", prev_rank),
            }
        };
        outs.push(ChangelogEntry {
            kind: ChangeKind::Out,
            symbol: symbol.clone(),
            prev_rank: Some(prev_rank),
            rank: None,
            trigger,
        });
    }

    let mut ins = Vec::new();
    let mut unchanged = Vec::new();
    for (i, symbol) in current.iter().enumerate() {
        let rank = i + 1;
        match rank_in(previous, symbol) {
            None => {
                let trigger = if rank <= 2 && !outs.is_empty() { "EH" } else { "+3" };
                ins.push(ChangelogEntry {
                    kind: ChangeKind::In,
                    symbol: symbol.clone(),
                    prev_rank: None,
                    rank: Some(rank),
                    trigger: trigger.to_string(),
                });
            }
            Some(prev_rank) if prev_rank != rank => unchanged.push(ChangelogEntry {
                kind: ChangeKind::NoChange,
                symbol: symbol.clone(),
                prev_rank: Some(prev_rank),
                rank: Some(rank),
                trigger: format!("RANK {}→{}", prev_rank, rank),
            }),
            Some(_) => {}
        }
    }

    outs.into_iter().chain(ins).chain(unchanged).collect()
}
