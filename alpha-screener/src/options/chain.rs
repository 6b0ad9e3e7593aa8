//! Option chain analytics.
//!
//! Every metric is computed from open interest. Volume is never used as a
//! stand-in: a chain without open interest is an error, not a proxy.

use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use super::OptionsMetrics;

/// Contract multiplier for US equity options.
const CONTRACT_MULTIPLIER: f64 = 100.0;

/// Set on a merged chain document when pagination stopped early.
pub const TRUNCATED_AFTER_PAGES: &str = "truncatedAfterPages";

/// Note for a chain whose pagination stopped before the last page.
pub fn truncation_note(doc: &Value) -> Option<String> {
    let pages = doc.get(TRUNCATED_AFTER_PAGES)?.as_u64()?;
    Some(format!(
        "chain truncated after {} pages; open interest is partial",
        pages
    ))
}

/// Errors produced while analysing a chain.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChainError {
    /// The chain lists no contracts at all
    #[error("chain has no contracts")]
    NoContracts,
    /// Contracts exist but none carries open interest
    #[error("chain has no open interest data")]
    MissingOpenInterest,
    /// The document does not look like a chain
    #[error("malformed chain: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Call,
    Put,
}

#[derive(Debug, Clone, Copy)]
struct Contract {
    side: Side,
    strike: f64,
    open_interest: f64,
    gamma: Option<f64>,
}

fn parse_contract(row: &Value) -> Option<Contract> {
    let details = row.get("details")?;
    let side = match details.get("contract_type")?.as_str()? {
        "call" => Side::Call,
        "put" => Side::Put,
        _ => return None,
    };
    let strike = details
        .get("strike_price")?
        .as_f64()
        .filter(|s| s.is_finite() && *s > 0.0)?;
    let open_interest = row
        .get("open_interest")?
        .as_f64()
        .filter(|oi| oi.is_finite() && *oi >= 0.0)?;
    let gamma = row
        .get("greeks")
        .and_then(|g| g.get("gamma"))
        .and_then(Value::as_f64)
        .filter(|g| g.is_finite());

    Some(Contract {
        side,
        strike,
        open_interest,
        gamma,
    })
}

/// Analyse a chain document (`{"results": [...]}`) at the given spot price.
pub fn analytics_from_chain(doc: &Value, spot: f64) -> Result<OptionsMetrics, ChainError> {
    let rows = doc
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| ChainError::Malformed("missing results array".into()))?;

    if rows.is_empty() {
        return Err(ChainError::NoContracts);
    }
    if !(spot.is_finite() && spot > 0.0) {
        return Err(ChainError::Malformed(format!("invalid spot price {}", spot)));
    }

    let contracts: Vec<Contract> = rows.iter().filter_map(parse_contract).collect();
    if !contracts.iter().any(|c| c.open_interest > 0.0) {
        return Err(ChainError::MissingOpenInterest);
    }

    let call_oi: f64 = side_oi(&contracts, Side::Call);
    let put_oi: f64 = side_oi(&contracts, Side::Put);

    Ok(OptionsMetrics {
        max_pain: max_pain(&contracts),
        net_gex: net_gex(&contracts, spot),
        put_call_oi_ratio: (call_oi > 0.0).then(|| put_oi / call_oi),
        call_wall: wall(&contracts, Side::Call),
        put_floor: wall(&contracts, Side::Put),
    })
}

fn side_oi(contracts: &[Contract], side: Side) -> f64 {
    contracts
        .iter()
        .filter(|c| c.side == side)
        .map(|c| c.open_interest)
        .sum()
}

/// Strike at which option holders collect the least. Ties go to the lower strike.
fn max_pain(contracts: &[Contract]) -> Option<f64> {
    let mut strikes: Vec<f64> = contracts.iter().map(|c| c.strike).collect();
    strikes.sort_by(|a, b| a.total_cmp(b));
    strikes.dedup();

    let payout_at = |settle: f64| -> f64 {
        contracts
            .iter()
            .map(|c| {
                let intrinsic = match c.side {
                    Side::Call => (settle - c.strike).max(0.0),
                    Side::Put => (c.strike - settle).max(0.0),
                };
                intrinsic * c.open_interest
            })
            .sum()
    };

    let mut best: Option<(f64, f64)> = None;
    for strike in strikes {
        let payout = payout_at(strike);
        match best {
            Some((_, lowest)) if payout >= lowest => {}
            _ => best = Some((strike, payout)),
        }
    }
    best.map(|(strike, _)| strike)
}

/// Dealer gamma exposure per 1% move. `None` when no contract carries gamma.
fn net_gex(contracts: &[Contract], spot: f64) -> Option<f64> {
    let mut seen = false;
    let total: f64 = contracts
        .iter()
        .filter_map(|c| {
            let gamma = c.gamma?;
            seen = true;
            let exposure = gamma * c.open_interest * CONTRACT_MULTIPLIER * spot * spot * 0.01;
            Some(match c.side {
                Side::Call => exposure,
                Side::Put => -exposure,
            })
        })
        .sum();
    seen.then_some(total)
}

/// Strike with the largest aggregated open interest on one side.
fn wall(contracts: &[Contract], side: Side) -> Option<f64> {
    let mut by_strike: BTreeMap<u64, (f64, f64)> = BTreeMap::new();
    for c in contracts.iter().filter(|c| c.side == side) {
        let entry = by_strike.entry(c.strike.to_bits()).or_insert((c.strike, 0.0));
        entry.1 += c.open_interest;
    }

    let mut best: Option<(f64, f64)> = None;
    for (strike, oi) in by_strike.into_values() {
        if oi <= 0.0 {
            continue;
        }
        match best {
            Some((best_strike, best_oi)) if oi < best_oi || (oi == best_oi && strike > best_strike) => {}
            _ => best = Some((strike, oi)),
        }
    }
    best.map(|(strike, _)| strike)
}
