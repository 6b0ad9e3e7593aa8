//! Multi-horizon history derived from daily bars.

use serde_json::Value;

use super::snapshot::History;

/// Sessions in one week.
const WEEK_SESSIONS: usize = 5;
/// Sessions in one month.
const MONTH_SESSIONS: usize = 21;

/// Derive 1W/1M changes and the reference high from a daily-bars document.
///
/// Expected shape: `{"results": [{"t": <ms>, "c": close, "h": high}, ...]}`.
/// A horizon is left `None` when there are not enough sessions to measure it;
/// it is never filled with a placeholder.
pub fn history_from_bars(doc: &Value, price: f64) -> Option<History> {
    let rows = doc.get("results")?.as_array()?;

    let mut bars: Vec<(i64, f64, f64)> = rows
        .iter()
        .filter_map(|row| {
            let t = row.get("t")?.as_i64()?;
            let close = row.get("c")?.as_f64().filter(|c| *c > 0.0)?;
            let high = row.get("h").and_then(Value::as_f64).unwrap_or(close);
            Some((t, close, high))
        })
        .collect();

    if bars.is_empty() || price <= 0.0 {
        return None;
    }
    bars.sort_by_key(|(t, _, _)| *t);

    let change_over = |sessions: usize| -> Option<f64> {
        let idx = bars.len().checked_sub(sessions + 1)?;
        let base = bars[idx].1;
        Some((price / base - 1.0) * 100.0)
    };

    let window_start = bars.len().saturating_sub(MONTH_SESSIONS);
    let reference_high = bars[window_start..]
        .iter()
        .map(|(_, _, high)| *high)
        .fold(f64::NEG_INFINITY, f64::max);

    Some(History {
        change_1w: change_over(WEEK_SESSIONS),
        change_1m: change_over(MONTH_SESSIONS),
        reference_high: reference_high.is_finite().then_some(reference_high),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bars(closes: &[f64]) -> Value {
        let results: Vec<Value> = closes
            .iter()
            .enumerate()
            .map(|(i, c)| json!({"t": i as i64 * 86_400_000, "c": c, "h": c * 1.01}))
            .collect();
        json!({ "results": results })
    }

    #[test]
    fn test_week_only_history() {
        let doc = bars(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0, 106.0]);
        let history = history_from_bars(&doc, 110.0).unwrap();
        // base is 6 sessions back from the last bar: 101.0
        assert!((history.change_1w.unwrap() - (110.0 / 101.0 - 1.0) * 100.0).abs() < 1e-9);
        assert!(history.change_1m.is_none());
        assert!((history.reference_high.unwrap() - 106.0 * 1.01).abs() < 1e-9);
    }

    #[test]
    fn test_full_month_history() {
        let closes: Vec<f64> = (0..30).map(|i| 50.0 + i as f64).collect();
        let history = history_from_bars(&bars(&closes), 80.0).unwrap();
        assert!(history.change_1w.is_some());
        assert!(history.change_1m.is_some());
    }

    #[test]
    fn test_empty_or_missing_results() {
        assert!(history_from_bars(&json!({"results": []}), 10.0).is_none());
        assert!(history_from_bars(&json!({}), 10.0).is_none());
    }
}
