//! Multi-horizon blend.

use alpha_common::util::round1;

use super::types::MultiTimeframe;
use crate::data::History;

/// Horizon score from a 1-week change.
pub fn week_score(change_1w: f64) -> f64 {
    (50.0 + 2.5 * change_1w).clamp(0.0, 100.0)
}

/// Horizon score from a 1-month change.
pub fn month_score(change_1m: f64) -> f64 {
    (50.0 + 1.25 * change_1m).clamp(0.0, 100.0)
}

/// Blend the 1D score with whichever longer horizons are known.
///
/// | 1W | 1M | weights |
/// |----|----|---------|
/// | ✓  | ✓  | 50/30/20 |
/// | ✗  | ✓  | 70/0/30 |
/// | ✓  | ✗  | 80/20/0 |
/// | ✗  | ✗  | 100/0/0 |
pub fn blend(score_1d: f64, history: Option<&History>) -> MultiTimeframe {
    let score_1w = history.and_then(|h| h.change_1w).filter(|c| c.is_finite()).map(week_score);
    let score_1m = history.and_then(|h| h.change_1m).filter(|c| c.is_finite()).map(month_score);

    let (blended, weights, fallback_reason) = match (score_1w, score_1m) {
        (Some(w), Some(m)) => (0.5 * score_1d + 0.3 * w + 0.2 * m, "50/30/20", None),
        (None, Some(m)) => (
            0.7 * score_1d + 0.3 * m,
            "70/0/30",
            Some("1W history unavailable; weight moved to 1D"),
        ),
        (Some(w), None) => (
            0.8 * score_1d + 0.2 * w,
            "80/20/0",
            Some("1M history unavailable; weight moved to 1D"),
        ),
        (None, None) => (
            score_1d,
            "100/0/0",
            Some("1W and 1M history unavailable; 1D only"),
        ),
    };

    MultiTimeframe {
        score_1d,
        score_1w: score_1w.map(round1),
        score_1m: score_1m.map(round1),
        blended: round1(blended),
        weights: weights.to_string(),
        fallback_reason: fallback_reason.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(w: Option<f64>, m: Option<f64>) -> History {
        History {
            change_1w: w,
            change_1m: m,
            reference_high: None,
        }
    }

    #[test]
    fn test_weight_sets_follow_available_horizons() {
        let cases = [
            (Some(2.0), Some(4.0), "50/30/20"),
            (None, Some(4.0), "70/0/30"),
            (Some(2.0), None, "80/20/0"),
            (None, None, "100/0/0"),
        ];

        for (w, m, expected) in cases {
            let mtf = blend(60.0, Some(&history(w, m)));
            assert_eq!(mtf.weights, expected);
            assert_eq!(mtf.fallback_reason.is_none(), expected == "50/30/20");
        }

        assert_eq!(blend(60.0, None).weights, "100/0/0");
    }

    #[test]
    fn test_blended_value() {
        // 1W: 50 + 2.5*4 = 60, 1M: 50 + 1.25*8 = 60
        let mtf = blend(70.0, Some(&history(Some(4.0), Some(8.0))));
        assert_eq!(mtf.score_1w, Some(60.0));
        assert_eq!(mtf.score_1m, Some(60.0));
        assert!((mtf.blended - 65.0).abs() < 1e-9);
        assert!(!mtf.longer_horizon_above(60.0));
    }

    #[test]
    fn test_horizon_scores_are_clamped() {
        assert_eq!(week_score(40.0), 100.0);
        assert_eq!(month_score(-100.0), 0.0);
    }
}
