//! Stateless decision state machine.
//!
//! ```text
//! eligible = FAIL ───────────────────────────────▶ EXIT     (>= 90)
//! entryNow = PASS ───────────────────────────────▶ MAINTAIN (scaled)
//! blended  > 65 ─────────────────────────────────▶ MAINTAIN (75)
//! otherwise ─────────────────────────────────────▶ CAUTION  (65)
//! ```

use super::types::{
    Action, Decision, Eligibility, EntryState, GateReason, GateStatus, MultiTimeframe, SubScores,
    Trigger,
};
use crate::options::OptionsStatus;

/// Below this alpha score a ticker is ineligible.
pub const ELIGIBILITY_FLOOR: f64 = 40.0;
/// Minimum alpha score for an entry.
pub const ENTRY_SCORE: f64 = 60.0;
/// Minimum momentum sub-score for an entry.
pub const ENTRY_MOMENTUM: f64 = 12.0;
/// Blended score above which a non-entry still holds.
pub const STRONG_BLEND: f64 = 65.0;
/// Longer-horizon score that confirms an entry.
pub const HORIZON_CONFIRM: f64 = 60.0;

const MAX_CODES: usize = 3;

/// Evaluate eligibility and entry gates.
pub fn gate_status(alpha_score: f64, sub_scores: &SubScores, options: OptionsStatus) -> GateStatus {
    let mut reasons = Vec::with_capacity(MAX_CODES);

    let below_floor = alpha_score < ELIGIBILITY_FLOOR;
    let options_failed = options == OptionsStatus::Failed;

    if below_floor {
        reasons.push(GateReason::ScoreBelow40);
    }
    if options_failed {
        reasons.push(GateReason::OptionsFailed);
    }
    if options == OptionsStatus::Pending {
        reasons.push(GateReason::OptionsPending);
    }
    if !below_floor && alpha_score < ENTRY_SCORE {
        reasons.push(GateReason::ScoreBelow60);
    }
    if sub_scores.momentum < ENTRY_MOMENTUM {
        reasons.push(GateReason::MomentumBelow12);
    }
    reasons.truncate(MAX_CODES);

    let eligible = if below_floor || options_failed {
        Eligibility::Fail
    } else {
        Eligibility::Pass
    };

    let entry_now = match eligible {
        Eligibility::Fail => EntryState::Fail,
        Eligibility::Pass if alpha_score >= ENTRY_SCORE && sub_scores.momentum >= ENTRY_MOMENTUM => {
            EntryState::Pass
        }
        Eligibility::Pass => EntryState::Wait,
    };

    GateStatus {
        eligible,
        entry_now,
        reasons,
    }
}

/// Derive the action and confidence from the gates and the horizon blend.
pub fn decide(alpha_score: f64, gates: &GateStatus, options: OptionsStatus, mtf: &MultiTimeframe) -> Decision {
    if gates.eligible == Eligibility::Fail {
        let mut triggers = Vec::new();
        if alpha_score < ELIGIBILITY_FLOOR {
            triggers.push(Trigger::ScoreBelow40);
        }
        if options == OptionsStatus::Failed {
            triggers.push(Trigger::OptionsFailed);
        }
        let shortfall = (ELIGIBILITY_FLOOR - alpha_score).max(0.0);
        let confidence = (90.0 + (shortfall / 5.0).round()).min(99.0);
        return Decision {
            action: Action::Exit,
            confidence: confidence as u8,
            triggers,
        };
    }

    if gates.entry_now == EntryState::Pass {
        let mut confidence = (40.0 + mtf.blended * 0.5).round();
        let mut triggers = vec![Trigger::EntryPass];
        if mtf.longer_horizon_above(HORIZON_CONFIRM) {
            confidence += 5.0;
            triggers.push(Trigger::MtfConfirm);
        }
        return Decision {
            action: Action::Maintain,
            confidence: confidence.clamp(1.0, 99.0) as u8,
            triggers,
        };
    }

    if mtf.blended > STRONG_BLEND {
        return Decision {
            action: Action::Maintain,
            confidence: 75,
            triggers: vec![Trigger::MtfStrong],
        };
    }

    Decision {
        action: Action::Caution,
        confidence: 65,
        triggers: vec![Trigger::EntryWait],
    }
}
