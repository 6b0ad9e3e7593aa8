//! Global request budget for one pipeline run.
//!
//! The budget is the only counter shared across backfill workers. It is a
//! single atomic with a compare-and-swap consume loop, so concurrent fetches
//! can never spend past the cap.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Caps the number of upstream calls made during a run.
#[derive(Debug)]
pub struct RunBudget {
    current: AtomicU64,
    cap: u64,
}

/// Serializable view of a budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetUsage {
    pub current: u64,
    pub cap: u64,
}

impl RunBudget {
    /// Create a budget allowing `cap` requests.
    pub fn new(cap: u64) -> Self {
        Self {
            current: AtomicU64::new(0),
            cap,
        }
    }

    /// Charge one request. Returns `false` (and charges nothing) when the
    /// budget is already spent.
    pub fn try_consume(&self) -> bool {
        loop {
            let current = self.current.load(Ordering::Acquire);
            if current >= self.cap {
                return false;
            }

            if self
                .current
                .compare_exchange_weak(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Requests charged so far.
    pub fn used(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    /// Configured cap.
    pub fn cap(&self) -> u64 {
        self.cap
    }

    /// Requests still available.
    pub fn remaining(&self) -> u64 {
        self.cap.saturating_sub(self.used())
    }

    /// `current >= cap`.
    pub fn is_exhausted(&self) -> bool {
        self.used() >= self.cap
    }

    /// Point-in-time usage.
    pub fn usage(&self) -> BudgetUsage {
        BudgetUsage {
            current: self.used(),
            cap: self.cap,
        }
    }
}
