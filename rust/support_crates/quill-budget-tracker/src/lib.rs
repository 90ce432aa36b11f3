//! RAM accounting for the in-memory index buffer.
//!
//! Two numbers are tracked: bytes *allocated* (blocks and records obtained from the
//! system, whether in use or parked in a free list) and bytes *used* (the part of the
//! allocation currently holding buffered documents). The budget turns them into a
//! balancing decision:
//!
//! - allocated above `1.05 × limit`: release free blocks until allocated drops to
//!   `0.95 × limit` (and flush if nothing is left to release);
//! - otherwise used above `limit`: flush.

use std::sync::atomic::{AtomicU64, Ordering};

use counter::Counter;

pub mod counter;

/// Value of the configured RAM buffer size (in MB) that turns RAM-triggered flushing
/// off.
pub const DISABLE_AUTO_FLUSH: f64 = -1.0;

const DISABLED: u64 = u64::MAX;

const FREE_TRIGGER_RATIO: f64 = 1.05;
const FREE_LEVEL_RATIO: f64 = 0.95;

/// Shared RAM budget of one index writer.
#[derive(Debug)]
pub struct RamBudget {
    limit: AtomicU64,
    allocated: Counter,
    used: Counter,
}

/// Byte thresholds derived from the budget limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Allocated bytes above which free blocks are released.
    pub free_trigger: u64,
    /// Allocated bytes at which releasing stops.
    pub free_level: u64,
    /// Used bytes above which a flush is forced.
    pub flush_trigger: u64,
}

/// What the caller should do to bring the buffer back within the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceAction {
    /// Within budget.
    None,
    /// Release free blocks until allocated bytes are at or below `level`.
    Free { level: u64 },
    /// Flush the buffered documents.
    Flush,
}

impl RamBudget {
    /// Creates a budget limited to `limit` bytes, or an unlimited one for `None`.
    pub fn new(limit: Option<u64>) -> RamBudget {
        RamBudget {
            limit: AtomicU64::new(limit.unwrap_or(DISABLED)),
            allocated: Counter::default(),
            used: Counter::default(),
        }
    }

    /// Creates a budget from a size in megabytes; [`DISABLE_AUTO_FLUSH`] (or any
    /// non-positive value) gives an unlimited budget.
    pub fn from_mb(mb: f64) -> RamBudget {
        RamBudget::new(mb_to_bytes(mb))
    }

    pub fn set_limit(&self, limit: Option<u64>) {
        self.limit.store(limit.unwrap_or(DISABLED), Ordering::Release);
    }

    pub fn limit(&self) -> Option<u64> {
        let limit = self.limit.load(Ordering::Acquire);
        (limit != DISABLED).then_some(limit)
    }

    pub fn thresholds(&self) -> Option<Thresholds> {
        self.limit().map(|limit| Thresholds {
            free_trigger: (FREE_TRIGGER_RATIO * limit as f64) as u64,
            free_level: (FREE_LEVEL_RATIO * limit as f64) as u64,
            flush_trigger: limit,
        })
    }

    /// Records `bytes` newly obtained from the system.
    pub fn note_allocation(&self, bytes: u64) {
        self.allocated.deposit(bytes);
    }

    /// Records `bytes` handed back to the system.
    pub fn release_allocation(&self, bytes: u64) {
        let released = self.allocated.withdraw_saturating(bytes);
        debug_assert_eq!(released, bytes, "released more than allocated");
    }

    /// Records `bytes` of the allocation as now holding buffered data.
    pub fn note_use(&self, bytes: u64) {
        self.used.deposit(bytes);
        debug_assert!(
            self.used.read() <= self.allocated.read(),
            "used {} exceeds allocated {}",
            self.used.read(),
            self.allocated.read()
        );
    }

    /// Records `bytes` as no longer holding buffered data. Saturates at zero, since a
    /// flush may already have reset the used amount.
    pub fn release_use(&self, bytes: u64) -> u64 {
        self.used.withdraw_saturating(bytes)
    }

    /// Marks every allocated byte as unused again, returning the previous used amount.
    pub fn reset_used(&self) -> u64 {
        self.used.drain()
    }

    pub fn used(&self) -> u64 {
        self.used.read()
    }

    pub fn allocated(&self) -> u64 {
        self.allocated.read()
    }

    /// Returns `true` once used bytes are close enough to the limit (95%) that the
    /// caller should run a balancing pass.
    pub fn should_balance(&self) -> bool {
        match self.thresholds() {
            Some(t) => self.used() > t.free_level,
            None => false,
        }
    }

    /// Decides the balancing action for the current counters.
    pub fn plan(&self) -> BalanceAction {
        let Some(t) = self.thresholds() else {
            return BalanceAction::None;
        };
        if self.allocated() > t.free_trigger {
            BalanceAction::Free { level: t.free_level }
        } else if self.used() > t.flush_trigger {
            BalanceAction::Flush
        } else {
            BalanceAction::None
        }
    }
}

impl Default for RamBudget {
    fn default() -> Self {
        RamBudget::new(None)
    }
}

/// Converts a buffer size in megabytes to bytes; non-positive sizes mean "unlimited".
pub fn mb_to_bytes(mb: f64) -> Option<u64> {
    (mb > 0.0).then(|| (mb * 1024.0 * 1024.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds() {
        let budget = RamBudget::new(Some(1000));
        assert_eq!(
            budget.thresholds(),
            Some(Thresholds {
                free_trigger: 1050,
                free_level: 950,
                flush_trigger: 1000,
            })
        );
        assert_eq!(RamBudget::from_mb(DISABLE_AUTO_FLUSH).thresholds(), None);
        assert_eq!(RamBudget::from_mb(1.0).limit(), Some(1024 * 1024));
    }

    #[test]
    fn test_plan_free_before_flush() {
        let budget = RamBudget::new(Some(1000));
        budget.note_allocation(900);
        budget.note_use(900);
        assert_eq!(budget.plan(), BalanceAction::None);
        assert!(!budget.should_balance());

        budget.note_allocation(100);
        budget.note_use(60);
        assert!(budget.should_balance());
        assert_eq!(budget.plan(), BalanceAction::None);

        budget.note_use(40);
        budget.note_allocation(1);
        budget.note_use(1);
        assert_eq!(budget.plan(), BalanceAction::Flush);

        budget.note_allocation(200);
        assert_eq!(budget.plan(), BalanceAction::Free { level: 950 });
    }

    #[test]
    fn test_unlimited_never_balances() {
        let budget = RamBudget::default();
        budget.note_allocation(u32::MAX as u64);
        budget.note_use(u32::MAX as u64);
        assert!(!budget.should_balance());
        assert_eq!(budget.plan(), BalanceAction::None);
    }

    #[test]
    fn test_reset_used_keeps_allocation() {
        let budget = RamBudget::new(Some(100));
        budget.note_allocation(64);
        budget.note_use(64);
        assert_eq!(budget.reset_used(), 64);
        assert_eq!(budget.used(), 0);
        assert_eq!(budget.allocated(), 64);
        budget.release_allocation(64);
        assert_eq!(budget.allocated(), 0);
    }

    #[test]
    fn test_release_use_saturates() {
        let budget = RamBudget::new(Some(100));
        budget.note_allocation(80);
        budget.note_use(30);
        assert_eq!(budget.release_use(20), 20);
        assert_eq!(budget.release_use(20), 10);
        assert_eq!(budget.used(), 0);
        assert_eq!(budget.allocated(), 80);
    }

    #[test]
    fn test_set_limit() {
        let budget = RamBudget::new(None);
        budget.set_limit(Some(10));
        assert_eq!(budget.limit(), Some(10));
        budget.set_limit(None);
        assert_eq!(budget.limit(), None);
    }
}
