//! Generation counter used to invalidate superseded asynchronous work.
//!
//! Every asynchronous operation captures the epoch active when it was
//! issued and compares it to the current value immediately before any
//! externally observable effect. A mismatch means the operation was
//! superseded by a later `stop()`/restart and must become a silent no-op.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonically increasing generation counter.
///
/// Cloning shares the underlying counter; all clones observe the same
/// epoch. Compare-before-act is the only cancellation primitive.
#[derive(Debug, Clone, Default)]
pub struct EpochCounter {
    value: Arc<AtomicU64>,
}

impl EpochCounter {
    /// Create a counter starting at epoch 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently active epoch.
    pub fn current(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }

    /// Invalidate all work issued under earlier epochs and return the new
    /// epoch. Increments exactly once per call.
    pub fn advance(&self) -> u64 {
        self.value.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether work issued under `epoch` is still current.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.current() == epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let epochs = EpochCounter::new();
        assert_eq!(epochs.current(), 0);
        assert!(epochs.is_current(0));
    }

    #[test]
    fn advance_increments_exactly_once_per_call() {
        let epochs = EpochCounter::new();
        for n in 1..=5 {
            assert_eq!(epochs.advance(), n);
        }
        assert_eq!(epochs.current(), 5);
    }

    #[test]
    fn stale_epoch_is_not_current() {
        let epochs = EpochCounter::new();
        let captured = epochs.current();
        epochs.advance();
        assert!(!epochs.is_current(captured));
        assert!(epochs.is_current(captured + 1));
    }

    #[test]
    fn clones_share_state() {
        let epochs = EpochCounter::new();
        let clone = epochs.clone();
        epochs.advance();
        assert_eq!(clone.current(), 1);
    }
}
