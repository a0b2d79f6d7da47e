//! store::throttle
//!
//! Counter-and-threshold bookkeeping that turns many reported mutations
//! into periodic commits. The throttle never inspects content; it only
//! counts what the caller reports.

use crate::core::config::DEFAULT_MAX_UNCOMMITTED_CHANGES;

/// Per-reference change counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeThrottle {
    count: u64,
    threshold: u64,
}

impl ChangeThrottle {
    /// A throttle with zero recorded changes.
    pub fn new(threshold: u64) -> Self {
        Self {
            count: 0,
            threshold,
        }
    }

    /// Changes recorded since the last reset.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: u64) {
        self.threshold = threshold;
    }

    /// Record one change.
    pub fn record(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    /// Whether enough changes accumulated to warrant a commit.
    pub fn is_due(&self) -> bool {
        self.count >= self.threshold
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

impl Default for ChangeThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UNCOMMITTED_CHANGES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_threshold_is_100() {
        let throttle = ChangeThrottle::default();
        assert_eq!(throttle.threshold(), 100);
        assert_eq!(throttle.count(), 0);
    }

    #[test]
    fn due_at_threshold() {
        let mut throttle = ChangeThrottle::new(3);
        throttle.record();
        throttle.record();
        assert!(!throttle.is_due());
        throttle.record();
        assert!(throttle.is_due());
    }

    #[test]
    fn reset_clears_count() {
        let mut throttle = ChangeThrottle::new(2);
        throttle.record();
        throttle.record();
        throttle.reset();
        assert_eq!(throttle.count(), 0);
        assert!(!throttle.is_due());
    }

    #[test]
    fn lowering_threshold_can_make_due() {
        let mut throttle = ChangeThrottle::new(10);
        for _ in 0..4 {
            throttle.record();
        }
        throttle.set_threshold(4);
        assert!(throttle.is_due());
    }
}
