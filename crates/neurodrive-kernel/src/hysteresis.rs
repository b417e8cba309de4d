//! [`HysteresisCounter`] – debouncing counter for detector alarms.
//!
//! A detector increments the counter on every tick its condition holds and
//! decrements (floored at zero) or resets it otherwise.  The alarm confirms
//! only once the counter is *strictly greater* than the threshold, so
//! single-frame noise never reaches the healing coordinator.
//!
//! # Example
//!
//! ```rust
//! use neurodrive_kernel::hysteresis::HysteresisCounter;
//!
//! let mut counter = HysteresisCounter::new(3);
//! assert!(!counter.increment()); // 1
//! assert!(!counter.increment()); // 2
//! assert!(!counter.increment()); // 3
//! assert!(counter.increment());  // 4 > 3 → confirmed
//!
//! counter.decrement();
//! assert!(!counter.is_confirmed());
//! ```

/// Debouncing counter that confirms once it exceeds `threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HysteresisCounter {
    count: u32,
    threshold: u32,
}

impl HysteresisCounter {
    /// Create a counter at zero.
    pub fn new(threshold: u32) -> Self {
        Self {
            count: 0,
            threshold,
        }
    }

    /// Record one tick where the condition held.  Returns
    /// [`is_confirmed`][Self::is_confirmed] after the update.
    pub fn increment(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        self.is_confirmed()
    }

    /// Record one tick where the condition did not hold (floored at zero).
    pub fn decrement(&mut self) {
        self.count = self.count.saturating_sub(1);
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// `true` once the counter is strictly greater than the threshold.
    pub fn is_confirmed(&self) -> bool {
        self.count > self.threshold
    }

    /// `true` when the condition has not been seen recently at all.
    pub fn is_idle(&self) -> bool {
        self.count == 0
    }
}
