//! [`LinkWatchdog`] – telemetry link health monitor.
//!
//! The decision task calls [`LinkWatchdog::feed`] every time a fresh sample
//! arrives and [`LinkWatchdog::check`] on every idle tick.  The watchdog
//! considers the link *lost* once no sample has been seen for longer than
//! the configured timeout.
//!
//! Both calls report edges only, so the caller can log or alert exactly once
//! per silence episode:
//!
//! - `check` returns [`LinkTransition::Lost`] on the first call after the
//!   deadline passes, then [`LinkTransition::Unchanged`] until the link
//!   comes back.
//! - `feed` returns [`LinkTransition::Restored`] on the first sample after a
//!   loss.

use std::time::{Duration, Instant};

/// Default silence tolerated before the link is declared lost.
pub const DEFAULT_LINK_TIMEOUT: Duration = Duration::from_secs(1);

/// Edge reported by [`LinkWatchdog::feed`] and [`LinkWatchdog::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTransition {
    Unchanged,
    /// The deadline has just been exceeded.
    Lost,
    /// A sample arrived after the link had been declared lost.
    Restored,
}

/// Tracks the age of the last telemetry sample.
///
/// # Example
///
/// ```
/// use std::time::{Duration, Instant};
/// use neurodrive_kernel::watchdog::{LinkTransition, LinkWatchdog};
///
/// let start = Instant::now();
/// let mut wd = LinkWatchdog::starting_at(Duration::from_millis(100), start);
///
/// assert_eq!(wd.check_at(start + Duration::from_millis(50)), LinkTransition::Unchanged);
/// assert_eq!(wd.check_at(start + Duration::from_millis(150)), LinkTransition::Lost);
/// assert_eq!(wd.check_at(start + Duration::from_millis(300)), LinkTransition::Unchanged);
/// assert_eq!(wd.feed_at(start + Duration::from_millis(310)), LinkTransition::Restored);
/// ```
#[derive(Debug, Clone)]
pub struct LinkWatchdog {
    timeout: Duration,
    last_seen: Instant,
    lost: bool,
}

impl LinkWatchdog {
    /// Create a watchdog whose deadline starts counting now.
    pub fn new(timeout: Duration) -> Self {
        Self::starting_at(timeout, Instant::now())
    }

    pub fn starting_at(timeout: Duration, now: Instant) -> Self {
        Self {
            timeout,
            last_seen: now,
            lost: false,
        }
    }

    /// Record a fresh sample.
    pub fn feed(&mut self) -> LinkTransition {
        self.feed_at(Instant::now())
    }

    pub fn feed_at(&mut self, now: Instant) -> LinkTransition {
        self.last_seen = now;
        if std::mem::replace(&mut self.lost, false) {
            LinkTransition::Restored
        } else {
            LinkTransition::Unchanged
        }
    }

    /// Evaluate the deadline.
    pub fn check(&mut self) -> LinkTransition {
        self.check_at(Instant::now())
    }

    pub fn check_at(&mut self, now: Instant) -> LinkTransition {
        if self.lost {
            return LinkTransition::Unchanged;
        }
        if now.saturating_duration_since(self.last_seen) > self.timeout {
            self.lost = true;
            LinkTransition::Lost
        } else {
            LinkTransition::Unchanged
        }
    }

    /// `true` between a [`LinkTransition::Lost`] and the next sample.
    pub fn is_lost(&self) -> bool {
        self.lost
    }

    /// Time since the last sample (or since creation).
    pub fn silence(&self) -> Duration {
        self.last_seen.elapsed()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for LinkWatchdog {
    fn default() -> Self {
        Self::new(DEFAULT_LINK_TIMEOUT)
    }
}
