//! [`CalibrationCollector`] – warm-up sampling of normal driving.
//!
//! Before monitoring starts the engine watches the vehicle for a fixed
//! window and records every moving sample.  The resulting
//! [`CalibrationSet`] (with synthetic safe points appended) is what the
//! anomaly model learns "normal" from.

use std::time::Duration;

use neurodrive_kernel::rule_engine::MOVING_SPEED;
use neurodrive_middleware::TelemetryChannel;
use neurodrive_types::CalibrationSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Default poll period during warm-up.
pub const CALIBRATION_POLL: Duration = Duration::from_millis(10);

/// Collects a [`CalibrationSet`] from live telemetry.
#[derive(Debug, Clone)]
pub struct CalibrationCollector {
    duration: Duration,
    poll_interval: Duration,
}

impl CalibrationCollector {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            poll_interval: CALIBRATION_POLL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Poll `source` for the configured window and return the finalised set.
    pub async fn collect(&self, source: &mut TelemetryChannel) -> CalibrationSet {
        self.collect_with_progress(source, |_| {}).await
    }

    /// Like [`collect`][Self::collect], calling `progress` with the remaining
    /// whole seconds (rounded down) each time that number changes.  The last
    /// second of the window reports `0`.
    ///
    /// Returns no later than one poll interval after the window closes, no
    /// matter how fast packets arrive.
    pub async fn collect_with_progress<F>(
        &self,
        source: &mut TelemetryChannel,
        mut progress: F,
    ) -> CalibrationSet
    where
        F: FnMut(u64),
    {
        let start = Instant::now();
        let deadline = start + self.duration;
        let mut set = CalibrationSet::new();
        let mut seen = 0usize;
        let mut last_reported = None;

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }

            let remaining = deadline.duration_since(now).as_secs();
            if last_reported != Some(remaining) {
                progress(remaining);
                last_reported = Some(remaining);
            }

            if let Some(sample) = source.poll() {
                seen += 1;
                if sample.speed > MOVING_SPEED {
                    set.push(sample.speed, sample.vibration);
                } else {
                    debug!(speed = sample.speed, "calibration sample ignored: stationary");
                }
            }

            tokio::select! {
                _ = ticker.tick() => {}
                _ = tokio::time::sleep_until(deadline) => break,
            }
        }

        let real = set.real_samples();
        let set = set.finalize();
        info!(
            polled = seen,
            real_samples = real,
            total = set.len(),
            fallback = real < CalibrationSet::MIN_REAL_SAMPLES,
            "calibration complete"
        );
        set
    }
}
