//! [`EngineConfig`] – network endpoints, timing and detection thresholds.
//!
//! Every field has a default so a partial (or missing) config file still
//! yields a runnable engine.  The `[thresholds]` table gathers every tunable
//! that decides when the engine intervenes; the `[model]` table configures
//! the isolation forest.
//!
//! ```toml
//! vehicle_host = "127.0.0.1"
//! telemetry_port = 5005
//!
//! [thresholds]
//! paradox_vibration = 0.05
//! recovery_speed = 5.0
//! recovery_ticks = 3
//!
//! [model]
//! contamination = 0.01
//! ```

use std::time::Duration;

use neurodrive_kernel::rule_engine::{
    DEFAULT_CRUISE_SPEED, DEFAULT_FAULT_THRESHOLD, ImpossibleDecelerationRule, ParadoxRule,
    RuleEngine,
};
use neurodrive_perception::anomaly::DEFAULT_ANOMALY_THRESHOLD;
use neurodrive_perception::{AnomalyDetector, ForestConfig};
use neurodrive_types::NeuroError;
use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Detection thresholds
// ────────────────────────────────────────────────────────────────────────────

/// Tunables that decide when the engine raises and clears a fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionThresholds {
    /// Vibration above which a stationary vehicle is paradoxical.
    pub paradox_vibration: f32,
    /// Last moving speed above which an instant stop is impossible.
    pub cruise_speed: f32,
    /// Violating ticks tolerated by the rule engine.
    pub rule_hysteresis: u32,
    /// Net outlier verdicts tolerated by the anomaly detector.  `0` reports
    /// on the first outlier.
    pub anomaly_hysteresis: u32,
    /// Speed the vehicle must exceed, fault-free, to leave recovery.
    pub recovery_speed: f32,
    /// Consecutive ticks above `recovery_speed`, with no fault and no
    /// virtual sensor reported, before faults are cleared.
    pub recovery_ticks: u32,
}

impl Default for DetectionThresholds {
    fn default() -> Self {
        Self {
            paradox_vibration: 0.05,
            cruise_speed: DEFAULT_CRUISE_SPEED,
            rule_hysteresis: DEFAULT_FAULT_THRESHOLD,
            anomaly_hysteresis: DEFAULT_ANOMALY_THRESHOLD,
            recovery_speed: 5.0,
            recovery_ticks: 3,
        }
    }
}

impl DetectionThresholds {
    /// Rule engine with both built-in rules configured from these thresholds.
    pub fn rule_engine(&self) -> RuleEngine {
        let mut engine = RuleEngine::new(self.rule_hysteresis);
        engine.add_rule(Box::new(ParadoxRule {
            vibration_threshold: self.paradox_vibration,
        }));
        engine.add_rule(Box::new(ImpossibleDecelerationRule {
            cruise_speed: self.cruise_speed,
        }));
        engine
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Engine config
// ────────────────────────────────────────────────────────────────────────────

/// Full engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Local interface for telemetry and video listeners.
    pub bind_host: String,
    /// Host that receives commands.
    pub vehicle_host: String,
    pub telemetry_port: u16,
    pub command_port: u16,
    pub video_port: u16,
    /// Warm-up window used to gather calibration samples.
    pub calibration_secs: u64,
    /// Silence after which the telemetry link is reported offline.
    pub link_timeout_ms: u64,
    /// Telemetry poll period.
    pub poll_interval_ms: u64,
    /// Manual drive resend period.
    pub control_interval_ms: u64,
    pub thresholds: DetectionThresholds,
    pub model: ForestConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            vehicle_host: "127.0.0.1".to_string(),
            telemetry_port: 5005,
            command_port: 5006,
            video_port: 5007,
            calibration_secs: 10,
            link_timeout_ms: 1_000,
            poll_interval_ms: 10,
            control_interval_ms: 30,
            thresholds: DetectionThresholds::default(),
            model: ForestConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn telemetry_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.telemetry_port)
    }

    pub fn command_addr(&self) -> String {
        format!("{}:{}", self.vehicle_host, self.command_port)
    }

    pub fn video_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.video_port)
    }

    pub fn calibration_window(&self) -> Duration {
        Duration::from_secs(self.calibration_secs)
    }

    pub fn link_timeout(&self) -> Duration {
        Duration::from_millis(self.link_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn control_interval(&self) -> Duration {
        Duration::from_millis(self.control_interval_ms.max(1))
    }

    /// Untrained anomaly detector configured from `[model]` and `[thresholds]`.
    pub fn anomaly_detector(&self) -> AnomalyDetector {
        AnomalyDetector::isolation_forest(self.model.clone(), self.thresholds.anomaly_hysteresis)
    }

    /// Reject values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`NeuroError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<(), NeuroError> {
        let t = &self.thresholds;
        for (name, value) in [
            ("thresholds.paradox_vibration", t.paradox_vibration),
            ("thresholds.cruise_speed", t.cruise_speed),
            ("thresholds.recovery_speed", t.recovery_speed),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(NeuroError::Config(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if t.recovery_ticks == 0 {
            return Err(NeuroError::Config(
                "thresholds.recovery_ticks must be positive".to_string(),
            ));
        }
        if !(self.model.contamination > 0.0 && self.model.contamination <= 0.5) {
            return Err(NeuroError::Config(format!(
                "model.contamination must be in (0, 0.5], got {}",
                self.model.contamination
            )));
        }
        if self.model.num_trees == 0 {
            return Err(NeuroError::Config("model.num_trees must be positive".to_string()));
        }
        if self.link_timeout_ms == 0 {
            return Err(NeuroError::Config("link_timeout_ms must be positive".to_string()));
        }
        if self.bind_host.is_empty() || self.vehicle_host.is_empty() {
            return Err(NeuroError::Config("hosts must not be empty".to_string()));
        }
        Ok(())
    }
}
