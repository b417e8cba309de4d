//! [`DecisionCore`] – one tick of fault detection and healing.
//!
//! Owns every piece of cross-tick decision state: the rule engine, the
//! anomaly detector and the healing coordinator.  Both detectors always see
//! the same sample before the coordinator acts.  The core does no I/O; the
//! engine's decision task feeds it and dispatches whatever command it
//! returns.

use neurodrive_kernel::RuleEngine;
use neurodrive_perception::AnomalyDetector;
use neurodrive_types::{
    CalibrationSet, Command, FaultReason, FaultState, NeuroError, TelemetrySample,
};

use crate::config::{DetectionThresholds, EngineConfig};
use crate::coordinator::{HealingCoordinator, Step, Verdicts};

/// Everything decided on one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub verdicts: Verdicts,
    pub step: Step,
}

pub struct DecisionCore {
    rules: RuleEngine,
    anomaly: AnomalyDetector,
    coordinator: HealingCoordinator,
}

impl DecisionCore {
    pub fn new(thresholds: &DetectionThresholds, anomaly: AnomalyDetector) -> Self {
        Self {
            rules: thresholds.rule_engine(),
            anomaly,
            coordinator: HealingCoordinator::new(
                thresholds.recovery_speed,
                thresholds.recovery_ticks,
            ),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(&config.thresholds, config.anomaly_detector())
    }

    /// Train the anomaly detector.  On error the detector stays inert and
    /// the rule engine keeps working alone.
    pub fn train(&mut self, set: &CalibrationSet) -> Result<(), NeuroError> {
        self.anomaly.train(set)
    }

    /// Evaluate one sample.
    pub fn tick(&mut self, sample: &TelemetrySample) -> TickReport {
        let rule = self.rules.check(sample.speed, sample.vibration);
        let anomaly = self.anomaly.detect_anomaly(sample.speed, sample.vibration);
        let verdicts = Verdicts {
            rule,
            anomaly,
            rule_counter: self.rules.fault_counter(),
            anomaly_counter: self.anomaly.anomaly_counter(),
        };
        let step = self.coordinator.step(sample, &verdicts);
        TickReport { verdicts, step }
    }

    /// Operator-injected signal loss.  Returns the state before the action
    /// and the command to send.
    pub fn inject_fault(&mut self) -> (FaultState, Command) {
        (self.coordinator.operator_reset(), Command::inject_fault())
    }

    /// Operator reset of every fault.  Returns the state before the action
    /// and the command to send.
    pub fn reset(&mut self) -> (FaultState, Command) {
        self.anomaly.reset_counter();
        (self.coordinator.operator_reset(), Command::clear_faults())
    }

    /// Report that a command from [`tick`][Self::tick] was not delivered.
    /// Returns the rolled-back state when it changed.
    pub fn command_failed(&mut self, command: Command) -> Option<FaultState> {
        self.coordinator.command_failed(command)
    }

    pub fn reason(&self) -> Option<FaultReason> {
        self.coordinator.reason()
    }

    pub fn state(&self) -> FaultState {
        self.coordinator.state()
    }

    pub fn is_trained(&self) -> bool {
        self.anomaly.is_trained()
    }

    pub fn healing_latched(&self) -> bool {
        self.coordinator.healing_latched()
    }
}
