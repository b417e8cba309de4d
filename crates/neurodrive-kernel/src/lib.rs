//! `neurodrive-kernel` – Symbolic Safety Layer
//!
//! The deterministic half of NeuroDrive.  Nothing in here learns; every
//! decision follows from explicit physical rules and counters.
//!
//! # Modules
//!
//! - [`hysteresis`] – [`HysteresisCounter`][hysteresis::HysteresisCounter]:
//!   debouncing counter shared by both detectors.  An alarm confirms only
//!   once the counter is strictly greater than its threshold.
//! - [`rule_engine`] – [`RuleEngine`][rule_engine::RuleEngine]:
//!   evaluates registered [`SafetyRule`][rule_engine::SafetyRule]s (physics
//!   paradox, impossible deceleration) against each telemetry sample and
//!   reports [`FaultReason::SignalLoss`][neurodrive_types::FaultReason::SignalLoss]
//!   after sustained violation.
//! - [`watchdog`] – [`LinkWatchdog`][watchdog::LinkWatchdog]:
//!   detects a silent telemetry link and reports loss/restoration edges.

pub mod hysteresis;
pub mod rule_engine;
pub mod watchdog;

pub use hysteresis::HysteresisCounter;
pub use rule_engine::{
    ImpossibleDecelerationRule, ParadoxRule, RuleContext, RuleEngine, SafetyRule,
};
pub use watchdog::{LinkTransition, LinkWatchdog};
