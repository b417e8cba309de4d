//! [`RuleEngine`] – symbolic wheel-speed safety rules.
//!
//! Every tick the engine evaluates all registered [`SafetyRule`]s against the
//! current speed/vibration reading and the last speed at which the vehicle
//! was demonstrably moving.  A violation increments a [`HysteresisCounter`];
//! the engine reports [`FaultReason::SignalLoss`] only once the counter
//! exceeds its threshold.
//!
//! Two built-in rules are provided:
//! - [`ParadoxRule`] – the vehicle reports standing still yet vibrates as if
//!   it were moving.
//! - [`ImpossibleDecelerationRule`] – the speed dropped from cruising to
//!   zero with no intermediate readings, which is a sensor failure rather
//!   than braking.
//!
//! # Example
//!
//! ```
//! use neurodrive_kernel::rule_engine::RuleEngine;
//! use neurodrive_types::FaultReason;
//!
//! let mut engine = RuleEngine::standard(0.05);
//! for _ in 0..3 {
//!     assert_eq!(engine.check(0.2, 0.06), None);
//! }
//! assert_eq!(engine.check(0.2, 0.06), Some(FaultReason::SignalLoss));
//! ```

use neurodrive_types::FaultReason;
use tracing::debug;

use crate::hysteresis::HysteresisCounter;

/// Speed above which the vehicle is considered demonstrably moving.
pub const MOVING_SPEED: f32 = 1.0;

/// Consecutive violating ticks tolerated before a fault is reported.
pub const DEFAULT_FAULT_THRESHOLD: u32 = 3;

/// Cruising speed from which an instant stop is implausible.
pub const DEFAULT_CRUISE_SPEED: f32 = 20.0;

// ────────────────────────────────────────────────────────────────────────────
// Rule trait
// ────────────────────────────────────────────────────────────────────────────

/// Inputs visible to every rule on one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleContext {
    pub speed: f32,
    pub vibration: f32,
    /// Last speed reading above [`MOVING_SPEED`], or `0.0` if none yet.
    pub last_valid_speed: f32,
}

/// A single physical plausibility check on wheel-speed telemetry.
///
/// Implement this trait to add custom rules via [`RuleEngine::add_rule`].
pub trait SafetyRule: Send + Sync {
    /// Human-readable name used in log records.
    fn name(&self) -> &str;

    /// `true` when the reading violates this rule.
    fn violated(&self, ctx: &RuleContext) -> bool;
}

// ────────────────────────────────────────────────────────────────────────────
// RuleEngine
// ────────────────────────────────────────────────────────────────────────────

/// Evaluates [`SafetyRule`]s with hysteresis.
pub struct RuleEngine {
    rules: Vec<Box<dyn SafetyRule>>,
    counter: HysteresisCounter,
    last_valid_speed: f32,
}

impl RuleEngine {
    /// Empty engine that confirms after `fault_threshold` violating ticks.
    pub fn new(fault_threshold: u32) -> Self {
        Self {
            rules: Vec::new(),
            counter: HysteresisCounter::new(fault_threshold),
            last_valid_speed: 0.0,
        }
    }

    /// Engine with both built-in rules and the default threshold.
    ///
    /// `paradox_vibration` is the vibration level above which a stationary
    /// vehicle is considered paradoxical.
    pub fn standard(paradox_vibration: f32) -> Self {
        let mut engine = Self::new(DEFAULT_FAULT_THRESHOLD);
        engine.add_rule(Box::new(ParadoxRule {
            vibration_threshold: paradox_vibration,
        }));
        engine.add_rule(Box::new(ImpossibleDecelerationRule {
            cruise_speed: DEFAULT_CRUISE_SPEED,
        }));
        engine
    }

    /// Register a rule.  All rules are evaluated every tick.
    pub fn add_rule(&mut self, rule: Box<dyn SafetyRule>) {
        self.rules.push(rule);
    }

    /// Evaluate one telemetry tick.
    ///
    /// Returns [`FaultReason::SignalLoss`] once more than the threshold of
    /// consecutive stationary ticks violated at least one rule.
    pub fn check(&mut self, speed: f32, vibration: f32) -> Option<FaultReason> {
        let ctx = RuleContext {
            speed,
            vibration,
            last_valid_speed: self.last_valid_speed,
        };

        let mut violated = false;
        for rule in &self.rules {
            if rule.violated(&ctx) {
                debug!(rule = rule.name(), speed, vibration, "safety rule violated");
                violated = true;
            }
        }

        if speed > MOVING_SPEED {
            self.last_valid_speed = speed;
            self.counter.reset();
        } else if violated {
            self.counter.increment();
        } else {
            // A normal stop.
            self.counter.reset();
        }

        self.counter
            .is_confirmed()
            .then_some(FaultReason::SignalLoss)
    }

    /// Current number of consecutive violating ticks.
    pub fn fault_counter(&self) -> u32 {
        self.counter.count()
    }

    pub fn last_valid_speed(&self) -> f32 {
        self.last_valid_speed
    }

    /// Names of all registered rules, in registration order.
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in rules
// ────────────────────────────────────────────────────────────────────────────

/// Stopped (`speed < 1.0`) but vibrating above `vibration_threshold`.
pub struct ParadoxRule {
    pub vibration_threshold: f32,
}

impl SafetyRule for ParadoxRule {
    fn name(&self) -> &str {
        "physics_paradox"
    }

    fn violated(&self, ctx: &RuleContext) -> bool {
        ctx.speed < MOVING_SPEED && ctx.vibration > self.vibration_threshold
    }
}

/// Stopped (`speed < 1.0`) after last moving faster than `cruise_speed`.
pub struct ImpossibleDecelerationRule {
    pub cruise_speed: f32,
}

impl SafetyRule for ImpossibleDecelerationRule {
    fn name(&self) -> &str {
        "impossible_deceleration"
    }

    fn violated(&self, ctx: &RuleContext) -> bool {
        ctx.last_valid_speed > self.cruise_speed && ctx.speed < MOVING_SPEED
    }
}
