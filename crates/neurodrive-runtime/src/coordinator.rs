//! [`HealingCoordinator`] – fault lifecycle state machine.
//!
//! Combines both detector verdicts for one tick into a [`FaultState`]
//! transition and decides which command, if any, goes to the vehicle.
//!
//! | State | Trigger | Next | Command |
//! |---|---|---|---|
//! | NORMAL / SUSPECTED | fault, latch clear | CONFIRMED | `HEAL(1, 0)`, latch set |
//! | NORMAL | a detector counter is non-zero | SUSPECTED | – |
//! | SUSPECTED | all counters zero | NORMAL | – |
//! | CONFIRMED | next tick | HEALING | – |
//! | CONFIRMED / HEALING | vehicle reports healed | RECOVERING | – |
//! | HEALING / RECOVERING | `recovery_ticks` consecutive ticks with no fault, no healed status and speed above recovery speed | NORMAL | `FAULT(0, 0)`, latch cleared |
//!
//! The latch guarantees at most one HEAL per fault episode.  A sample that
//! still reports the virtual sensor never counts towards recovery: the speed
//! it carries is the virtual one, and clearing it would re-expose the failed
//! sensor.
//!
//! When a command cannot be delivered, [`HealingCoordinator::command_failed`]
//! rolls the state back so the next tick can resend it.

use neurodrive_kernel::HysteresisCounter;
use neurodrive_types::{
    Command, CommandKind, FaultReason, FaultState, TelemetrySample, VehicleStatus,
};
use tracing::{info, warn};

/// Detector results for one tick, all computed from the same sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdicts {
    pub rule: Option<FaultReason>,
    pub anomaly: bool,
    pub rule_counter: u32,
    pub anomaly_counter: u32,
}

impl Verdicts {
    /// Combined fault reason.  The rule engine wins when both fire.
    pub fn reason(&self) -> Option<FaultReason> {
        self.rule
            .or(self.anomaly.then_some(FaultReason::NeuralAnomaly))
    }

    fn counters_idle(&self) -> bool {
        self.rule_counter == 0 && self.anomaly_counter == 0
    }
}

/// Result of one [`HealingCoordinator::step`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub from: FaultState,
    pub to: FaultState,
    /// Reason of the active fault episode, if any.
    pub reason: Option<FaultReason>,
    pub command: Option<Command>,
}

impl Step {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Owns the [`FaultState`] and the healing latch.
#[derive(Debug, Clone)]
pub struct HealingCoordinator {
    state: FaultState,
    healing_latched: bool,
    reason: Option<FaultReason>,
    recovery_speed: f32,
    recovery: HysteresisCounter,
}

impl HealingCoordinator {
    /// `recovery_ticks` consecutive healthy ticks above `recovery_speed`
    /// (minimum 1) end a fault episode.
    pub fn new(recovery_speed: f32, recovery_ticks: u32) -> Self {
        Self {
            state: FaultState::Normal,
            healing_latched: false,
            reason: None,
            recovery_speed,
            recovery: HysteresisCounter::new(recovery_ticks.max(1) - 1),
        }
    }

    /// Advance the state machine by one telemetry tick.
    pub fn step(&mut self, sample: &TelemetrySample, verdicts: &Verdicts) -> Step {
        let from = self.state;
        let fault = verdicts.reason();
        let healed = sample.status == VehicleStatus::HealedVirtual;
        let healthy = fault.is_none() && !healed && sample.speed > self.recovery_speed;
        let mut command = None;

        let to = match from {
            FaultState::Normal | FaultState::Suspected => match fault {
                Some(reason) if !self.healing_latched => {
                    self.healing_latched = true;
                    self.reason = Some(reason);
                    command = Some(Command::heal());
                    warn!(%reason, speed = sample.speed, vibration = sample.vibration, "fault confirmed; requesting virtual sensor");
                    FaultState::Confirmed
                }
                Some(_) => from,
                None if verdicts.counters_idle() => FaultState::Normal,
                None => FaultState::Suspected,
            },
            FaultState::Confirmed if healed => FaultState::Recovering,
            FaultState::Confirmed => FaultState::Healing,
            FaultState::Healing | FaultState::Recovering if healthy => {
                if self.recovery.increment() {
                    command = Some(Command::clear_faults());
                    self.healing_latched = false;
                    self.reason = None;
                    self.recovery.reset();
                    info!(speed = sample.speed, "vehicle recovered; clearing faults");
                    FaultState::Normal
                } else {
                    from
                }
            }
            FaultState::Healing | FaultState::Recovering => {
                self.recovery.reset();
                if healed { FaultState::Recovering } else { from }
            }
        };

        if to == FaultState::Recovering && from != FaultState::Recovering {
            info!(speed = sample.speed, "virtual sensor active");
        }
        self.state = to;

        Step {
            from,
            to,
            reason: self.reason,
            command,
        }
    }

    /// Operator-driven return to NORMAL.  Clears the latch so the next fault
    /// episode can request healing again.  Returns the previous state.
    pub fn operator_reset(&mut self) -> FaultState {
        let previous = self.state;
        self.state = FaultState::Normal;
        self.healing_latched = false;
        self.reason = None;
        self.recovery.reset();
        previous
    }

    /// Roll back after `command` (returned by [`step`][Self::step]) could not
    /// be delivered.  Returns the new state when it changed.
    ///
    /// - Undelivered `HEAL`: the latch is released and the state drops to
    ///   SUSPECTED, so a persisting fault requests healing again next tick.
    /// - Undelivered `FAULT(0, 0)`: the virtual sensor is still active, so
    ///   the episode resumes in RECOVERING and must re-earn the clear.
    pub fn command_failed(&mut self, command: Command) -> Option<FaultState> {
        let previous = self.state;
        match command.kind {
            CommandKind::Heal if self.healing_latched => {
                self.healing_latched = false;
                self.reason = None;
                self.state = FaultState::Suspected;
            }
            CommandKind::Fault if command == Command::clear_faults() && !self.healing_latched => {
                self.healing_latched = true;
                self.state = FaultState::Recovering;
            }
            _ => return None,
        }
        self.recovery.reset();
        warn!(kind = ?command.kind, from = %previous, to = %self.state, "command undelivered; state rolled back");
        (previous != self.state).then_some(self.state)
    }

    pub fn state(&self) -> FaultState {
        self.state
    }

    pub fn reason(&self) -> Option<FaultReason> {
        self.reason
    }

    /// `true` while a HEAL has been sent and not yet cleared.
    pub fn healing_latched(&self) -> bool {
        self.healing_latched
    }

    pub fn recovery_speed(&self) -> f32 {
        self.recovery_speed
    }

    /// Consecutive healthy ticks seen in the current recovery.
    pub fn recovery_progress(&self) -> u32 {
        self.recovery.count()
    }
}
