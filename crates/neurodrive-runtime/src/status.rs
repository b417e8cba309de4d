//! [`StatusBoard`] – the derived view operators and dashboards read.
//!
//! The decision task is the only writer.  Readers get snapshots through a
//! `tokio::sync::watch` channel.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use neurodrive_types::{FaultReason, FaultState, TelemetrySample};
use serde::{Deserialize, Serialize};

/// Telemetry history length.
pub const HISTORY_LEN: usize = 100;

/// GPS trace length.
pub const PATH_LEN: usize = 50;

/// Position magnitude that counts as a real GPS fix.
const GPS_FIX_EPSILON: f32 = 0.1;

pub const ALERT_NORMAL: &str = "System Normal";
pub const ALERT_RECOVERED: &str = "RECOVERED (VIRTUAL)";
pub const ALERT_OFFLINE: &str = "OFFLINE";

/// One point of the speed/vibration chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub time: DateTime<Utc>,
    pub speed: f32,
    /// Vibration scaled by 1000 so it shares an axis with speed.
    pub vibration_milli: f32,
}

/// Snapshot of everything the engine knows about the vehicle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusBoard {
    pub alert: String,
    pub state: FaultState,
    pub reason: Option<FaultReason>,
    pub latest: Option<TelemetrySample>,
    pub link_up: bool,
    pub rule_counter: u32,
    pub anomaly_counter: u32,
    pub model_trained: bool,
    pub history: VecDeque<HistoryPoint>,
    pub path: VecDeque<(f32, f32)>,
    gps_initialised: bool,
    /// HEAL/FAULT commands the decision task delivered.
    pub commands_sent: u64,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self {
            alert: ALERT_OFFLINE.to_string(),
            state: FaultState::Normal,
            reason: None,
            latest: None,
            link_up: false,
            rule_counter: 0,
            anomaly_counter: 0,
            model_trained: false,
            history: VecDeque::with_capacity(HISTORY_LEN),
            path: VecDeque::with_capacity(PATH_LEN),
            gps_initialised: false,
            commands_sent: 0,
        }
    }
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fresh sample into the chart history and the GPS trace.
    ///
    /// The trace stays empty until the first sample that is off the origin,
    /// so a `(0, 0)` placeholder never becomes the start of the path.
    pub fn record_sample(&mut self, sample: &TelemetrySample, at: DateTime<Utc>) {
        self.latest = Some(*sample);
        self.link_up = true;

        push_bounded(
            &mut self.history,
            HistoryPoint {
                time: at,
                speed: sample.speed,
                vibration_milli: sample.vibration * 1000.0,
            },
            HISTORY_LEN,
        );

        let (x, z) = (sample.position_x, sample.position_z);
        if !self.gps_initialised {
            if x.abs() > GPS_FIX_EPSILON || z.abs() > GPS_FIX_EPSILON {
                self.gps_initialised = true;
                self.path.clear();
                self.path.push_back((x, z));
            }
        } else {
            push_bounded(&mut self.path, (x, z), PATH_LEN);
        }
    }

    /// Update the fault view and derive the alert text.
    pub fn set_fault(&mut self, state: FaultState, reason: Option<FaultReason>) {
        self.state = state;
        self.reason = reason;
        self.alert = alert_for(state, reason, self.link_up);
    }

    pub fn set_counters(&mut self, rule_counter: u32, anomaly_counter: u32) {
        self.rule_counter = rule_counter;
        self.anomaly_counter = anomaly_counter;
    }

    /// The telemetry link went silent.
    pub fn mark_offline(&mut self) {
        self.link_up = false;
        self.alert = ALERT_OFFLINE.to_string();
    }

    pub fn gps_initialised(&self) -> bool {
        self.gps_initialised
    }

    pub fn is_critical(&self) -> bool {
        self.alert.starts_with("CRITICAL")
    }
}

fn alert_for(state: FaultState, reason: Option<FaultReason>, link_up: bool) -> String {
    if !link_up {
        return ALERT_OFFLINE.to_string();
    }
    match (state, reason) {
        (FaultState::Confirmed | FaultState::Healing, Some(reason)) => reason.to_string(),
        (FaultState::Recovering, _) => ALERT_RECOVERED.to_string(),
        _ => ALERT_NORMAL.to_string(),
    }
}

fn push_bounded<T>(buf: &mut VecDeque<T>, item: T, cap: usize) {
    if buf.len() == cap {
        buf.pop_front();
    }
    buf.push_back(item);
}
