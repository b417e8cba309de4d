use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Wire value of `status` reported by the vehicle once the virtual sensor has
/// taken over from the failed wheel-speed sensor.
pub const HEALED_STATUS_WIRE: &str = "HEALED (VIRTUAL_SENSOR)";

/// Vehicle-reported sensor status carried in every telemetry packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleStatus {
    /// Physical sensors are healthy.
    Ok,
    /// The vehicle is substituting a virtual (model-estimated) speed reading.
    HealedVirtual,
    /// Missing or unrecognised status string.
    #[default]
    Unknown,
}

impl VehicleStatus {
    /// Map the vehicle's raw status string onto a [`VehicleStatus`].
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "OK" => VehicleStatus::Ok,
            HEALED_STATUS_WIRE => VehicleStatus::HealedVirtual,
            _ => VehicleStatus::Unknown,
        }
    }
}

/// One reading of vehicle speed, vibration, position and status.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct TelemetrySample {
    /// Front-left wheel speed (km/h).
    pub speed: f32,
    /// Chassis vibration level (G).
    pub vibration: f32,
    pub status: VehicleStatus,
    pub position_x: f32,
    pub position_z: f32,
    /// Vehicle-side timestamp in seconds; `0.0` when not reported.
    pub timestamp: f64,
}

/// Raw telemetry packet as sent by the vehicle.
///
/// Both the current (`speed` / `vibration`) and legacy (`wheel_speed_fl` /
/// `vibration_level`) field names are accepted.  An absent detector field
/// defaults to zero; an explicit `null` rejects the whole packet.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WirePacket {
    #[serde(deserialize_with = "reject_null")]
    speed: Option<f32>,
    #[serde(deserialize_with = "reject_null")]
    wheel_speed_fl: Option<f32>,
    #[serde(deserialize_with = "reject_null")]
    vibration: Option<f32>,
    #[serde(deserialize_with = "reject_null")]
    vibration_level: Option<f32>,
    status: Option<String>,
    position_x: Option<f32>,
    position_z: Option<f32>,
    timestamp: Option<f64>,
}

/// Only called for fields that are present, so `None` here means `null`.
fn reject_null<'de, D>(deserializer: D) -> Result<Option<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<f32>::deserialize(deserializer)? {
        Some(v) => Ok(Some(v)),
        None => Err(serde::de::Error::custom("detector field is null")),
    }
}

impl TelemetrySample {
    /// Build a sample carrying only speed and vibration.
    pub fn new(speed: f32, vibration: f32) -> Self {
        Self {
            speed,
            vibration,
            ..Self::default()
        }
    }

    /// Builder-style status override.
    pub fn with_status(mut self, status: VehicleStatus) -> Self {
        self.status = status;
        self
    }

    /// Builder-style position override.
    pub fn with_position(mut self, x: f32, z: f32) -> Self {
        self.position_x = x;
        self.position_z = z;
        self
    }

    /// Parse one JSON telemetry datagram.
    ///
    /// The first present field-name alias wins; absent fields default to `0`
    /// and the status defaults to [`VehicleStatus::Unknown`].
    ///
    /// # Errors
    ///
    /// Returns [`NeuroError::Parse`] when the payload is not a JSON object, a
    /// field has the wrong type, or a speed/vibration field is `null`.
    pub fn from_json(raw: &[u8]) -> Result<Self, NeuroError> {
        let packet: WirePacket =
            serde_json::from_slice(raw).map_err(|e| NeuroError::Parse(e.to_string()))?;
        Ok(Self {
            speed: packet.speed.or(packet.wheel_speed_fl).unwrap_or(0.0),
            vibration: packet.vibration.or(packet.vibration_level).unwrap_or(0.0),
            status: packet
                .status
                .as_deref()
                .map(VehicleStatus::from_wire)
                .unwrap_or_default(),
            position_x: packet.position_x.unwrap_or(0.0),
            position_z: packet.position_z.unwrap_or(0.0),
            timestamp: packet.timestamp.unwrap_or(0.0),
        })
    }
}

/// Kind of control command sent to the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandKind {
    /// `value1` = throttle, `value2` = steer.
    Drive,
    /// `value1 = 1.0` activates virtual-sensor fusion.
    Heal,
    /// `value1 = 1.0` injects a fault, `0.0` clears all faults.
    Fault,
}

/// Control command sent to the vehicle over the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "type")]
    pub kind: CommandKind,
    pub value1: f32,
    pub value2: f32,
}

impl Command {
    /// Manual drive command; both axes are clamped to `[-1, 1]`.
    pub fn drive(throttle: f32, steer: f32) -> Self {
        Self {
            kind: CommandKind::Drive,
            value1: throttle.clamp(-1.0, 1.0),
            value2: steer.clamp(-1.0, 1.0),
        }
    }

    /// `HEAL(1.0, 0.0)` – activate the virtual sensor.
    pub fn heal() -> Self {
        Self {
            kind: CommandKind::Heal,
            value1: 1.0,
            value2: 0.0,
        }
    }

    /// `FAULT(1.0, 0.0)` – inject a wheel-speed signal loss.
    pub fn inject_fault() -> Self {
        Self {
            kind: CommandKind::Fault,
            value1: 1.0,
            value2: 0.0,
        }
    }

    /// `FAULT(0.0, 0.0)` – clear every fault and deactivate the virtual sensor.
    pub fn clear_faults() -> Self {
        Self {
            kind: CommandKind::Fault,
            value1: 0.0,
            value2: 0.0,
        }
    }

    /// Serialise to the JSON wire format.
    pub fn to_json(&self) -> Result<String, NeuroError> {
        serde_json::to_string(self).map_err(|e| NeuroError::Serialization(e.to_string()))
    }
}

/// Ordered `(speed, vibration)` pairs used to fit the anomaly model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSet {
    points: Vec<(f32, f32)>,
    real_samples: usize,
}

impl CalibrationSet {
    /// Synthetic "safely stopped" samples that teach the model that standing
    /// still is normal.
    pub const SAFE_POINTS: [(f32, f32); 4] = [(0.0, 0.001), (1.0, 0.002), (5.0, 0.005), (0.0, 0.0)];

    /// Added when the vehicle barely moved during warm-up.
    pub const FALLBACK_POINTS: [(f32, f32); 2] = [(10.0, 0.02), (50.0, 0.05)];

    /// Minimum number of real driving samples before the fallback is skipped.
    pub const MIN_REAL_SAMPLES: usize = 5;

    pub fn new() -> Self {
        Self::default()
    }

    /// Record a real driving sample gathered during warm-up.
    pub fn push(&mut self, speed: f32, vibration: f32) {
        self.points.push((speed, vibration));
        self.real_samples += 1;
    }

    /// Append the synthetic safe points and, if too few real samples were
    /// gathered, the fallback pairs.
    pub fn finalize(mut self) -> Self {
        self.points.extend_from_slice(&Self::SAFE_POINTS);
        if self.real_samples < Self::MIN_REAL_SAMPLES {
            self.points.extend_from_slice(&Self::FALLBACK_POINTS);
        }
        self
    }

    pub fn points(&self) -> &[(f32, f32)] {
        &self.points
    }

    /// Number of samples recorded through [`push`][Self::push].
    pub fn real_samples(&self) -> usize {
        self.real_samples
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl FromIterator<(f32, f32)> for CalibrationSet {
    fn from_iter<I: IntoIterator<Item = (f32, f32)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (speed, vibration) in iter {
            set.push(speed, vibration);
        }
        set
    }
}

/// Lifecycle of a fault episode as tracked by the healing coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultState {
    #[default]
    Normal,
    /// A detector counter is rising but has not confirmed.
    Suspected,
    /// A fault was confirmed and HEAL was sent on this tick.
    Confirmed,
    /// HEAL is in flight; waiting for the vehicle to report the virtual sensor.
    Healing,
    /// The vehicle runs on the virtual sensor; waiting for sustained speed.
    Recovering,
}

impl std::fmt::Display for FaultState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FaultState::Normal => "NORMAL",
            FaultState::Suspected => "SUSPECTED",
            FaultState::Confirmed => "CONFIRMED",
            FaultState::Healing => "HEALING",
            FaultState::Recovering => "RECOVERING",
        };
        f.write_str(s)
    }
}

/// Why a fault was confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultReason {
    /// Confirmed by the symbolic safety rules.
    SignalLoss,
    /// Confirmed by the calibrated novelty model.
    NeuralAnomaly,
}

impl std::fmt::Display for FaultReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultReason::SignalLoss => {
                f.write_str("CRITICAL: Wheel Speed Sensor Failure (Signal Loss)")
            }
            FaultReason::NeuralAnomaly => {
                f.write_str("CRITICAL: Neural Anomaly Detected (Drift/Noise)")
            }
        }
    }
}

/// Unified event wrapper for the internal event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "neurodrive-runtime::engine"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp a payload with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the internal event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Telemetry(TelemetrySample),
    CommandIssued(Command),
    FaultStateChanged {
        from: FaultState,
        to: FaultState,
        reason: Option<FaultReason>,
    },
    /// No telemetry arrived within the link timeout.
    LinkLost,
    /// Telemetry resumed after a [`EventPayload::LinkLost`].
    LinkRestored,
}

/// Error taxonomy shared by every NeuroDrive crate.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NeuroError {
    #[error("no telemetry available")]
    NoData,

    #[error("malformed telemetry packet: {0}")]
    Parse(String),

    #[error("anomaly model error: {0}")]
    Model(String),

    #[error("command send failed: {0}")]
    Send(String),

    #[error("socket I/O error: {0}")]
    Io(String),

    #[error("video stream error: {0}")]
    Video(String),

    #[error("event bus error: {0}")]
    Channel(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("configuration error: {0}")]
    Config(String),
}
