//! `neurodrive-runtime` – The Decision Engine
//!
//! Turns the raw telemetry stream into fault decisions and healing commands.
//!
//! # Modules
//!
//! - [`config`] – [`EngineConfig`]: ports, timings, detection thresholds and
//!   isolation-forest settings, with validation.
//! - [`calibration`] – [`CalibrationCollector`]: the warm-up window that
//!   gathers normal-driving samples for the anomaly model.
//! - [`coordinator`] – [`HealingCoordinator`]: the
//!   NORMAL → SUSPECTED → CONFIRMED → HEALING → RECOVERING lifecycle and the
//!   single-HEAL latch.
//! - [`decision`] – [`DecisionCore`]: one synchronous tick of both detectors
//!   plus the coordinator.  No I/O.
//! - [`status`] – [`StatusBoard`]: the derived view (alert text, history,
//!   GPS trace) operators read.
//! - [`engine`] – [`Engine`] / [`EngineHandle`]: the Tokio tasks that poll
//!   telemetry, own the decision state, resend the drive setpoint and
//!   receive video.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with an optional OTLP span exporter.

pub mod calibration;
pub mod config;
pub mod coordinator;
pub mod decision;
pub mod engine;
pub mod status;
pub mod telemetry;

pub use calibration::CalibrationCollector;
pub use config::{DetectionThresholds, EngineConfig};
pub use coordinator::{HealingCoordinator, Step, Verdicts};
pub use decision::{DecisionCore, TickReport};
pub use engine::{DriveSetpoint, Engine, EngineError, EngineHandle, OperatorAction};
pub use status::StatusBoard;
pub use telemetry::{TracerProviderGuard, init_tracing};
