//! `neurodrive-perception` – Learned Anomaly Detection
//!
//! The statistical half of NeuroDrive.  A one-class model learns what normal
//! driving looks like during warm-up and flags telemetry that falls outside
//! it.
//!
//! # Modules
//!
//! - [`model`] – [`NoveltyModel`][model::NoveltyModel]: the fit/predict
//!   contract any one-class algorithm must satisfy.
//! - [`isolation_forest`] – [`IsolationForest`][isolation_forest::IsolationForest]:
//!   the default model, a seeded isolation forest whose threshold is derived
//!   from the contamination fraction.
//! - [`anomaly`] – [`AnomalyDetector`][anomaly::AnomalyDetector]:
//!   normalises features by calibration maxima, applies the low-speed
//!   exemption and debounces model verdicts with a hysteresis counter.

pub mod anomaly;
pub mod isolation_forest;
pub mod model;

pub use anomaly::AnomalyDetector;
pub use isolation_forest::{ForestConfig, IsolationForest};
pub use model::{Features, NoveltyModel};
