//! [`AnomalyDetector`] – calibrated novelty detection with hysteresis.
//!
//! The detector is trained once on the [`CalibrationSet`] gathered during
//! warm-up.  Features are normalised into `[0, 1]` by the calibration maxima
//! before they reach the [`NoveltyModel`].  At runtime every sample is
//! scored and fed into a [`HysteresisCounter`]; the detector reports an
//! anomaly only once outlier verdicts outnumber inliers by more than ten.
//!
//! Failure policy:
//!
//! | Situation | Result |
//! |---|---|
//! | Training failed or never ran | never anomalous |
//! | Model query fails | not anomalous this tick, counter untouched |
//! | Slow and quiet sample | not anomalous, counter reset |

use neurodrive_kernel::HysteresisCounter;
use neurodrive_types::{CalibrationSet, NeuroError};
use tracing::{debug, info, warn};

use crate::isolation_forest::{ForestConfig, IsolationForest};
use crate::model::{Features, NoveltyModel};

/// Outlier verdicts tolerated before an anomaly is reported.
pub const DEFAULT_ANOMALY_THRESHOLD: u32 = 10;

/// Below this speed a quiet vehicle is always considered safe.
pub const EXEMPT_SPEED: f32 = 5.0;

/// Below this vibration a slow vehicle is always considered safe.
pub const EXEMPT_VIBRATION: f32 = 0.1;

/// Novelty detector over normalised `(speed, vibration)` features.
pub struct AnomalyDetector {
    model: Box<dyn NoveltyModel>,
    trained: bool,
    max_speed: f32,
    max_vib: f32,
    counter: HysteresisCounter,
}

impl AnomalyDetector {
    /// Wrap `model`; report after more than `hysteresis` outlier ticks.
    pub fn new(model: Box<dyn NoveltyModel>, hysteresis: u32) -> Self {
        Self {
            model,
            trained: false,
            max_speed: 1.0,
            max_vib: 1.0,
            counter: HysteresisCounter::new(hysteresis),
        }
    }

    /// Detector backed by an [`IsolationForest`].
    pub fn isolation_forest(config: ForestConfig, hysteresis: u32) -> Self {
        Self::new(Box::new(IsolationForest::new(config)), hysteresis)
    }

    /// Fit the model on `set`.
    ///
    /// # Errors
    ///
    /// Returns [`NeuroError::Model`] when the fit fails.  The detector then
    /// stays inert: [`detect_anomaly`][Self::detect_anomaly] always returns
    /// `false`.
    pub fn train(&mut self, set: &CalibrationSet) -> Result<(), NeuroError> {
        self.trained = false;
        self.counter.reset();

        let max_of = |pick: fn(&(f32, f32)) -> f32| {
            let max = set.points().iter().map(pick).fold(0.0f32, f32::max);
            if max > 0.0 { max } else { 1.0 }
        };
        self.max_speed = max_of(|p| p.0);
        self.max_vib = max_of(|p| p.1);

        let features: Vec<Features> = set
            .points()
            .iter()
            .map(|&(speed, vib)| [speed / self.max_speed, vib / self.max_vib])
            .collect();

        if let Err(e) = self.model.fit(&features) {
            warn!(model = self.model.name(), error = %e, "anomaly model training failed; detector inert");
            return Err(e);
        }

        self.trained = true;
        info!(
            model = self.model.name(),
            points = features.len(),
            real_samples = set.real_samples(),
            max_speed = self.max_speed,
            max_vib = self.max_vib,
            "anomaly model trained"
        );
        Ok(())
    }

    /// Score one live sample.  Returns `true` only on a sustained anomaly.
    pub fn detect_anomaly(&mut self, speed: f32, vibration: f32) -> bool {
        if !self.trained {
            return false;
        }

        if speed < EXEMPT_SPEED && vibration < EXEMPT_VIBRATION {
            self.counter.reset();
            return false;
        }

        let features = [speed / self.max_speed, vibration / self.max_vib];
        match self.model.is_outlier(features) {
            Ok(true) => {
                self.counter.increment();
            }
            Ok(false) => self.counter.decrement(),
            Err(e) => {
                warn!(model = self.model.name(), error = %e, "anomaly model query failed");
                return false;
            }
        }

        let confirmed = self.counter.is_confirmed();
        if confirmed {
            debug!(speed, vibration, counter = self.counter.count(), "sustained anomaly");
        }
        confirmed
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Current number of pending outlier verdicts.
    pub fn anomaly_counter(&self) -> u32 {
        self.counter.count()
    }

    /// Normalisation maxima `(max_speed, max_vib)`.
    pub fn scale(&self) -> (f32, f32) {
        (self.max_speed, self.max_vib)
    }

    /// Forget pending outlier verdicts.
    pub fn reset_counter(&mut self) {
        self.counter.reset();
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::isolation_forest(ForestConfig::default(), DEFAULT_ANOMALY_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Model that replays a fixed script of verdicts.
    struct Scripted {
        verdicts: Mutex<VecDeque<Result<bool, NeuroError>>>,
        fail_fit: bool,
        seen: Arc<Mutex<Vec<Features>>>,
    }

    impl Scripted {
        fn new(verdicts: impl IntoIterator<Item = Result<bool, NeuroError>>) -> Self {
            Self {
                verdicts: Mutex::new(verdicts.into_iter().collect()),
                fail_fit: false,
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn always(outlier: bool) -> Self {
            Self::new(std::iter::repeat_n(Ok(outlier), 64))
        }
    }

    impl NoveltyModel for Scripted {
        fn fit(&mut self, data: &[Features]) -> Result<(), NeuroError> {
            if self.fail_fit {
                return Err(NeuroError::Model("scripted failure".to_string()));
            }
            self.seen.lock().unwrap().extend_from_slice(data);
            Ok(())
        }

        fn is_outlier(&self, _sample: Features) -> Result<bool, NeuroError> {
            self.verdicts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(false))
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn is_fitted(&self) -> bool {
            true
        }
    }

    fn calibration() -> CalibrationSet {
        (0..20)
            .map(|i| (20.0 + i as f32 * 0.5, 0.02))
            .collect::<CalibrationSet>()
            .finalize()
    }

    fn trained(model: Scripted) -> AnomalyDetector {
        let mut detector = AnomalyDetector::new(Box::new(model), DEFAULT_ANOMALY_THRESHOLD);
        detector.train(&calibration()).unwrap();
        detector
    }

    // ------------------------------------------------------------------ training

    #[test]
    fn untrained_detector_is_never_anomalous() {
        let mut detector = AnomalyDetector::new(Box::new(Scripted::always(true)), 0);
        for _ in 0..20 {
            assert!(!detector.detect_anomaly(40.0, 2.0));
        }
        assert_eq!(detector.anomaly_counter(), 0);
    }

    #[test]
    fn failed_fit_leaves_detector_inert() {
        let mut model = Scripted::always(true);
        model.fail_fit = true;
        let mut detector = AnomalyDetector::new(Box::new(model), 0);
        assert!(matches!(detector.train(&calibration()), Err(NeuroError::Model(_))));
        assert!(!detector.is_trained());
        assert!(!detector.detect_anomaly(40.0, 2.0));
    }

    #[test]
    fn scale_factors_come_from_calibration_maxima() {
        let detector = trained(Scripted::always(false));
        let (max_speed, max_vib) = detector.scale();
        assert!((max_speed - 29.5).abs() < 1e-4);
        assert!((max_vib - 0.02).abs() < 1e-6);
    }

    #[test]
    fn zero_maxima_fall_back_to_one() {
        let set: CalibrationSet = [(0.0, 0.0), (0.0, 0.0)].into_iter().collect();
        let mut detector = AnomalyDetector::new(Box::new(Scripted::always(false)), 10);
        detector.train(&set).unwrap();
        assert_eq!(detector.scale(), (1.0, 1.0));
    }

    // ------------------------------------------------------------------ hysteresis

    #[test]
    fn requires_eleven_consecutive_outliers() {
        let mut detector = trained(Scripted::always(true));
        for tick in 1..=10 {
            assert!(!detector.detect_anomaly(30.0, 0.5), "fired early at tick {tick}");
        }
        assert!(detector.detect_anomaly(30.0, 0.5));
    }

    #[test]
    fn single_outlier_never_fires() {
        let mut detector = trained(Scripted::new([Ok(true), Ok(false), Ok(false)]));
        assert!(!detector.detect_anomaly(30.0, 0.5));
        assert_eq!(detector.anomaly_counter(), 1);
        assert!(!detector.detect_anomaly(30.0, 0.02));
        assert_eq!(detector.anomaly_counter(), 0);
        assert!(!detector.detect_anomaly(30.0, 0.02));
        assert_eq!(detector.anomaly_counter(), 0);
    }

    #[test]
    fn inlier_decrements_instead_of_resetting() {
        let script = std::iter::repeat_n(Ok(true), 10)
            .chain([Ok(false)])
            .chain(std::iter::repeat_n(Ok(true), 2));
        let mut detector = trained(Scripted::new(script));
        for _ in 0..10 {
            detector.detect_anomaly(30.0, 0.5);
        }
        assert!(!detector.detect_anomaly(30.0, 0.02)); // 9
        assert!(!detector.detect_anomaly(30.0, 0.5)); // 10
        assert!(detector.detect_anomaly(30.0, 0.5)); // 11
    }

    // ------------------------------------------------------------------ exemption

    #[test]
    fn low_speed_exemption_resets_counter() {
        let mut detector = trained(Scripted::always(true));
        for _ in 0..8 {
            detector.detect_anomaly(30.0, 0.5);
        }
        assert_eq!(detector.anomaly_counter(), 8);
        assert!(!detector.detect_anomaly(0.0, 0.001));
        assert_eq!(detector.anomaly_counter(), 0);
    }

    #[test]
    fn idle_vehicle_is_never_anomalous_with_real_model() {
        let mut detector = AnomalyDetector::default();
        detector.train(&calibration()).unwrap();
        for _ in 0..50 {
            assert!(!detector.detect_anomaly(0.0, 0.001));
        }
    }

    #[test]
    fn exemption_bypasses_the_model() {
        let mut detector = trained(Scripted::new(std::iter::repeat_n(Ok(true), 11)));
        detector.detect_anomaly(4.9, 0.099);
        // The script was not consumed.
        for _ in 0..10 {
            detector.detect_anomaly(30.0, 0.5);
        }
        assert!(detector.detect_anomaly(30.0, 0.5));
    }

    // ------------------------------------------------------------------ failures

    #[test]
    fn model_error_fails_open_without_touching_counter() {
        let script = [Ok(true), Ok(true), Err(NeuroError::Model("boom".to_string()))];
        let mut detector = trained(Scripted::new(script));
        detector.detect_anomaly(30.0, 0.5);
        detector.detect_anomaly(30.0, 0.5);
        assert!(!detector.detect_anomaly(30.0, 0.5));
        assert_eq!(detector.anomaly_counter(), 2);
    }

    #[test]
    fn features_are_normalised_before_fit() {
        let model = Scripted::always(false);
        let seen = Arc::clone(&model.seen);
        let mut detector = AnomalyDetector::new(Box::new(model), 10);
        detector.train(&calibration()).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), calibration().len());
        assert!(seen.iter().flatten().all(|x| (0.0..=1.0).contains(x)));
        assert!(seen.iter().any(|f| f == &[1.0, 1.0]));
    }
}
