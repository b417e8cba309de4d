//! [`NoveltyModel`] – contract for one-class outlier models.
//!
//! The anomaly detector only needs two things from a model: learn what
//! "normal" looks like from a set of feature vectors, then say whether a new
//! vector is an outlier.  Any algorithm that satisfies this trait can be
//! plugged into [`AnomalyDetector`][crate::anomaly::AnomalyDetector].

use neurodrive_types::NeuroError;

/// Normalised `(speed, vibration)` feature vector.
pub type Features = [f32; 2];

/// A one-class novelty model.
pub trait NoveltyModel: Send + Sync {
    /// Fit the model on normal data.
    ///
    /// # Errors
    ///
    /// Returns [`NeuroError::Model`] when the data cannot be fitted.  The
    /// model must be left unusable (every later `is_outlier` call errors).
    fn fit(&mut self, data: &[Features]) -> Result<(), NeuroError>;

    /// `true` when `sample` lies outside the learned normal region.
    ///
    /// # Errors
    ///
    /// Returns [`NeuroError::Model`] when the model is unfitted or the
    /// sample cannot be scored.
    fn is_outlier(&self, sample: Features) -> Result<bool, NeuroError>;

    /// Model name used in log records.
    fn name(&self) -> &str;

    fn is_fitted(&self) -> bool;
}
