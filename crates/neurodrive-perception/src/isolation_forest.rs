//! [`IsolationForest`] – the default [`NoveltyModel`].
//!
//! An ensemble of random isolation trees.  Each tree recursively splits a
//! random subsample on a random feature at a random value until every point
//! is isolated or the height limit is reached.  Outliers sit in sparse
//! regions and are isolated after few splits, so a short average path
//! length means "anomalous".
//!
//! # Scoring
//!
//! ```text
//! s(x) = 2 ^ ( -E[h(x)] / c(ψ) )
//! ```
//!
//! where `h(x)` is the path length of `x` in one tree, `ψ` the subsample
//! size and `c(n)` the average path length of an unsuccessful binary search
//! tree lookup over `n` points.  Scores near 1 are outliers; scores well
//! below 0.5 are normal.
//!
//! The decision threshold is the `(1 - contamination)` quantile of the
//! training-set scores: at most a `contamination` fraction of the training
//! data is itself classified as an outlier.

use neurodrive_types::NeuroError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Features, NoveltyModel};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Isolation forest hyper-parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    /// Number of trees in the ensemble.
    pub num_trees: usize,
    /// Maximum subsample size drawn for each tree.
    pub sample_size: usize,
    /// Expected outlier fraction of the training data, clamped to `(0, 0.5]`.
    pub contamination: f64,
    /// RNG seed.  `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            num_trees: 100,
            sample_size: 256,
            contamination: 0.01,
            seed: Some(42),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Isolation tree
// ────────────────────────────────────────────────────────────────────────────

enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        value: f32,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn build(points: Vec<Features>, depth: usize, limit: usize, rng: &mut StdRng) -> Self {
        if depth >= limit || points.len() <= 1 {
            return Node::Leaf { size: points.len() };
        }

        // Only features that still vary can split this node.
        let mut candidates = [(0usize, 0.0f32, 0.0f32); 2];
        let mut n_candidates = 0;
        for feature in 0..2 {
            let (min, max) = points
                .iter()
                .map(|p| p[feature])
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                });
            if min < max {
                candidates[n_candidates] = (feature, min, max);
                n_candidates += 1;
            }
        }
        if n_candidates == 0 {
            return Node::Leaf { size: points.len() };
        }

        let (feature, min, max) = candidates[rng.gen_range(0..n_candidates)];
        let value = rng.gen_range(min..max);
        let (left, right): (Vec<Features>, Vec<Features>) =
            points.into_iter().partition(|p| p[feature] < value);

        Node::Split {
            feature,
            value,
            left: Box::new(Node::build(left, depth + 1, limit, rng)),
            right: Box::new(Node::build(right, depth + 1, limit, rng)),
        }
    }

    fn path_length(&self, x: &Features) -> f64 {
        let mut node = self;
        let mut depth = 0.0;
        loop {
            match node {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    value,
                    left,
                    right,
                } => {
                    node = if x[*feature] < *value { left } else { right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// `c(n)`: average path length of an unsuccessful BST search over `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Forest
// ────────────────────────────────────────────────────────────────────────────

struct Fitted {
    trees: Vec<Node>,
    normaliser: f64,
    threshold: f64,
}

/// Isolation forest novelty model.
///
/// # Example
///
/// ```
/// use neurodrive_perception::isolation_forest::{ForestConfig, IsolationForest};
/// use neurodrive_perception::model::NoveltyModel;
///
/// let data: Vec<[f32; 2]> = (0..200)
///     .map(|i| [0.5 + (i % 10) as f32 * 0.01, 0.5 + (i / 10) as f32 * 0.005])
///     .collect();
///
/// let mut forest = IsolationForest::new(ForestConfig::default());
/// forest.fit(&data).unwrap();
/// assert!(forest.score([5.0, -3.0]).unwrap() > forest.score([0.55, 0.55]).unwrap());
/// ```
pub struct IsolationForest {
    config: ForestConfig,
    fitted: Option<Fitted>,
}

impl IsolationForest {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    /// Anomaly score in `(0, 1]`; higher is more anomalous.
    ///
    /// # Errors
    ///
    /// Returns [`NeuroError::Model`] when unfitted or `x` is not finite.
    pub fn score(&self, x: Features) -> Result<f64, NeuroError> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or_else(|| NeuroError::Model("isolation forest is not fitted".to_string()))?;
        if !x.iter().all(|v| v.is_finite()) {
            return Err(NeuroError::Model(format!("non-finite sample {x:?}")));
        }
        Ok(score_with(&fitted.trees, fitted.normaliser, &x))
    }

    /// Decision threshold learned during fit, if fitted.
    pub fn threshold(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.threshold)
    }
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self::new(ForestConfig::default())
    }
}

fn score_with(trees: &[Node], normaliser: f64, x: &Features) -> f64 {
    let mean = trees.iter().map(|t| t.path_length(x)).sum::<f64>() / trees.len() as f64;
    2f64.powf(-mean / normaliser)
}

impl NoveltyModel for IsolationForest {
    fn fit(&mut self, data: &[Features]) -> Result<(), NeuroError> {
        self.fitted = None;

        if data.len() < 2 {
            return Err(NeuroError::Model(format!(
                "need at least 2 training points, got {}",
                data.len()
            )));
        }
        if !data.iter().flatten().all(|v| v.is_finite()) {
            return Err(NeuroError::Model(
                "training data contains non-finite values".to_string(),
            ));
        }
        if self.config.num_trees == 0 {
            return Err(NeuroError::Model("num_trees must be positive".to_string()));
        }

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let psi = self.config.sample_size.clamp(2, data.len());
        let limit = (psi as f64).log2().ceil() as usize;

        let trees: Vec<Node> = (0..self.config.num_trees)
            .map(|_| {
                let sample = rand::seq::index::sample(&mut rng, data.len(), psi)
                    .into_iter()
                    .map(|i| data[i])
                    .collect();
                Node::build(sample, 0, limit, &mut rng)
            })
            .collect();
        let normaliser = average_path_length(psi);

        let mut scores: Vec<f64> = data
            .iter()
            .map(|x| score_with(&trees, normaliser, x))
            .collect();
        scores.sort_by(f64::total_cmp);
        let contamination = self.config.contamination.clamp(f64::EPSILON, 0.5);
        let rank = ((1.0 - contamination) * scores.len() as f64).ceil() as usize;
        let threshold = scores[rank.clamp(1, scores.len()) - 1];

        debug!(
            trees = trees.len(),
            subsample = psi,
            threshold,
            "isolation forest fitted"
        );
        self.fitted = Some(Fitted {
            trees,
            normaliser,
            threshold,
        });
        Ok(())
    }

    fn is_outlier(&self, sample: Features) -> Result<bool, NeuroError> {
        let score = self.score(sample)?;
        let threshold = self
            .threshold()
            .ok_or_else(|| NeuroError::Model("isolation forest is not fitted".to_string()))?;
        Ok(score > threshold)
    }

    fn name(&self) -> &str {
        "isolation_forest"
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }
}
