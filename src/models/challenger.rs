//! Challenger: gradient-boosted trees on the logistic loss.
//!
//! Each round fits one [`RegressionTree`] to the first and second derivatives
//! of the (positive-class weighted) log loss at the current raw scores. There
//! is no row or column subsampling, so a fit is a pure function of the data
//! and the parameters.

use serde::{Deserialize, Serialize};
use tracing::Span;

use crate::error::AppError;
use crate::features::FeatureMatrix;
use crate::math::{logit, sigmoid};
use crate::models::Classifier;
use crate::models::tree::{FeatureBins, RegressionTree, TreeBuilder, TreeParams};

/// Hessian floor; keeps saturated rows from producing zero-curvature nodes.
const MIN_HESS: f64 = 1e-16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengerParams {
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Loss multiplier of positive rows; `None` uses negatives / positives of
    /// the training labels.
    #[serde(default)]
    pub scale_pos_weight: Option<f64>,
    #[serde(default = "default_lambda")]
    pub lambda: f64,
    #[serde(default = "default_min_child_weight")]
    pub min_child_weight: f64,
    #[serde(default = "default_max_bins")]
    pub max_bins: usize,
}

impl Default for ChallengerParams {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            max_depth: default_max_depth(),
            learning_rate: default_learning_rate(),
            scale_pos_weight: None,
            lambda: default_lambda(),
            min_child_weight: default_min_child_weight(),
            max_bins: default_max_bins(),
        }
    }
}

impl ChallengerParams {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.n_estimators == 0 {
            return Err(AppError::config("`challenger.n_estimators` must be > 0."));
        }
        if !(1..=16).contains(&self.max_depth) {
            return Err(AppError::config(format!(
                "`challenger.max_depth` must be in 1..=16, got {}.",
                self.max_depth
            )));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(AppError::config(format!(
                "`challenger.learning_rate` must be in (0, 1], got {}.",
                self.learning_rate
            )));
        }
        if let Some(w) = self.scale_pos_weight {
            if !(w.is_finite() && w > 0.0) {
                return Err(AppError::config(format!(
                    "`challenger.scale_pos_weight` must be > 0, got {w}."
                )));
            }
        }
        if !(self.lambda.is_finite() && self.lambda >= 0.0) {
            return Err(AppError::config("`challenger.lambda` must be >= 0."));
        }
        if !(self.min_child_weight.is_finite() && self.min_child_weight >= 0.0) {
            return Err(AppError::config("`challenger.min_child_weight` must be >= 0."));
        }
        if !(2..=u16::MAX as usize).contains(&self.max_bins) {
            return Err(AppError::config(format!(
                "`challenger.max_bins` must be in 2..={}, got {}.",
                u16::MAX,
                self.max_bins
            )));
        }
        Ok(())
    }
}

fn default_n_estimators() -> usize {
    100
}

fn default_max_depth() -> usize {
    5
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_lambda() -> f64 {
    1.0
}

fn default_min_child_weight() -> f64 {
    1.0
}

fn default_max_bins() -> usize {
    256
}

/// Fitted ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedTrees {
    /// Raw score every prediction starts from (log-odds).
    pub base_score: f64,
    pub scale_pos_weight: f64,
    pub n_features: usize,
    pub trees: Vec<RegressionTree>,
}

impl BoostedTrees {
    /// Every tree must only reference features below `n_features`.
    pub fn check(&self) -> Result<(), AppError> {
        if !self.base_score.is_finite() {
            return Err(AppError::config("boosted trees have a non-finite base score"));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.check(self.n_features)
                .map_err(|e| AppError::config(format!("tree {i}: {}", e.message())))?;
        }
        Ok(())
    }

    pub fn raw_score(&self, row: &[f64]) -> f64 {
        self.trees.iter().fold(self.base_score, |acc, t| acc + t.predict(row))
    }
}

/// Negatives / positives of `y`.
pub fn imbalance_ratio(y: &[u8]) -> Result<f64, AppError> {
    let pos = y.iter().filter(|&&v| v == 1).count();
    let neg = y.len() - pos;
    if pos == 0 || neg == 0 {
        return Err(AppError::config(format!(
            "Training labels need both classes (positives={pos}, negatives={neg})."
        )));
    }
    Ok(neg as f64 / pos as f64)
}

impl Classifier for BoostedTrees {
    type Params = ChallengerParams;

    fn fit(params: &ChallengerParams, x: &FeatureMatrix, y: &[u8], span: &Span) -> Result<Self, AppError> {
        let _entered = span.enter();
        params.validate()?;
        if x.len() != y.len() {
            return Err(AppError::prediction(format!(
                "feature rows ({}) and labels ({}) differ in length",
                x.len(),
                y.len()
            )));
        }
        let ratio = imbalance_ratio(y)?;
        let spw = params.scale_pos_weight.unwrap_or(ratio);
        let weight: Vec<f64> = y.iter().map(|&v| if v == 1 { spw } else { 1.0 }).collect();

        let total_w: f64 = weight.iter().sum();
        let pos_w: f64 = weight.iter().zip(y).filter(|(_, v)| **v == 1).map(|(w, _)| w).sum();
        let base_score = logit(pos_w / total_w);

        tracing::info!(
            "Fitting boosted trees: {} rows, {} features, {} rounds, depth {}, lr {}, scale_pos_weight {:.4}",
            x.len(),
            x.width(),
            params.n_estimators,
            params.max_depth,
            params.learning_rate,
            spw
        );

        let bins = FeatureBins::fit(x, params.max_bins);
        let binned = bins.bin_matrix(x);
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            lambda: params.lambda,
            min_child_weight: params.min_child_weight,
            learning_rate: params.learning_rate,
        };

        let mut raw = vec![base_score; x.len()];
        let mut grad = vec![0.0; x.len()];
        let mut hess = vec![0.0; x.len()];
        let mut trees = Vec::with_capacity(params.n_estimators);

        for round in 0..params.n_estimators {
            for i in 0..x.len() {
                let p = sigmoid(raw[i]);
                grad[i] = weight[i] * (p - y[i] as f64);
                hess[i] = (weight[i] * p * (1.0 - p)).max(MIN_HESS);
            }
            let tree = TreeBuilder::new(&bins, &binned, &grad, &hess, tree_params).build();
            for (score, row) in raw.iter_mut().zip(x.rows()) {
                *score += tree.predict(row);
            }
            if (round + 1) % 25 == 0 {
                tracing::debug!("round {}: {} nodes in last tree", round + 1, tree.nodes().len());
            }
            trees.push(tree);
        }

        if raw.iter().any(|v| !v.is_finite()) {
            return Err(AppError::prediction("boosted trees produced non-finite scores"));
        }

        Ok(Self {
            base_score,
            scale_pos_weight: spw,
            n_features: x.width(),
            trees,
        })
    }

    fn predict_proba_row(&self, row: &[f64]) -> f64 {
        sigmoid(self.raw_score(row))
    }

    fn width(&self) -> usize {
        self.n_features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: Vec<Vec<f64>>) -> FeatureMatrix {
        let names = (0..rows[0].len()).map(|j| format!("x{j}")).collect();
        FeatureMatrix::new(names, rows).unwrap()
    }

    /// Positive only inside a band of `x0`; no single linear cut separates it.
    fn band_data() -> (FeatureMatrix, Vec<u8>) {
        let mut rows = Vec::new();
        let mut y = Vec::new();
        for i in 0..200 {
            let x0 = (i % 10) as f64;
            rows.push(vec![x0, (i % 7) as f64]);
            y.push(u8::from((4.0..=6.0).contains(&x0)));
        }
        (matrix(rows), y)
    }

    #[test]
    fn learns_a_band_a_single_cut_cannot() {
        let (x, y) = band_data();
        let model = BoostedTrees::fit(&ChallengerParams::default(), &x, &y, &Span::none()).unwrap();
        let labels = model.predict_label(&x).unwrap();
        assert_eq!(labels, y);
        assert!(model.trees.iter().all(|t| t.depth() <= 5));
        assert_eq!(model.trees.len(), 100);
    }

    #[test]
    fn default_positive_weight_balances_the_prior() {
        let x = matrix((0..40).map(|i| vec![(i % 3) as f64]).collect());
        let y: Vec<u8> = (0..40).map(|i| u8::from(i % 10 == 0)).collect();
        let model = BoostedTrees::fit(&ChallengerParams::default(), &x, &y, &Span::none()).unwrap();
        assert!((model.scale_pos_weight - 9.0).abs() < 1e-12);
        assert!(model.base_score.abs() < 1e-9);
    }

    #[test]
    fn fitting_is_deterministic() {
        let (x, y) = band_data();
        let params = ChallengerParams {
            n_estimators: 10,
            ..ChallengerParams::default()
        };
        let a = BoostedTrees::fit(&params, &x, &y, &Span::none()).unwrap();
        let b = BoostedTrees::fit(&params, &x, &y, &Span::none()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_params_are_configuration_errors() {
        let bad = ChallengerParams {
            learning_rate: 0.0,
            ..ChallengerParams::default()
        };
        assert_eq!(bad.validate().unwrap_err().kind(), crate::error::ErrorKind::InvalidConfiguration);
        let bad = ChallengerParams {
            scale_pos_weight: Some(-1.0),
            ..ChallengerParams::default()
        };
        assert!(bad.validate().is_err());
    }
}
