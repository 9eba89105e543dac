//! Baseline: class-weighted, L2-penalized logistic regression over
//! standardized features.
//!
//! Objective (intercept unpenalized):
//!
//! ```text
//! minimize  C · Σ s_i · logloss(y_i, σ(b + wᵀz_i))  +  ½‖w‖²
//! ```
//!
//! with `z_i` the standardized row and `s_i = n / (2 · count(y_i))`, i.e.
//! each class contributes the same total weight. Solved by damped Newton
//! iterations (IRLS); each step solves the penalized Hessian system.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::Span;

use crate::error::AppError;
use crate::features::FeatureMatrix;
use crate::math::{log_loss, sigmoid, solve_spd};
use crate::models::Classifier;

/// Columns whose spread is below this are left unscaled.
const MIN_SCALE: f64 = 1e-12;
/// Step halvings tried before accepting a non-improving Newton step.
const MAX_BACKTRACK: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineParams {
    /// Inverse L2 regularization strength.
    #[serde(default = "default_c")]
    pub c: f64,
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    #[serde(default = "default_tol")]
    pub tol: f64,
}

impl Default for BaselineParams {
    fn default() -> Self {
        Self {
            c: default_c(),
            max_iter: default_max_iter(),
            tol: default_tol(),
        }
    }
}

impl BaselineParams {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.c.is_finite() && self.c > 0.0) {
            return Err(AppError::config(format!("`baseline.c` must be > 0, got {}.", self.c)));
        }
        if self.max_iter == 0 {
            return Err(AppError::config("`baseline.max_iter` must be > 0."));
        }
        if !(self.tol.is_finite() && self.tol > 0.0) {
            return Err(AppError::config(format!("`baseline.tol` must be > 0, got {}.", self.tol)));
        }
        Ok(())
    }
}

fn default_c() -> f64 {
    1.0
}

fn default_max_iter() -> usize {
    100
}

fn default_tol() -> f64 {
    1e-6
}

/// Per-column standardization learned on the training matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Population mean and standard deviation per column; constant columns get
    /// scale 1 so they map to zero instead of dividing by zero.
    pub fn fit(x: &FeatureMatrix) -> Self {
        let n = x.len().max(1) as f64;
        let mut mean = vec![0.0; x.width()];
        let mut scale = vec![0.0; x.width()];
        for j in 0..x.width() {
            let col = x.column(j);
            let m = col.iter().sum::<f64>() / n;
            let var = col.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
            mean[j] = m;
            scale[j] = if var.sqrt() > MIN_SCALE { var.sqrt() } else { 1.0 };
        }
        Self { mean, scale }
    }

    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }
}

/// Fitted baseline parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub scaler: StandardScaler,
    pub intercept: f64,
    pub coef: Vec<f64>,
    /// Loss weight of class 0 and class 1.
    pub class_weight: [f64; 2],
    pub iterations: usize,
    pub converged: bool,
}

impl LogisticModel {
    /// Coefficients and scaler must agree in width and be finite.
    pub fn check(&self) -> Result<(), AppError> {
        let width = self.coef.len();
        if self.scaler.mean.len() != width || self.scaler.scale.len() != width {
            return Err(AppError::config(format!(
                "baseline has {width} coefficients but a scaler of {}/{} columns",
                self.scaler.mean.len(),
                self.scaler.scale.len()
            )));
        }
        let finite = self.intercept.is_finite()
            && self.coef.iter().chain(&self.scaler.mean).all(|v| v.is_finite())
            && self.scaler.scale.iter().all(|s| s.is_finite() && *s > 0.0);
        if !finite {
            return Err(AppError::config("baseline parameters must be finite with positive scales"));
        }
        Ok(())
    }

    fn decision(&self, z: &[f64]) -> f64 {
        self.intercept + self.coef.iter().zip(z).map(|(w, v)| w * v).sum::<f64>()
    }
}

/// Balanced class weights `n / (2 · count)`.
pub fn balanced_class_weights(y: &[u8]) -> Result<[f64; 2], AppError> {
    let pos = y.iter().filter(|&&v| v == 1).count();
    let neg = y.len() - pos;
    if pos == 0 || neg == 0 {
        return Err(AppError::config(format!(
            "Training labels need both classes (positives={pos}, negatives={neg})."
        )));
    }
    let n = y.len() as f64;
    Ok([n / (2.0 * neg as f64), n / (2.0 * pos as f64)])
}

impl Classifier for LogisticModel {
    type Params = BaselineParams;

    fn fit(params: &BaselineParams, x: &FeatureMatrix, y: &[u8], span: &Span) -> Result<Self, AppError> {
        let _entered = span.enter();
        params.validate()?;
        if x.len() != y.len() {
            return Err(AppError::prediction(format!(
                "feature rows ({}) and labels ({}) differ in length",
                x.len(),
                y.len()
            )));
        }
        let class_weight = balanced_class_weights(y)?;
        let scaler = StandardScaler::fit(x);
        let z: Vec<Vec<f64>> = x.rows().iter().map(|r| scaler.transform_row(r)).collect();
        let sample_weight: Vec<f64> = y.iter().map(|&v| class_weight[v as usize]).collect();
        tracing::info!(
            "Fitting logistic baseline: {} rows, {} features, class weights {:.4}/{:.4}",
            x.len(),
            x.width(),
            class_weight[0],
            class_weight[1]
        );

        // beta[0] is the intercept.
        let dim = x.width() + 1;
        let mut beta = DVector::<f64>::zeros(dim);
        let mut objective = penalized_loss(&beta, &z, y, &sample_weight, params.c);
        let mut converged = false;
        let mut iterations = 0;

        for iter in 0..params.max_iter {
            iterations = iter + 1;
            let (grad, hess) = gradient_and_hessian(&beta, &z, y, &sample_weight, params.c);
            if grad.amax() < params.tol {
                converged = true;
                break;
            }
            let Some(step) = solve_spd(&hess, &grad) else {
                return Err(AppError::prediction(format!(
                    "logistic Newton system is singular at iteration {iterations}"
                )));
            };

            let mut t = 1.0;
            let mut candidate = &beta - &step;
            let mut candidate_obj = penalized_loss(&candidate, &z, y, &sample_weight, params.c);
            for _ in 0..MAX_BACKTRACK {
                if candidate_obj <= objective {
                    break;
                }
                t *= 0.5;
                candidate = &beta - &step * t;
                candidate_obj = penalized_loss(&candidate, &z, y, &sample_weight, params.c);
            }

            let delta = (&step * t).amax();
            beta = candidate;
            objective = candidate_obj;
            tracing::debug!("iter {iterations}: objective={objective:.6} max|step|={delta:.3e}");
            if delta < params.tol {
                converged = true;
                break;
            }
        }

        if !converged {
            tracing::warn!(
                "Logistic baseline did not converge in {} iterations (tol={})",
                params.max_iter,
                params.tol
            );
        }
        if beta.iter().any(|v| !v.is_finite()) {
            return Err(AppError::prediction("logistic baseline produced non-finite coefficients"));
        }

        Ok(Self {
            scaler,
            intercept: beta[0],
            coef: beta.iter().skip(1).copied().collect(),
            class_weight,
            iterations,
            converged,
        })
    }

    fn predict_proba_row(&self, row: &[f64]) -> f64 {
        sigmoid(self.decision(&self.scaler.transform_row(row)))
    }

    fn width(&self) -> usize {
        self.coef.len()
    }
}

fn linear(beta: &DVector<f64>, z: &[f64]) -> f64 {
    beta[0] + z.iter().enumerate().map(|(j, v)| beta[j + 1] * v).sum::<f64>()
}

fn penalized_loss(beta: &DVector<f64>, z: &[Vec<f64>], y: &[u8], s: &[f64], c: f64) -> f64 {
    let data: f64 = z
        .iter()
        .zip(y)
        .zip(s)
        .map(|((row, &yi), si)| si * log_loss(yi, sigmoid(linear(beta, row))))
        .sum();
    let penalty: f64 = beta.iter().skip(1).map(|w| w * w).sum();
    c * data + 0.5 * penalty
}

fn gradient_and_hessian(
    beta: &DVector<f64>,
    z: &[Vec<f64>],
    y: &[u8],
    s: &[f64],
    c: f64,
) -> (DVector<f64>, DMatrix<f64>) {
    let dim = beta.len();
    let mut grad = DVector::<f64>::zeros(dim);
    let mut hess = DMatrix::<f64>::zeros(dim, dim);
    let mut xi = vec![0.0; dim];

    for ((row, &yi), si) in z.iter().zip(y).zip(s) {
        xi[0] = 1.0;
        xi[1..].copy_from_slice(row);
        let p = sigmoid(linear(beta, row));
        let r = c * si * (p - yi as f64);
        let w = c * si * p * (1.0 - p);
        for a in 0..dim {
            grad[a] += r * xi[a];
            if xi[a] == 0.0 {
                continue;
            }
            let wa = w * xi[a];
            for b in a..dim {
                hess[(a, b)] += wa * xi[b];
            }
        }
    }
    for a in 1..dim {
        grad[a] += beta[a];
        hess[(a, a)] += 1.0;
    }
    for a in 0..dim {
        for b in 0..a {
            hess[(a, b)] = hess[(b, a)];
        }
    }
    (grad, hess)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: Vec<Vec<f64>>) -> FeatureMatrix {
        let names = (0..rows[0].len()).map(|j| format!("x{j}")).collect();
        FeatureMatrix::new(names, rows).unwrap()
    }

    #[test]
    fn balanced_weights_equalize_class_mass() {
        let y = [1, 0, 0, 0];
        let w = balanced_class_weights(&y).unwrap();
        assert!((w[0] * 3.0 - w[1] * 1.0).abs() < 1e-12);
        assert!((w[0] - 4.0 / 6.0).abs() < 1e-12);
        assert!(balanced_class_weights(&[0, 0]).is_err());
    }

    #[test]
    fn scaler_handles_constant_columns() {
        let x = matrix(vec![vec![1.0, 5.0], vec![3.0, 5.0]]);
        let scaler = StandardScaler::fit(&x);
        assert_eq!(scaler.mean, vec![2.0, 5.0]);
        assert_eq!(scaler.scale, vec![1.0, 1.0]);
        assert_eq!(scaler.transform_row(&[3.0, 5.0]), vec![1.0, 0.0]);
    }

    #[test]
    fn learns_a_separating_direction() {
        let mut rows = Vec::new();
        let mut y = Vec::new();
        for i in 0..200 {
            let v = i as f64 / 10.0;
            rows.push(vec![v, (i % 7) as f64]);
            y.push(u8::from(v > 12.0));
        }
        let x = matrix(rows);
        let model = LogisticModel::fit(&BaselineParams::default(), &x, &y, &Span::none()).unwrap();
        assert!(model.converged);
        assert!(model.coef[0] > 0.0);
        let probs = model.predict_proba(&x).unwrap();
        assert!(probs[0] < 0.1);
        assert!(probs[199] > 0.9);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn imbalance_weighting_lifts_minority_probability() {
        // 2 positives in 20 and no signal: balanced weights put the base rate at 0.5.
        let x = matrix((0..20).map(|i| vec![(i % 2) as f64]).collect());
        let y: Vec<u8> = (0..20).map(|i| u8::from(i < 2)).collect();
        let model = LogisticModel::fit(&BaselineParams::default(), &x, &y, &Span::none()).unwrap();
        for p in model.predict_proba(&x).unwrap() {
            assert!((p - 0.5).abs() < 1e-3, "probability {p}");
        }
    }

    #[test]
    fn rejects_invalid_params() {
        let bad = BaselineParams { c: 0.0, ..BaselineParams::default() };
        assert!(bad.validate().is_err());
    }
}
