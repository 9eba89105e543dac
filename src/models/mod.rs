//! Churn classifiers.
//!
//! Both model families implement [`Classifier`]; the orchestrator and the
//! scorer only ever see the closed [`ChurnModel`] enum, which is also the
//! persisted form of a fitted model.

use serde::{Deserialize, Serialize};
use tracing::Span;

use crate::domain::ModelVariant;
use crate::error::AppError;
use crate::features::FeatureMatrix;

pub mod baseline;
pub mod challenger;
pub mod tree;

pub use baseline::{BaselineParams, LogisticModel, StandardScaler};
pub use challenger::{BoostedTrees, ChallengerParams};

/// Probability at or above which a row is labelled churn.
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Common fit/score contract.
pub trait Classifier: Sized {
    type Params;

    /// Fit on `x` with binary labels `y` (1 = churn).
    fn fit(params: &Self::Params, x: &FeatureMatrix, y: &[u8], span: &Span) -> Result<Self, AppError>;

    /// Churn probability of one encoded row. `row.len()` must equal [`width`](Self::width).
    fn predict_proba_row(&self, row: &[f64]) -> f64;

    /// Number of input features the model was fitted on.
    fn width(&self) -> usize;

    fn predict_proba(&self, x: &FeatureMatrix) -> Result<Vec<f64>, AppError> {
        if x.width() != self.width() {
            return Err(AppError::prediction(format!(
                "model expects {} features, got {}",
                self.width(),
                x.width()
            )));
        }
        Ok(x.rows().iter().map(|r| self.predict_proba_row(r)).collect())
    }

    fn predict_label(&self, x: &FeatureMatrix) -> Result<Vec<u8>, AppError> {
        Ok(self
            .predict_proba(x)?
            .into_iter()
            .map(|p| u8::from(p >= DECISION_THRESHOLD))
            .collect())
    }
}

/// A fitted model of either family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChurnModel {
    Baseline(LogisticModel),
    Challenger(BoostedTrees),
}

impl ChurnModel {
    pub fn fit(
        variant: ModelVariant,
        baseline: &BaselineParams,
        challenger: &ChallengerParams,
        x: &FeatureMatrix,
        y: &[u8],
        span: &Span,
    ) -> Result<Self, AppError> {
        match variant {
            ModelVariant::Baseline => LogisticModel::fit(baseline, x, y, span).map(ChurnModel::Baseline),
            ModelVariant::Challenger => BoostedTrees::fit(challenger, x, y, span).map(ChurnModel::Challenger),
        }
    }

    pub fn variant(&self) -> ModelVariant {
        match self {
            ChurnModel::Baseline(_) => ModelVariant::Baseline,
            ChurnModel::Challenger(_) => ModelVariant::Challenger,
        }
    }

    pub fn width(&self) -> usize {
        match self {
            ChurnModel::Baseline(m) => m.width(),
            ChurnModel::Challenger(m) => m.width(),
        }
    }

    /// Structural validity of deserialized parameters.
    pub fn check(&self) -> Result<(), AppError> {
        match self {
            ChurnModel::Baseline(m) => m.check(),
            ChurnModel::Challenger(m) => m.check(),
        }
    }

    /// Checked single-row probability: width must match and the result must be
    /// a probability.
    pub fn probability(&self, row: &[f64]) -> Result<f64, AppError> {
        if row.len() != self.width() {
            return Err(AppError::prediction(format!(
                "model expects {} features, got {}",
                self.width(),
                row.len()
            )));
        }
        let p = match self {
            ChurnModel::Baseline(m) => m.predict_proba_row(row),
            ChurnModel::Challenger(m) => m.predict_proba_row(row),
        };
        if p.is_finite() && (0.0..=1.0).contains(&p) {
            Ok(p)
        } else {
            Err(AppError::prediction(format!("model produced an invalid probability {p}")))
        }
    }

    pub fn predict_proba(&self, x: &FeatureMatrix) -> Result<Vec<f64>, AppError> {
        x.rows().iter().map(|r| self.probability(r)).collect()
    }

    pub fn predict_label(&self, x: &FeatureMatrix) -> Result<Vec<u8>, AppError> {
        Ok(self
            .predict_proba(x)?
            .into_iter()
            .map(|p| u8::from(p >= DECISION_THRESHOLD))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> (FeatureMatrix, Vec<u8>) {
        let rows: Vec<Vec<f64>> = (0..60).map(|i| vec![i as f64, (i % 4) as f64]).collect();
        let y = (0..60).map(|i| u8::from(i >= 40)).collect();
        (FeatureMatrix::new(vec!["a".into(), "b".into()], rows).unwrap(), y)
    }

    #[test]
    fn both_variants_share_the_contract() {
        let (x, y) = data();
        for variant in ModelVariant::ALL {
            let model = ChurnModel::fit(
                variant,
                &BaselineParams::default(),
                &ChallengerParams {
                    n_estimators: 20,
                    ..ChallengerParams::default()
                },
                &x,
                &y,
                &Span::none(),
            )
            .unwrap();
            assert_eq!(model.variant(), variant);
            assert_eq!(model.width(), 2);
            let probs = model.predict_proba(&x).unwrap();
            assert_eq!(probs.len(), 60);
            assert!(probs[0] < probs[59]);
            assert_eq!(model.predict_label(&x).unwrap()[59], 1);
        }
    }

    #[test]
    fn width_mismatch_is_prediction_failure() {
        let (x, y) = data();
        let model = ChurnModel::fit(
            ModelVariant::Baseline,
            &BaselineParams::default(),
            &ChallengerParams::default(),
            &x,
            &y,
            &Span::none(),
        )
        .unwrap();
        let err = model.probability(&[1.0]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::PredictionFailure);
    }

    #[test]
    fn persisted_form_is_tagged_by_kind() {
        let (x, y) = data();
        let model = ChurnModel::fit(
            ModelVariant::Challenger,
            &BaselineParams::default(),
            &ChallengerParams {
                n_estimators: 3,
                ..ChallengerParams::default()
            },
            &x,
            &y,
            &Span::none(),
        )
        .unwrap();
        let json = serde_json::to_string(&model).unwrap();
        assert!(json.starts_with("{\"kind\":\"challenger\""));
        let back: ChurnModel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, model);
    }
}
