//! Feature pipeline: ordered record transforms followed by the encoder.
//!
//! The fitted pipeline is frozen data. Training fits it once on the train
//! split; scoring only ever calls [`FeaturePipeline::transform_record`].

use serde::{Deserialize, Serialize};

use crate::config::FeatureConfig;
use crate::domain::Record;
use crate::error::AppError;

pub mod encoder;
pub mod transform;

pub use encoder::{CategoricalEncoder, Vocabulary};
pub use transform::{AVG_CHARGES_COL, LOG_SUFFIX, TENURE_GROUP_COL, Transform};

/// Dense row-major feature matrix with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    names: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn new(names: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self, AppError> {
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != names.len()) {
            return Err(AppError::prediction(format!(
                "feature row {idx} has width {} but the matrix has {} columns",
                row.len(),
                names.len()
            )));
        }
        Ok(Self { names, rows })
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn width(&self) -> usize {
        self.names.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of column `j` across all rows.
    pub fn column(&self, j: usize) -> Vec<f64> {
        self.rows.iter().map(|r| r[j]).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturePipeline {
    steps: Vec<Transform>,
    encoder: CategoricalEncoder,
    #[serde(default)]
    feature_names: Vec<String>,
}

impl FeaturePipeline {
    /// Unfitted pipeline for the configured columns:
    /// drop id/label, interaction, tenure cohort, log charges, encode.
    pub fn from_config(fe: &FeatureConfig, id_col: &str, target_col: &str) -> Self {
        let mut categorical = fe.categorical_cols.clone();
        categorical.push(TENURE_GROUP_COL.to_string());

        let mut numeric = fe.numerical_cols.clone();
        numeric.push(AVG_CHARGES_COL.to_string());
        numeric.extend(fe.log_cols.iter().map(|c| format!("{c}{LOG_SUFFIX}")));

        let steps = vec![
            Transform::column_drop(vec![id_col.to_string(), target_col.to_string()]),
            Transform::interaction(&fe.charges_col, &fe.tenure_col),
            Transform::tenure_binning(&fe.tenure_col),
            Transform::log(fe.log_cols.clone()),
        ];
        Self {
            steps,
            encoder: CategoricalEncoder::new(categorical, numeric),
            feature_names: Vec::new(),
        }
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn width(&self) -> usize {
        self.feature_names.len()
    }

    pub fn is_fitted(&self) -> bool {
        !self.feature_names.is_empty()
    }

    /// Run the steps over the training rows, fit the encoder on their output
    /// and return the training matrix.
    pub fn fit_transform(&mut self, rows: &[Record]) -> Result<FeatureMatrix, AppError> {
        let mut current: Vec<Record> = rows.to_vec();
        for step in &self.steps {
            current = current.iter().map(|r| step.apply(r)).collect::<Result<_, _>>()?;
            tracing::debug!("Applied feature step `{}`", step.name());
        }
        self.encoder.fit(&current)?;
        self.feature_names = self.encoder.feature_names();
        tracing::info!(
            "Feature pipeline fitted: {} steps, {} features.",
            self.steps.len(),
            self.feature_names.len()
        );

        let encoded = current.iter().map(|r| self.encoder.encode(r)).collect::<Result<_, _>>()?;
        FeatureMatrix::new(self.feature_names.clone(), encoded)
    }

    /// Frozen transform of one record into a vector of [`width`](Self::width).
    pub fn transform_record(&self, record: &Record) -> Result<Vec<f64>, AppError> {
        if !self.is_fitted() {
            return Err(AppError::prediction("feature pipeline used before fit"));
        }
        let mut current = record.clone();
        for step in &self.steps {
            current = step.apply(&current)?;
        }
        let vector = self.encoder.encode(&current)?;
        if vector.len() != self.feature_names.len() {
            return Err(AppError::prediction(format!(
                "encoded width {} does not match fitted width {}",
                vector.len(),
                self.feature_names.len()
            )));
        }
        Ok(vector)
    }

    pub fn transform(&self, rows: &[Record]) -> Result<FeatureMatrix, AppError> {
        let encoded = rows
            .iter()
            .map(|r| self.transform_record(r))
            .collect::<Result<Vec<_>, _>>()?;
        FeatureMatrix::new(self.feature_names.clone(), encoded)
    }
}
