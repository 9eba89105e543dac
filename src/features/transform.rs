//! Record-to-record feature transforms.
//!
//! Each step is a tagged variant rather than a trait object so that the
//! pipeline serializes into the artifact as plain data (bucket edges, column
//! lists) and reloads without any registry. The steps are stateless; the only
//! learned state lives in the encoder that follows them.

use serde::{Deserialize, Serialize};

use crate::domain::{Record, Value};
use crate::error::AppError;

/// Upper (inclusive) bucket edges of the tenure cohorts, in months.
pub const TENURE_EDGES: [f64; 3] = [12.0, 24.0, 60.0];
pub const TENURE_LABELS: [&str; 4] = ["0-12", "12-24", "24-60", "60+"];
pub const TENURE_GROUP_COL: &str = "tenure_group";
pub const AVG_CHARGES_COL: &str = "calculated_AvgCharges";
pub const LOG_SUFFIX: &str = "_log";

/// One step of the feature pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transform {
    /// Remove columns that must never reach the model (ids, label).
    ColumnDrop { columns: Vec<String> },
    /// `output = numerator / max(denominator, 1)`.
    InteractionFeature {
        numerator: String,
        denominator: String,
        output: String,
    },
    /// Right-inclusive cohort buckets; the source column is kept.
    TenureBinning {
        column: String,
        edges: Vec<f64>,
        labels: Vec<String>,
        output: String,
    },
    /// `{col}_log = ln(1 + col)` for every listed column.
    LogTransform { columns: Vec<String> },
}

impl Transform {
    pub fn column_drop(columns: Vec<String>) -> Self {
        Transform::ColumnDrop { columns }
    }

    pub fn interaction(numerator: &str, denominator: &str) -> Self {
        Transform::InteractionFeature {
            numerator: numerator.to_string(),
            denominator: denominator.to_string(),
            output: AVG_CHARGES_COL.to_string(),
        }
    }

    pub fn tenure_binning(column: &str) -> Self {
        Transform::TenureBinning {
            column: column.to_string(),
            edges: TENURE_EDGES.to_vec(),
            labels: TENURE_LABELS.iter().map(|s| s.to_string()).collect(),
            output: TENURE_GROUP_COL.to_string(),
        }
    }

    pub fn log(columns: Vec<String>) -> Self {
        Transform::LogTransform { columns }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transform::ColumnDrop { .. } => "column_drop",
            Transform::InteractionFeature { .. } => "interaction_feature",
            Transform::TenureBinning { .. } => "tenure_binning",
            Transform::LogTransform { .. } => "log_transform",
        }
    }

    pub fn apply(&self, record: &Record) -> Result<Record, AppError> {
        match self {
            Transform::ColumnDrop { columns } => {
                let mut out = record.clone();
                for column in columns {
                    out.remove(column);
                }
                Ok(out)
            }
            Transform::InteractionFeature {
                numerator,
                denominator,
                output,
            } => {
                let total = required_number(record, numerator, self.name())?;
                let months = required_number(record, denominator, self.name())?;
                let mut out = record.clone();
                out.set(output.clone(), Value::Number(avg_per_period(total, months)));
                Ok(out)
            }
            Transform::TenureBinning {
                column,
                edges,
                labels,
                output,
            } => {
                let bucket = record
                    .number(column)
                    .and_then(|v| bucket_label(v, edges, labels))
                    .map(|label| Value::Text(label.to_string()))
                    .unwrap_or(Value::Missing);
                let mut out = record.clone();
                out.set(output.clone(), bucket);
                Ok(out)
            }
            Transform::LogTransform { columns } => {
                let mut out = record.clone();
                for column in columns {
                    let v = required_number(record, column, self.name())?;
                    out.set(format!("{column}{LOG_SUFFIX}"), Value::Number(v.ln_1p()));
                }
                Ok(out)
            }
        }
    }
}

/// Average per period with empty periods counted as one.
pub fn avg_per_period(total: f64, periods: f64) -> f64 {
    total / periods.max(1.0)
}

/// The first edge `>= v` picks the label; values beyond the last edge fall
/// into the open-ended bucket. Negative and NaN inputs have no bucket.
pub fn bucket_label<'a>(v: f64, edges: &[f64], labels: &'a [String]) -> Option<&'a str> {
    if v.is_nan() || v < 0.0 {
        return None;
    }
    let idx = edges.iter().position(|&edge| v <= edge).unwrap_or(edges.len());
    labels.get(idx).map(String::as_str)
}

fn required_number(record: &Record, column: &str, step: &str) -> Result<f64, AppError> {
    match record.get(column) {
        Some(Value::Number(v)) => Ok(*v),
        Some(other) => Err(AppError::prediction(format!(
            "{step}: column `{column}` is not numeric (got {other})"
        ))),
        None => Err(AppError::prediction(format!("{step}: column `{column}` is missing"))),
    }
}
