//! One-hot encoding with numeric passthrough.
//!
//! Output layout: every categorical column's indicator block (columns in
//! configured order, categories sorted), followed by the passthrough numeric
//! columns. The layout is frozen by `fit`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::{Record, Value};
use crate::error::AppError;

/// Learned categories of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub column: String,
    pub categories: Vec<String>,
}

impl Vocabulary {
    fn index_of(&self, key: &str) -> Option<usize> {
        self.categories.binary_search_by(|c| c.as_str().cmp(key)).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    categorical_cols: Vec<String>,
    numeric_cols: Vec<String>,
    #[serde(default)]
    vocabulary: Vec<Vocabulary>,
    #[serde(default)]
    fitted: bool,
}

impl CategoricalEncoder {
    pub fn new(categorical_cols: Vec<String>, numeric_cols: Vec<String>) -> Self {
        Self {
            categorical_cols,
            numeric_cols,
            vocabulary: Vec::new(),
            fitted: false,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    pub fn vocabulary(&self) -> &[Vocabulary] {
        &self.vocabulary
    }

    pub fn fit(&mut self, rows: &[Record]) -> Result<(), AppError> {
        if rows.is_empty() {
            return Err(AppError::config("Cannot fit the categorical encoder on zero rows."));
        }
        let mut vocabulary = Vec::with_capacity(self.categorical_cols.len());
        for column in &self.categorical_cols {
            if !rows.iter().any(|r| r.contains(column)) {
                return Err(AppError::config(format!(
                    "Categorical column `{column}` not found in {} training row(s).",
                    rows.len()
                )));
            }
            let categories: BTreeSet<String> = rows
                .iter()
                .filter_map(|r| r.get(column).and_then(Value::category_key))
                .collect();
            tracing::debug!("{column}: {} categories", categories.len());
            vocabulary.push(Vocabulary {
                column: column.clone(),
                categories: categories.into_iter().collect(),
            });
        }
        self.vocabulary = vocabulary;
        self.fitted = true;
        Ok(())
    }

    /// Output column names, in vector order.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .vocabulary
            .iter()
            .flat_map(|v| v.categories.iter().map(move |c| format!("{}_{c}", v.column)))
            .collect();
        names.extend(self.numeric_cols.iter().cloned());
        names
    }

    pub fn width(&self) -> usize {
        self.vocabulary.iter().map(|v| v.categories.len()).sum::<usize>() + self.numeric_cols.len()
    }

    /// Encode one record into a vector of [`width`](Self::width) values.
    ///
    /// Unseen or missing categories leave their block all zero. Numeric
    /// passthrough columns must hold finite numbers.
    pub fn encode(&self, record: &Record) -> Result<Vec<f64>, AppError> {
        if !self.is_fitted() {
            return Err(AppError::prediction("categorical encoder used before fit"));
        }
        let mut out = vec![0.0; self.width()];
        let mut offset = 0;
        for vocab in &self.vocabulary {
            if let Some(idx) = record
                .get(&vocab.column)
                .and_then(Value::category_key)
                .and_then(|key| vocab.index_of(&key))
            {
                out[offset + idx] = 1.0;
            }
            offset += vocab.categories.len();
        }
        for column in &self.numeric_cols {
            out[offset] = match record.get(column) {
                Some(Value::Number(v)) if v.is_finite() => *v,
                Some(other) => {
                    return Err(AppError::prediction(format!(
                        "numeric feature `{column}` is not a finite number (got {other})"
                    )));
                }
                None => {
                    return Err(AppError::prediction(format!("numeric feature `{column}` is missing")));
                }
            };
            offset += 1;
        }
        Ok(out)
    }
}
