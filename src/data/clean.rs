//! Record cleaning: numeric coercion, imputation and duplicate removal.
//!
//! Imputation policy (recorded, not an accident):
//!
//! - the accumulated-charges column and the tenure column are forced to a
//!   finite, non-negative number; absent, blank, non-numeric, non-finite or
//!   negative values become `impute_value` (0.0). The underlying assumption is
//!   that such a customer is brand new and has accumulated no charges yet.
//! - other `numeric_cols` are parsed when present; blank or unparseable values
//!   become `impute_value`, parsed values are kept as-is so that out-of-domain
//!   numbers are still visible to the schema validator.
//!
//! Malformed numeric input never raises: it is counted and logged.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::Span;

use crate::domain::{Record, Value};

/// Numeric coercion rules; persisted in the artifact so serving imputes exactly
/// like training did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningPolicy {
    pub numeric_cols: Vec<String>,
    pub charges_col: String,
    pub tenure_col: String,
    pub impute_value: f64,
}

impl CleaningPolicy {
    pub fn new(numeric_cols: Vec<String>, charges_col: &str, tenure_col: &str) -> Self {
        let mut numeric_cols = numeric_cols;
        for col in [tenure_col, charges_col] {
            if !numeric_cols.iter().any(|c| c == col) {
                numeric_cols.push(col.to_string());
            }
        }
        Self {
            numeric_cols,
            charges_col: charges_col.to_string(),
            tenure_col: tenure_col.to_string(),
            impute_value: 0.0,
        }
    }

    /// Columns that always come out finite and non-negative.
    pub fn is_forced(&self, col: &str) -> bool {
        col == self.charges_col || col == self.tenure_col
    }
}

/// Output of a cleaning pass.
#[derive(Debug, Clone)]
pub struct CleanOutcome {
    pub records: Vec<Record>,
    pub duplicates_removed: usize,
    /// Number of imputed cells per column.
    pub imputed: BTreeMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct Cleaner {
    policy: CleaningPolicy,
    span: Span,
}

impl Cleaner {
    pub fn new(policy: CleaningPolicy, span: Span) -> Self {
        Self { policy, span }
    }

    /// Clean a batch: coerce/impute every row, then drop exact duplicates
    /// (first occurrence wins). The input is left untouched.
    pub fn clean(&self, rows: &[Record]) -> CleanOutcome {
        let _entered = self.span.enter();

        let mut imputed: BTreeMap<String, usize> = BTreeMap::new();
        let mut seen = HashSet::with_capacity(rows.len());
        let mut records = Vec::with_capacity(rows.len());
        let mut duplicates_removed = 0usize;

        for row in rows {
            let (record, imputed_cols) = self.clean_record(row);
            for col in imputed_cols {
                *imputed.entry(col).or_default() += 1;
            }
            if seen.insert(record.canonical_key()) {
                records.push(record);
            } else {
                duplicates_removed += 1;
            }
        }

        for (col, count) in &imputed {
            tracing::info!(
                "Found {count} unusable value(s) in {col}; imputed {} (assuming new customers).",
                self.policy.impute_value
            );
        }
        if duplicates_removed > 0 {
            tracing::info!("Dropped {duplicates_removed} duplicate row(s).");
        }
        tracing::info!("Cleaning complete: {} -> {} rows.", rows.len(), records.len());

        CleanOutcome {
            records,
            duplicates_removed,
            imputed,
        }
    }

    /// Clean one record; returns the new record and the columns that were imputed.
    pub fn clean_record(&self, row: &Record) -> (Record, Vec<String>) {
        let mut record = row.clone();
        let mut imputed = Vec::new();
        let fill = self.policy.impute_value;

        for col in &self.policy.numeric_cols {
            let forced = self.policy.is_forced(col);
            let parsed = record.get(col).map(parse_number);
            let value = match (parsed, forced) {
                (Some(Some(v)), true) if v.is_finite() && v >= 0.0 => v,
                (_, true) => {
                    imputed.push(col.clone());
                    fill
                }
                (Some(Some(v)), false) if v.is_finite() => v,
                (Some(_), false) => {
                    imputed.push(col.clone());
                    fill
                }
                (None, false) => continue,
            };
            record.set(col.clone(), Value::Number(value));
        }

        (record, imputed)
    }
}

fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(v) => Some(*v),
        Value::Text(s) => s.trim().parse::<f64>().ok(),
        Value::Missing => None,
    }
}
