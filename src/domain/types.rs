//! Shared domain types.
//!
//! Records are deliberately loosely typed (column name -> value) so that the
//! same representation flows through CSV ingest, JSON scoring requests,
//! cleaning, validation and the feature transforms. Column sets are driven by
//! configuration rather than baked into a struct.

use std::collections::BTreeMap;
use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Label value marking a churned customer.
pub const POSITIVE_LABEL: &str = "Yes";
/// Label value marking a retained customer.
pub const NEGATIVE_LABEL: &str = "No";

/// Probability at or above which a customer is `HIGH` risk.
pub const HIGH_RISK_THRESHOLD: f64 = 0.6;
/// Probability at or above which a customer is at least `MEDIUM` risk.
pub const MEDIUM_RISK_THRESHOLD: f64 = 0.3;

/// A single cell.
///
/// `Missing` covers blanks from CSV and `null` from JSON requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
    Missing,
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        match self {
            Value::Missing => true,
            Value::Text(s) => s.trim().is_empty(),
            Value::Number(_) => false,
        }
    }

    /// Render the value the way a categorical encoder sees it.
    ///
    /// Integral numbers print without a fractional part so that `0` read from
    /// CSV and `0` sent in a JSON request land on the same category.
    pub fn category_key(&self) -> Option<String> {
        match self {
            Value::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(v) if v.is_finite() && v.fract() == 0.0 => Some(format!("{}", *v as i64)),
            Value::Number(v) if v.is_finite() => Some(format!("{v}")),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Missing => write!(f, "<missing>"),
        }
    }
}

/// One customer row, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    values: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn number(&self, column: &str) -> Option<f64> {
        self.values.get(column).and_then(Value::as_number)
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        self.values.get(column).and_then(Value::as_text)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.values.insert(column.into(), value);
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.values.remove(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Builder-style insert, handy in tests and request construction.
    pub fn with(mut self, column: impl Into<String>, value: Value) -> Self {
        self.set(column, value);
        self
    }

    /// Content key that is identical for identical rows regardless of the
    /// order the row was read in. Numbers are keyed by their bit pattern.
    pub fn canonical_key(&self) -> String {
        let mut key = String::new();
        for (column, value) in &self.values {
            key.push_str(column);
            key.push('\u{1f}');
            match value {
                Value::Number(v) => {
                    key.push('n');
                    key.push_str(&format!("{:016x}", v.to_bits()));
                }
                Value::Text(s) => {
                    key.push('t');
                    key.push_str(s);
                }
                Value::Missing => key.push('m'),
            }
            key.push('\u{1e}');
        }
        key
    }

    /// Binary churn label of this record (`Yes` -> 1, `No` -> 0).
    pub fn label(&self, target_col: &str) -> Option<u8> {
        match self.text(target_col).map(str::trim) {
            Some(POSITIVE_LABEL) => Some(1),
            Some(NEGATIVE_LABEL) => Some(0),
            _ => None,
        }
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// One of the two trained model families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    /// Class-weighted logistic regression over standardized features.
    Baseline,
    /// Gradient-boosted decision trees with a positive-class weight.
    Challenger,
}

impl ModelVariant {
    pub const ALL: [ModelVariant; 2] = [ModelVariant::Baseline, ModelVariant::Challenger];

    pub fn display_name(self) -> &'static str {
        match self {
            ModelVariant::Baseline => "Baseline (logistic regression)",
            ModelVariant::Challenger => "Challenger (boosted trees)",
        }
    }

    /// File stem used for the per-variant artifact.
    pub fn artifact_stem(self) -> &'static str {
        match self {
            ModelVariant::Baseline => "baseline_model",
            ModelVariant::Challenger => "challenger_model",
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelVariant::Baseline => write!(f, "baseline"),
            ModelVariant::Challenger => write!(f, "challenger"),
        }
    }
}

/// Which variants a training run fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelSelection {
    All,
    Baseline,
    Challenger,
}

impl ModelSelection {
    pub fn variants(self) -> Vec<ModelVariant> {
        match self {
            ModelSelection::All => ModelVariant::ALL.to_vec(),
            ModelSelection::Baseline => vec![ModelVariant::Baseline],
            ModelSelection::Challenger => vec![ModelVariant::Challenger],
        }
    }
}

/// What a failed schema check does at a given boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// Reject the input with a `SchemaViolation` error.
    Strict,
    /// Log the violations and continue with the records as they are.
    Advisory,
}

/// Discretized churn probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskCategory {
    Low,
    Medium,
    High,
}

impl RiskCategory {
    pub fn from_probability(p: f64) -> Self {
        if p >= HIGH_RISK_THRESHOLD {
            RiskCategory::High
        } else if p >= MEDIUM_RISK_THRESHOLD {
            RiskCategory::Medium
        } else {
            RiskCategory::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskCategory::Low => "LOW",
            RiskCategory::Medium => "MEDIUM",
            RiskCategory::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scoring output for one record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub churn_probability: f64,
    pub risk_category: RiskCategory,
}

impl PredictionResult {
    pub fn from_probability(churn_probability: f64) -> Self {
        Self {
            churn_probability,
            risk_category: RiskCategory::from_probability(churn_probability),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_thresholds_are_left_closed() {
        assert_eq!(RiskCategory::from_probability(0.2999), RiskCategory::Low);
        assert_eq!(RiskCategory::from_probability(0.3), RiskCategory::Medium);
        assert_eq!(RiskCategory::from_probability(0.5999), RiskCategory::Medium);
        assert_eq!(RiskCategory::from_probability(0.6), RiskCategory::High);
        assert_eq!(RiskCategory::from_probability(0.0), RiskCategory::Low);
        assert_eq!(RiskCategory::from_probability(1.0), RiskCategory::High);
    }

    #[test]
    fn value_deserializes_from_json_scalars() {
        let record: Record =
            serde_json::from_str(r#"{"tenure": 0, "Contract": "Month-to-month", "TotalCharges": null}"#)
                .unwrap();
        assert_eq!(record.number("tenure"), Some(0.0));
        assert_eq!(record.text("Contract"), Some("Month-to-month"));
        assert_eq!(record.get("TotalCharges"), Some(&Value::Missing));
    }

    #[test]
    fn canonical_key_ignores_insertion_order() {
        let a = Record::new()
            .with("b", Value::Number(1.5))
            .with("a", Value::Text("x".into()));
        let b = Record::new()
            .with("a", Value::Text("x".into()))
            .with("b", Value::Number(1.5));
        assert_eq!(a.canonical_key(), b.canonical_key());
    }

    #[test]
    fn integral_numbers_share_category_with_text() {
        assert_eq!(Value::Number(1.0).category_key().as_deref(), Some("1"));
        assert_eq!(Value::Text(" 1 ".into()).category_key().as_deref(), Some("1"));
        assert_eq!(Value::Missing.category_key(), None);
    }

    #[test]
    fn prediction_serializes_uppercase_category() {
        let json = serde_json::to_string(&PredictionResult::from_probability(0.75)).unwrap();
        assert!(json.contains("\"HIGH\""));
    }
}
