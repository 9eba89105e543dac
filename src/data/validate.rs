//! Declared-domain schema checks for cleaned records.
//!
//! The validator itself only reports. What a failed check *does* is decided by
//! the caller through [`ValidationPolicy`]: request-time serving rejects the
//! input, training logs the report and carries on with the cleaned rows.

use std::collections::BTreeSet;
use std::fmt;

use tracing::Span;

use crate::domain::{Record, ValidationPolicy, Value};
use crate::error::{AppError, ErrorKind};

/// How many violations are spelled out in messages.
const MAX_REPORTED: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Number,
}

/// Constraint on one column.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub allowed: Option<Vec<String>>,
    pub min: Option<f64>,
    pub required: bool,
    pub nullable: bool,
}

impl FieldSpec {
    pub fn text(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Text,
            allowed: None,
            min: None,
            required: true,
            nullable: false,
        }
    }

    pub fn integer(name: &str) -> Self {
        Self {
            kind: FieldKind::Integer,
            ..Self::text(name)
        }
    }

    pub fn number(name: &str) -> Self {
        Self {
            kind: FieldKind::Number,
            ..Self::text(name)
        }
    }

    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.allowed = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn at_least(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    fn check(&self, record: &Record) -> Option<String> {
        let Some(value) = record.get(&self.name) else {
            return self.required.then(|| "missing column".to_string());
        };
        if value.is_missing() {
            return (!self.nullable).then(|| "null value".to_string());
        }

        match (self.kind, value) {
            (FieldKind::Text, Value::Text(_)) => {}
            (FieldKind::Text, _) => return Some("expected text".to_string()),
            (FieldKind::Integer, Value::Number(v)) if v.is_finite() && v.fract() == 0.0 => {}
            (FieldKind::Integer, _) => return Some("expected integer".to_string()),
            (FieldKind::Number, Value::Number(v)) if v.is_finite() => {}
            (FieldKind::Number, _) => return Some("expected finite number".to_string()),
        }

        if let (Some(min), Some(v)) = (self.min, value.as_number()) {
            if v < min {
                return Some(format!("must be >= {min}"));
            }
        }
        if let Some(allowed) = &self.allowed {
            let key = value.category_key().unwrap_or_default();
            if !allowed.iter().any(|a| a == &key) {
                return Some(format!("not in {{{}}}", allowed.join(", ")));
            }
        }
        None
    }
}

/// Column names of the Telco layout that come from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelcoColumns<'a> {
    pub id: &'a str,
    pub target: &'a str,
    pub tenure: &'a str,
    pub charges: &'a str,
}

impl Default for TelcoColumns<'static> {
    fn default() -> Self {
        Self {
            id: "customerID",
            target: "Churn",
            tenure: "tenure",
            charges: "TotalCharges",
        }
    }
}

/// Ordered list of column constraints.
#[derive(Debug, Clone)]
pub struct Schema {
    pub fields: Vec<FieldSpec>,
}

impl Schema {
    /// Telco customer schema used for training data.
    pub fn telco(cols: TelcoColumns<'_>) -> Self {
        const YES_NO: &[&str] = &["Yes", "No"];
        Self {
            fields: vec![
                FieldSpec::text(cols.id),
                FieldSpec::text("gender").one_of(&["Male", "Female"]),
                FieldSpec::integer("SeniorCitizen").one_of(&["0", "1"]),
                FieldSpec::text("Partner").one_of(YES_NO),
                FieldSpec::text("Dependents").one_of(YES_NO),
                FieldSpec::integer(cols.tenure).at_least(0.0),
                FieldSpec::text("PhoneService").one_of(YES_NO),
                FieldSpec::text("MultipleLines"),
                FieldSpec::text("InternetService").one_of(&["DSL", "Fiber optic", "No"]),
                FieldSpec::text("OnlineSecurity"),
                FieldSpec::text("OnlineBackup"),
                FieldSpec::text("DeviceProtection"),
                FieldSpec::text("TechSupport"),
                FieldSpec::text("StreamingTV"),
                FieldSpec::text("StreamingMovies"),
                FieldSpec::text("Contract").one_of(&["Month-to-month", "One year", "Two year"]),
                FieldSpec::text("PaperlessBilling").one_of(YES_NO),
                FieldSpec::text("PaymentMethod"),
                FieldSpec::number("MonthlyCharges").at_least(0.0),
                FieldSpec::number(cols.charges).at_least(0.0).nullable(),
                FieldSpec::text(cols.target).one_of(YES_NO),
            ],
        }
    }

    /// Request-time variant: no label, customer id optional.
    pub fn for_serving(&self, id_col: &str, target_col: &str) -> Self {
        let fields = self
            .fields
            .iter()
            .filter(|f| f.name != target_col)
            .map(|f| {
                if f.name == id_col {
                    f.clone().optional()
                } else {
                    f.clone()
                }
            })
            .collect();
        Self { fields }
    }
}

/// A single failed constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    /// 1-based position of the row in the checked batch.
    pub row: usize,
    pub column: String,
    pub value: String,
    pub reason: String,
}

/// Every constraint failure of one validation pass.
#[derive(Debug, Clone)]
pub struct SchemaViolation {
    pub violations: Vec<Violation>,
    pub rows_checked: usize,
}

impl SchemaViolation {
    pub fn columns(&self) -> BTreeSet<&str> {
        self.violations.iter().map(|v| v.column.as_str()).collect()
    }

    pub fn failing_rows(&self) -> BTreeSet<usize> {
        self.violations.iter().map(|v| v.row).collect()
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns: Vec<&str> = self.columns().into_iter().collect();
        write!(
            f,
            "{} violation(s) in {} of {} row(s); columns: [{}]",
            self.violations.len(),
            self.failing_rows().len(),
            self.rows_checked,
            columns.join(", ")
        )?;
        for v in self.violations.iter().take(MAX_REPORTED) {
            write!(f, "; row {} `{}`={:?} {}", v.row, v.column, v.value, v.reason)?;
        }
        if self.violations.len() > MAX_REPORTED {
            write!(f, "; ...")?;
        }
        Ok(())
    }
}

impl std::error::Error for SchemaViolation {}

impl From<SchemaViolation> for AppError {
    fn from(value: SchemaViolation) -> Self {
        AppError::new(ErrorKind::SchemaViolation, value.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct Validator {
    schema: Schema,
    span: Span,
}

impl Validator {
    pub fn new(schema: Schema, span: Span) -> Self {
        Self { schema, span }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Check every row; `Err` carries all offending columns and rows.
    pub fn validate(&self, rows: &[Record]) -> Result<(), SchemaViolation> {
        let mut violations = Vec::new();
        for (idx, record) in rows.iter().enumerate() {
            for field in &self.schema.fields {
                if let Some(reason) = field.check(record) {
                    violations.push(Violation {
                        row: idx + 1,
                        column: field.name.clone(),
                        value: record.get(&field.name).map(|v| v.to_string()).unwrap_or_default(),
                        reason,
                    });
                }
            }
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(SchemaViolation {
                violations,
                rows_checked: rows.len(),
            })
        }
    }

    /// Apply `policy` to a validation pass over `rows`.
    ///
    /// `Advisory` hands the rows back unchanged even when they fail; the
    /// pipeline then continues on cleaned but not necessarily valid data.
    pub fn enforce(&self, rows: Vec<Record>, policy: ValidationPolicy) -> Result<Vec<Record>, AppError> {
        let _entered = self.span.enter();
        match (self.validate(&rows), policy) {
            (Ok(()), _) => {
                tracing::info!("Data validation passed ({} rows).", rows.len());
                Ok(rows)
            }
            (Err(report), ValidationPolicy::Strict) => {
                tracing::error!("Data validation failed: {report}");
                Err(report.into())
            }
            (Err(report), ValidationPolicy::Advisory) => {
                tracing::warn!("Data validation warning (continuing): {report}");
                Ok(rows)
            }
        }
    }
}
