//! Synthetic Telco-style customer generation.
//!
//! Produces raw rows exactly as a CSV export would hold them (every cell is
//! text), including the quirks the cleaner exists for: a blank
//! `TotalCharges` for customers with zero tenure, and a handful of exact
//! duplicate rows. Churn is drawn from a logistic model of contract type,
//! tenure, internet service and payment method, so trained models have
//! real signal to find.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{NEGATIVE_LABEL, POSITIVE_LABEL, Record, Value};
use crate::error::AppError;
use crate::math::sigmoid;

/// Column order of generated files.
pub const TELCO_COLUMNS: [&str; 21] = [
    "customerID",
    "gender",
    "SeniorCitizen",
    "Partner",
    "Dependents",
    "tenure",
    "PhoneService",
    "MultipleLines",
    "InternetService",
    "OnlineSecurity",
    "OnlineBackup",
    "DeviceProtection",
    "TechSupport",
    "StreamingTV",
    "StreamingMovies",
    "Contract",
    "PaperlessBilling",
    "PaymentMethod",
    "MonthlyCharges",
    "TotalCharges",
    "Churn",
];

const ADD_ONS: [&str; 6] = [
    "OnlineSecurity",
    "OnlineBackup",
    "DeviceProtection",
    "TechSupport",
    "StreamingTV",
    "StreamingMovies",
];

const PAYMENT_METHODS: [&str; 4] = [
    "Electronic check",
    "Mailed check",
    "Bank transfer (automatic)",
    "Credit card (automatic)",
];

const MAX_TENURE: u32 = 72;

#[derive(Debug, Clone)]
pub struct SampleConfig {
    pub rows: usize,
    pub seed: u64,
    /// Share of extra rows that are exact copies of generated ones.
    pub duplicate_fraction: f64,
}

impl SampleConfig {
    pub fn new(rows: usize, seed: u64) -> Self {
        Self {
            rows,
            seed,
            duplicate_fraction: 0.005,
        }
    }
}

/// Generate `config.rows` customers plus duplicates; same seed, same rows.
pub fn generate_sample(config: &SampleConfig) -> Result<Vec<Record>, AppError> {
    if config.rows == 0 {
        return Err(AppError::config("Sample row count must be > 0."));
    }
    if !(0.0..1.0).contains(&config.duplicate_fraction) {
        return Err(AppError::config("Duplicate fraction must be in [0, 1)."));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let noise = Normal::new(0.0, 1.0).map_err(|e| AppError::config(format!("Noise distribution error: {e}")))?;

    let mut records: Vec<Record> = (0..config.rows)
        .map(|i| generate_customer(&mut rng, &noise, i))
        .collect();

    let n_dupes = (config.rows as f64 * config.duplicate_fraction).round() as usize;
    for _ in 0..n_dupes {
        let idx = rng.gen_range(0..config.rows);
        let copy = records[idx].clone();
        records.push(copy);
    }
    tracing::debug!("Generated {} customers and {n_dupes} duplicate(s)", config.rows);
    Ok(records)
}

fn generate_customer(rng: &mut StdRng, noise: &Normal<f64>, index: usize) -> Record {
    let senior = rng.gen_bool(0.16);
    let tenure = if rng.gen_bool(0.015) { 0 } else { rng.gen_range(1..=MAX_TENURE) };

    let contract = match rng.r#gen::<f64>() {
        u if u < 0.55 => "Month-to-month",
        u if u < 0.76 => "One year",
        _ => "Two year",
    };
    let internet = match rng.r#gen::<f64>() {
        u if u < 0.34 => "DSL",
        u if u < 0.78 => "Fiber optic",
        _ => "No",
    };
    let phone = rng.gen_bool(0.9);
    let multiple_lines = if phone { yes_no(rng, 0.42) } else { "No phone service" };
    let paperless = rng.gen_bool(0.59);
    let payment = PAYMENT_METHODS[rng.gen_range(0..PAYMENT_METHODS.len())];

    let mut record = Record::new()
        .with("customerID", Value::Text(customer_id(rng, index)))
        .with("gender", Value::Text(if rng.gen_bool(0.5) { "Male" } else { "Female" }.into()))
        .with("SeniorCitizen", Value::Text(if senior { "1" } else { "0" }.into()))
        .with("Partner", Value::Text(yes_no(rng, 0.48).into()))
        .with("Dependents", Value::Text(yes_no(rng, 0.3).into()))
        .with("tenure", Value::Text(tenure.to_string()))
        .with("PhoneService", Value::Text(if phone { "Yes" } else { "No" }.into()))
        .with("MultipleLines", Value::Text(multiple_lines.into()))
        .with("InternetService", Value::Text(internet.into()))
        .with("Contract", Value::Text(contract.into()))
        .with("PaperlessBilling", Value::Text(if paperless { "Yes" } else { "No" }.into()))
        .with("PaymentMethod", Value::Text(payment.into()));

    let mut monthly = 20.0;
    if phone {
        monthly += 5.0;
    }
    match internet {
        "DSL" => monthly += 25.0,
        "Fiber optic" => monthly += 50.0,
        _ => {}
    }
    for add_on in ADD_ONS {
        let value = if internet == "No" {
            "No internet service"
        } else {
            let v = yes_no(rng, 0.4);
            if v == "Yes" {
                monthly += 5.0;
            }
            v
        };
        record.set(add_on, Value::Text(value.into()));
    }
    monthly = round2((monthly + 2.0 * noise.sample(rng)).max(18.25));
    record.set("MonthlyCharges", Value::Text(format!("{monthly:.2}")));

    let total = if tenure == 0 {
        " ".to_string()
    } else {
        let drift = 1.0 + 0.05 * noise.sample(rng);
        format!("{:.2}", round2((tenure as f64 * monthly * drift).max(monthly)))
    };
    record.set("TotalCharges", Value::Text(total));

    let mut z = -1.6 - 0.035 * tenure as f64;
    z += match contract {
        "Month-to-month" => 1.4,
        "Two year" => -1.2,
        _ => 0.0,
    };
    if internet == "Fiber optic" {
        z += 0.8;
    }
    if payment == "Electronic check" {
        z += 0.5;
    }
    if senior {
        z += 0.3;
    }
    if paperless {
        z += 0.2;
    }
    let churned = rng.gen_bool(sigmoid(z));
    record.set(
        "Churn",
        Value::Text(if churned { POSITIVE_LABEL } else { NEGATIVE_LABEL }.into()),
    );
    record
}

fn yes_no(rng: &mut StdRng, p: f64) -> &'static str {
    if rng.gen_bool(p) { "Yes" } else { "No" }
}

fn customer_id(rng: &mut StdRng, index: usize) -> String {
    let suffix: String = (0..5).map(|_| rng.gen_range(b'A'..=b'Z') as char).collect();
    format!("{:04}-{suffix}", index % 10_000)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
