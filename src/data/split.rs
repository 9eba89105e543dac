//! Seeded stratified train/test splitting.
//!
//! Each label class is sampled independently, so both sides keep the full-set
//! class ratio up to per-class rounding. Within a class, rows are first put in
//! content order (by canonical key) before the seeded shuffle: the partition
//! depends on the seed and the row contents, not on the order rows arrived in.

use std::collections::{BTreeMap, HashSet};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::Span;

use crate::domain::Record;
use crate::error::AppError;

/// Disjoint train/test cover of the split input.
#[derive(Debug, Clone)]
pub struct Split {
    train: Vec<Record>,
    test: Vec<Record>,
}

impl Split {
    pub fn train(&self) -> &[Record] {
        &self.train
    }

    pub fn test(&self) -> &[Record] {
        &self.test
    }

    pub fn into_parts(self) -> (Vec<Record>, Vec<Record>) {
        (self.train, self.test)
    }
}

#[derive(Debug, Clone)]
pub struct StratifiedSplitter {
    test_fraction: f64,
    seed: u64,
    span: Span,
}

impl StratifiedSplitter {
    pub fn new(test_fraction: f64, seed: u64, span: Span) -> Result<Self, AppError> {
        if !(test_fraction.is_finite() && test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(AppError::config(format!(
                "test fraction must be in (0, 1), got {test_fraction}"
            )));
        }
        Ok(Self {
            test_fraction,
            seed,
            span,
        })
    }

    pub fn split(&self, rows: Vec<Record>, label_field: &str) -> Result<Split, AppError> {
        let _entered = self.span.enter();
        tracing::info!(
            "Splitting data with test_fraction={} and seed={}",
            self.test_fraction,
            self.seed
        );

        if !rows.iter().any(|r| r.contains(label_field)) {
            return Err(AppError::config(format!(
                "Label column `{label_field}` not found in {} row(s).",
                rows.len()
            )));
        }

        let mut classes: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (idx, record) in rows.iter().enumerate() {
            classes.entry(class_key(record, label_field)).or_default().push(idx);
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut test_idx = HashSet::new();
        for members in classes.values_mut() {
            members.sort_by_cached_key(|&i| rows[i].canonical_key());
            members.shuffle(&mut rng);
            let n_test = (members.len() as f64 * self.test_fraction).round() as usize;
            test_idx.extend(members.iter().take(n_test).copied());
        }

        let total = rows.len();
        let mut train = Vec::with_capacity(total - test_idx.len());
        let mut test = Vec::with_capacity(test_idx.len());
        for (idx, record) in rows.into_iter().enumerate() {
            if test_idx.contains(&idx) {
                test.push(record);
            } else {
                train.push(record);
            }
        }

        if train.is_empty() || test.is_empty() {
            return Err(AppError::config(format!(
                "Split of {total} row(s) at test_fraction={} leaves an empty side (train={}, test={}).",
                self.test_fraction,
                train.len(),
                test.len()
            )));
        }

        tracing::info!(
            "Train/Test split complete. Train rows: {}, Test rows: {}",
            train.len(),
            test.len()
        );
        tracing::info!("Train class dist: {:?}", class_distribution(&train, label_field));
        tracing::info!("Test class dist: {:?}", class_distribution(&test, label_field));

        Ok(Split { train, test })
    }
}

fn class_key(record: &Record, label_field: &str) -> String {
    record
        .get(label_field)
        .and_then(|v| v.category_key())
        .unwrap_or_else(|| "<missing>".to_string())
}

/// Share of each label value in `rows`.
pub fn class_distribution(rows: &[Record], label_field: &str) -> BTreeMap<String, f64> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for record in rows {
        *counts.entry(class_key(record, label_field)).or_default() += 1;
    }
    let n = rows.len().max(1) as f64;
    counts.into_iter().map(|(k, c)| (k, c as f64 / n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Value;
    use crate::error::ErrorKind;

    fn rows(n: usize, positive_every: usize) -> Vec<Record> {
        (0..n)
            .map(|i| {
                let label = if i % positive_every == 0 { "Yes" } else { "No" };
                Record::new()
                    .with("customerID", Value::Text(format!("C{i:05}")))
                    .with("Churn", Value::Text(label.into()))
            })
            .collect()
    }

    fn positive_ratio(rows: &[Record]) -> f64 {
        class_distribution(rows, "Churn").get("Yes").copied().unwrap_or(0.0)
    }

    #[test]
    fn split_preserves_class_ratio_and_partitions() {
        let data = rows(1000, 4);
        let full = positive_ratio(&data);
        for &(fraction, seed) in &[(0.2, 42u64), (0.3, 7), (0.5, 1), (0.1, 99)] {
            let splitter = StratifiedSplitter::new(fraction, seed, Span::none()).unwrap();
            let split = splitter.split(data.clone(), "Churn").unwrap();
            assert!((positive_ratio(split.train()) - full).abs() <= 0.01);
            assert!((positive_ratio(split.test()) - full).abs() <= 0.01);

            let train_ids: HashSet<String> =
                split.train().iter().map(|r| r.text("customerID").unwrap().to_string()).collect();
            let test_ids: HashSet<String> =
                split.test().iter().map(|r| r.text("customerID").unwrap().to_string()).collect();
            assert!(train_ids.is_disjoint(&test_ids));
            assert_eq!(train_ids.len() + test_ids.len(), data.len());
        }
    }

    #[test]
    fn same_seed_same_partition_regardless_of_input_order() {
        let data = rows(200, 3);
        let mut reversed = data.clone();
        reversed.reverse();
        let splitter = StratifiedSplitter::new(0.25, 5, Span::none()).unwrap();
        let ids = |split: &Split| -> HashSet<String> {
            split.test().iter().map(|r| r.text("customerID").unwrap().to_string()).collect()
        };
        let a = splitter.split(data, "Churn").unwrap();
        let b = splitter.split(reversed, "Churn").unwrap();
        assert_eq!(ids(&a), ids(&b));
    }

    #[test]
    fn different_seeds_change_the_partition() {
        let data = rows(200, 3);
        let a = StratifiedSplitter::new(0.25, 1, Span::none()).unwrap().split(data.clone(), "Churn").unwrap();
        let b = StratifiedSplitter::new(0.25, 2, Span::none()).unwrap().split(data, "Churn").unwrap();
        assert_ne!(a.test(), b.test());
    }

    #[test]
    fn missing_label_field_is_invalid_configuration() {
        let err = StratifiedSplitter::new(0.2, 42, Span::none())
            .unwrap()
            .split(rows(10, 2), "Exited")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
        assert!(err.message().contains("Exited"));
    }

    #[test]
    fn fraction_outside_unit_interval_is_rejected() {
        assert!(StratifiedSplitter::new(0.0, 1, Span::none()).is_err());
        assert!(StratifiedSplitter::new(1.0, 1, Span::none()).is_err());
    }
}
