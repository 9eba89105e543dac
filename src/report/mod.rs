//! Held-out evaluation of a fitted model.
//!
//! Scores are the churn-class probabilities; label-based metrics use the
//! 0.5 decision threshold of [`crate::models::DECISION_THRESHOLD`].

use serde::{Deserialize, Serialize};

use crate::domain::{NEGATIVE_LABEL, POSITIVE_LABEL};
use crate::models::DECISION_THRESHOLD;

pub mod format;

pub use format::*;

/// 2x2 confusion counts with churn as the positive class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tn: u64,
    pub fp: u64,
    #[serde(rename = "fn")]
    pub fn_: u64,
    pub tp: u64,
}

impl ConfusionMatrix {
    pub fn from_labels(truth: &[u8], predicted: &[u8]) -> Self {
        let mut cm = Self::default();
        for (&t, &p) in truth.iter().zip(predicted) {
            match (t, p) {
                (1, 1) => cm.tp += 1,
                (1, _) => cm.fn_ += 1,
                (_, 1) => cm.fp += 1,
                _ => cm.tn += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> u64 {
        self.tn + self.fp + self.fn_ + self.tp
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    /// Precision/recall/F1/support of class `1` (churn) or `0` (retained).
    pub fn class_stats(&self, class: u8) -> ClassReport {
        let (tp, fp, fn_) = if class == 1 {
            (self.tp, self.fp, self.fn_)
        } else {
            (self.tn, self.fn_, self.fp)
        };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        ClassReport {
            label: if class == 1 { POSITIVE_LABEL } else { NEGATIVE_LABEL }.to_string(),
            precision,
            recall,
            f1: f1(precision, recall),
            support: tp + fn_,
        }
    }
}

/// One row of the classification report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassReport {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: u64,
}

/// Test-set metrics persisted with each artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    /// `None` when the test set holds a single class.
    pub auc: Option<f64>,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub accuracy: f64,
    pub confusion: ConfusionMatrix,
    pub n_test: usize,
    pub per_class: Vec<ClassReport>,
}

impl EvaluationMetrics {
    pub fn evaluate(truth: &[u8], probabilities: &[f64]) -> Self {
        let predicted: Vec<u8> = probabilities
            .iter()
            .map(|&p| u8::from(p >= DECISION_THRESHOLD))
            .collect();
        let confusion = ConfusionMatrix::from_labels(truth, &predicted);
        let churn = confusion.class_stats(1);
        let per_class = vec![confusion.class_stats(0), churn.clone()];
        Self {
            auc: roc_auc(truth, probabilities),
            precision: churn.precision,
            recall: churn.recall,
            f1: churn.f1,
            accuracy: confusion.accuracy(),
            confusion,
            n_test: truth.len(),
            per_class,
        }
    }
}

/// Area under the ROC curve via the rank-sum statistic; tied scores share
/// their average rank.
pub fn roc_auc(truth: &[u8], scores: &[f64]) -> Option<f64> {
    let n_pos = truth.iter().filter(|&&t| t == 1).count();
    let n_neg = truth.len().saturating_sub(n_pos);
    if n_pos == 0 || n_neg == 0 || truth.len() != scores.len() {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum_pos = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // Ranks are 1-based; the tie group spans start+1..=end.
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        let positives = order[start..end].iter().filter(|&&i| truth[i] == 1).count();
        rank_sum_pos += avg_rank * positives as f64;
        start = end;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Some((rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auc_of_perfect_and_reversed_rankings() {
        let y = [0, 0, 1, 1];
        assert_eq!(roc_auc(&y, &[0.1, 0.2, 0.8, 0.9]), Some(1.0));
        assert_eq!(roc_auc(&y, &[0.9, 0.8, 0.2, 0.1]), Some(0.0));
    }

    #[test]
    fn auc_averages_ties() {
        let y = [0, 1, 0, 1];
        assert_eq!(roc_auc(&y, &[0.5, 0.5, 0.5, 0.5]), Some(0.5));
        // One positive above both negatives, one tied with a negative.
        let y = [0, 0, 1, 1];
        assert_eq!(roc_auc(&y, &[0.1, 0.4, 0.4, 0.9]), Some(0.875));
    }

    #[test]
    fn auc_needs_both_classes() {
        assert_eq!(roc_auc(&[1, 1], &[0.2, 0.3]), None);
    }

    #[test]
    fn label_metrics_at_half() {
        let y = [1, 1, 1, 0, 0, 0, 0, 0];
        let p = [0.9, 0.6, 0.4, 0.7, 0.2, 0.1, 0.3, 0.5];
        let m = EvaluationMetrics::evaluate(&y, &p);
        assert_eq!(
            m.confusion,
            ConfusionMatrix {
                tn: 3,
                fp: 2,
                fn_: 1,
                tp: 2
            }
        );
        assert!((m.precision - 0.5).abs() < 1e-12);
        assert!((m.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.f1 - 4.0 / 7.0).abs() < 1e-12);
        assert!((m.accuracy - 5.0 / 8.0).abs() < 1e-12);
        assert_eq!(m.per_class[0].label, "No");
        assert_eq!(m.per_class[0].support, 5);
        assert!((m.per_class[0].recall - 0.6).abs() < 1e-12);
    }

    #[test]
    fn degenerate_predictions_do_not_divide_by_zero() {
        let m = EvaluationMetrics::evaluate(&[0, 1], &[0.1, 0.2]);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.f1, 0.0);
    }
}
