//! Which trained variant becomes `best_model.json`.
//!
//! Rules:
//! 1. Single-variant runs: the requested variant, unconditionally.
//! 2. Both variants: higher held-out ROC-AUC wins.
//! 3. Exact tie, or no comparable AUC on either side: the baseline (simpler model).
//!    A variant with an AUC beats one without.

use crate::domain::{ModelSelection, ModelVariant};
use crate::error::AppError;

/// Outcome of the selection policy.
#[derive(Debug, Clone, PartialEq)]
pub struct BestChoice {
    pub variant: ModelVariant,
    pub reason: String,
}

/// Pick the designated best variant among `candidates` (variant, test AUC).
pub fn choose_best(
    candidates: &[(ModelVariant, Option<f64>)],
    selection: ModelSelection,
) -> Result<BestChoice, AppError> {
    if candidates.is_empty() {
        return Err(AppError::config("No trained variants to choose a best model from."));
    }

    let requested = match selection {
        ModelSelection::Baseline => Some(ModelVariant::Baseline),
        ModelSelection::Challenger => Some(ModelVariant::Challenger),
        ModelSelection::All => None,
    };
    if let Some(variant) = requested {
        return if candidates.iter().any(|(v, _)| *v == variant) {
            Ok(BestChoice {
                variant,
                reason: format!("{variant} was the only variant requested"),
            })
        } else {
            Err(AppError::config(format!("Requested variant `{variant}` was not trained.")))
        };
    }

    let mut best = candidates[0];
    for &candidate in &candidates[1..] {
        if beats(candidate, best) {
            best = candidate;
        }
    }

    let describe = |auc: Option<f64>| auc.map(|a| format!("{a:.4}")).unwrap_or_else(|| "n/a".to_string());
    let summary: Vec<String> = candidates
        .iter()
        .map(|(v, auc)| format!("{v} AUC={}", describe(*auc)))
        .collect();
    let contested = candidates
        .iter()
        .any(|(v, auc)| *v != best.0 && *auc == best.1);
    let reason = if contested || best.1.is_none() {
        format!("tie ({}); preferring the simpler {}", summary.join(", "), best.0)
    } else {
        format!("highest test ROC-AUC ({})", summary.join(", "))
    };
    Ok(BestChoice {
        variant: best.0,
        reason,
    })
}

/// Whether `a` should replace the current best `b`.
fn beats(a: (ModelVariant, Option<f64>), b: (ModelVariant, Option<f64>)) -> bool {
    match (a.1, b.1) {
        (Some(x), Some(y)) if x > y => true,
        (Some(x), Some(y)) if x == y => simpler(a.0, b.0),
        (Some(_), None) => true,
        (None, None) => simpler(a.0, b.0),
        _ => false,
    }
}

fn simpler(a: ModelVariant, b: ModelVariant) -> bool {
    a == ModelVariant::Baseline && b != ModelVariant::Baseline
}
