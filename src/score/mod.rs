//! Scoring service: applies a loaded artifact to new customer records.
//!
//! A [`Scorer`] only exists for a successfully loaded artifact and never
//! refits or mutates it; the artifact sits behind an `Arc` so any number of
//! threads can score against one instance without locking.
//! [`ScoringService`] is the host-facing wrapper: a failed load leaves it
//! degraded instead of aborting, and every scoring call then fails fast with
//! `ModelNotLoaded`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use tracing::Span;

use crate::data::{Cleaner, Schema, TelcoColumns, Validator};
use crate::domain::{ModelVariant, PredictionResult, Record, ValidationPolicy};
use crate::error::AppError;
use crate::io::{ScoringArtifact, read_artifact};
use crate::report::EvaluationMetrics;

/// Frozen transform + model for one artifact.
#[derive(Debug, Clone)]
pub struct Scorer {
    artifact: Arc<ScoringArtifact>,
    cleaner: Cleaner,
    validator: Validator,
    policy: ValidationPolicy,
    span: Span,
}

impl Scorer {
    /// Load an artifact from disk.
    pub fn load(path: &Path, policy: ValidationPolicy, span: Span) -> Result<Self, AppError> {
        let artifact = {
            let _entered = span.enter();
            tracing::info!("Loading model from {}...", path.display());
            read_artifact(path)?
        };
        let scorer = Self::from_artifact(Arc::new(artifact), policy, span);
        scorer.span.in_scope(|| {
            tracing::info!(
                "Model loaded successfully ({}, {} features).",
                scorer.artifact.variant,
                scorer.artifact.feature_width()
            )
        });
        Ok(scorer)
    }

    pub fn from_artifact(artifact: Arc<ScoringArtifact>, policy: ValidationPolicy, span: Span) -> Self {
        let cols = TelcoColumns {
            id: &artifact.id_col,
            target: &artifact.target_col,
            tenure: &artifact.cleaning.tenure_col,
            charges: &artifact.cleaning.charges_col,
        };
        let schema = Schema::telco(cols).for_serving(&artifact.id_col, &artifact.target_col);
        Self {
            cleaner: Cleaner::new(artifact.cleaning.clone(), span.clone()),
            validator: Validator::new(schema, span.clone()),
            artifact,
            policy,
            span,
        }
    }

    pub fn artifact(&self) -> &ScoringArtifact {
        &self.artifact
    }

    /// Score one request record.
    ///
    /// The record is cleaned with the training-time policy (absent or null
    /// charges become 0), checked against the serving schema, transformed by
    /// the frozen pipeline and scored.
    pub fn score(&self, record: &Record) -> Result<PredictionResult, AppError> {
        let (cleaned, _) = self.cleaner.clean_record(record);
        if let Err(report) = self.validator.validate(std::slice::from_ref(&cleaned)) {
            match self.policy {
                ValidationPolicy::Strict => return Err(report.into()),
                ValidationPolicy::Advisory => {
                    let _entered = self.span.enter();
                    tracing::warn!("Scoring despite schema violation: {report}");
                }
            }
        }
        let features = self.artifact.features.transform_record(&cleaned)?;
        let p = self.artifact.model.probability(&features)?;
        Ok(PredictionResult::from_probability(p))
    }

    /// Score many records in parallel; results keep the input order and the
    /// first failure is returned.
    pub fn score_batch(&self, records: &[Record]) -> Result<Vec<PredictionResult>, AppError> {
        records.par_iter().map(|r| self.score(r)).collect()
    }
}

/// Health/info surface of the service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceInfo {
    pub ready: bool,
    pub artifact_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<ModelVariant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_width: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<EvaluationMetrics>,
}

#[derive(Debug, Clone)]
enum ServiceState {
    Ready(Scorer),
    Degraded { reason: String },
}

/// Scoring entry point owned by the host process.
#[derive(Debug, Clone)]
pub struct ScoringService {
    path: PathBuf,
    state: ServiceState,
}

impl ScoringService {
    /// Try to load `path`. Never fails: a load error becomes the degraded state.
    pub fn start(path: &Path, policy: ValidationPolicy, span: Span) -> Self {
        let state = match Scorer::load(path, policy, span.clone()) {
            Ok(scorer) => ServiceState::Ready(scorer),
            Err(err) => {
                let _entered = span.enter();
                tracing::error!("Failed to load model: {err}. Scoring calls will be rejected.");
                ServiceState::Degraded {
                    reason: err.to_string(),
                }
            }
        };
        Self {
            path: path.to_path_buf(),
            state,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, ServiceState::Ready(_))
    }

    pub fn scorer(&self) -> Result<&Scorer, AppError> {
        match &self.state {
            ServiceState::Ready(scorer) => Ok(scorer),
            ServiceState::Degraded { reason } => Err(AppError::model_not_loaded(reason)),
        }
    }

    pub fn info(&self) -> ServiceInfo {
        match &self.state {
            ServiceState::Ready(scorer) => {
                let a = scorer.artifact();
                ServiceInfo {
                    ready: true,
                    artifact_path: self.path.clone(),
                    reason: None,
                    variant: Some(a.variant),
                    format_version: Some(a.format_version),
                    feature_width: Some(a.feature_width()),
                    trained_at: Some(a.trained_at),
                    metrics: a.metrics.clone(),
                }
            }
            ServiceState::Degraded { reason } => ServiceInfo {
                ready: false,
                artifact_path: self.path.clone(),
                reason: Some(reason.clone()),
                variant: None,
                format_version: None,
                feature_width: None,
                trained_at: None,
                metrics: None,
            },
        }
    }

    pub fn score(&self, record: &Record) -> Result<PredictionResult, AppError> {
        self.scorer()?.score(record)
    }

    pub fn score_batch(&self, records: &[Record]) -> Result<Vec<PredictionResult>, AppError> {
        self.scorer()?.score_batch(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn scorer_and_service_are_shareable_across_threads() {
        assert_send_sync::<Scorer>();
        assert_send_sync::<ScoringService>();
    }

    #[test]
    fn missing_artifact_degrades_instead_of_failing() {
        let service = ScoringService::start(
            Path::new("no/such/best_model.json"),
            ValidationPolicy::Strict,
            Span::none(),
        );
        assert!(!service.is_ready());
        let info = service.info();
        assert!(!info.ready);
        assert!(info.reason.as_deref().is_some_and(|r| r.contains("best_model.json")));

        let err = service.score(&Record::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelNotLoaded);
        let err = service.score_batch(&[Record::new()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelNotLoaded);
    }
}
