//! Read/write scoring artifacts.
//!
//! An artifact is the portable form of one trained variant: the cleaning
//! policy, the fitted feature pipeline (steps, bucket edges, vocabularies,
//! feature order) and the fitted model parameters, plus the held-out metrics
//! of the run that produced it. It is plain JSON so it can be inspected and
//! diffed; `serde_json`'s round-trip float parsing keeps reloaded predictions
//! bit-identical to the in-process ones.

use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::data::CleaningPolicy;
use crate::domain::ModelVariant;
use crate::error::AppError;
use crate::features::FeaturePipeline;
use crate::models::ChurnModel;
use crate::report::EvaluationMetrics;

/// Format tag every artifact carries.
pub const ARTIFACT_FORMAT: &str = "churn-risk-artifact";
/// Schema version written by this build; the only one it reads.
pub const FORMAT_VERSION: u32 = 1;

/// One trained variant, frozen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringArtifact {
    pub format: String,
    pub format_version: u32,
    pub variant: ModelVariant,
    pub trained_at: DateTime<Utc>,
    pub target_col: String,
    pub id_col: String,
    pub cleaning: CleaningPolicy,
    pub features: FeaturePipeline,
    pub model: ChurnModel,
    #[serde(default)]
    pub metrics: Option<EvaluationMetrics>,
}

impl ScoringArtifact {
    /// Bundle fitted state. Fails if the pipeline is unfitted or its width
    /// disagrees with the model.
    pub fn new(
        target_col: &str,
        id_col: &str,
        cleaning: CleaningPolicy,
        features: FeaturePipeline,
        model: ChurnModel,
        metrics: Option<EvaluationMetrics>,
    ) -> Result<Self, AppError> {
        let artifact = Self {
            format: ARTIFACT_FORMAT.to_string(),
            format_version: FORMAT_VERSION,
            variant: model.variant(),
            trained_at: Utc::now(),
            target_col: target_col.to_string(),
            id_col: id_col.to_string(),
            cleaning,
            features,
            model,
            metrics,
        };
        artifact.check_consistency()?;
        Ok(artifact)
    }

    pub fn feature_width(&self) -> usize {
        self.features.width()
    }

    fn check_consistency(&self) -> Result<(), AppError> {
        if !self.features.is_fitted() {
            return Err(AppError::config("Artifact feature pipeline is not fitted."));
        }
        if self.features.width() != self.model.width() {
            return Err(AppError::config(format!(
                "Artifact feature width {} does not match model width {}.",
                self.features.width(),
                self.model.width()
            )));
        }
        self.model.check()?;
        if self.variant != self.model.variant() {
            return Err(AppError::config(format!(
                "Artifact declares variant `{}` but holds a {} model.",
                self.variant,
                self.model.variant()
            )));
        }
        Ok(())
    }
}

/// Only the fields needed to decide whether the rest can be parsed.
#[derive(Deserialize)]
struct Header {
    format: Option<String>,
    format_version: Option<u32>,
}

/// Write `artifact` to `path` atomically: a temp file in the same directory is
/// fully written, synced, then renamed over the target.
pub fn write_artifact(path: &Path, artifact: &ScoringArtifact) -> Result<(), AppError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| AppError::io(dir, format!("failed to create artifact directory: {e}")))?;

    let json = serde_json::to_string_pretty(artifact)
        .map_err(|e| AppError::io(path, format!("failed to serialize artifact: {e}")))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| AppError::io(dir, format!("failed to create temp file: {e}")))?;
    tmp.write_all(json.as_bytes())
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| AppError::io(path, format!("failed to write artifact: {e}")))?;
    tmp.persist(path)
        .map_err(|e| AppError::io(path, format!("failed to move artifact into place: {}", e.error)))?;

    tracing::info!("Saved {} artifact to {}", artifact.variant, path.display());
    Ok(())
}

/// Read and check an artifact.
///
/// A missing or unreadable file is `InputIo`; a foreign format tag or an
/// unsupported version is `InvalidConfiguration`.
pub fn read_artifact(path: &Path) -> Result<ScoringArtifact, AppError> {
    let text =
        fs::read_to_string(path).map_err(|e| AppError::io(path, format!("failed to read artifact: {e}")))?;

    let header: Header = serde_json::from_str(&text)
        .map_err(|e| AppError::io(path, format!("artifact is not valid JSON: {e}")))?;
    match header.format.as_deref() {
        Some(ARTIFACT_FORMAT) => {}
        other => {
            return Err(AppError::config(format!(
                "'{}' is not a churn-risk artifact (format tag {:?}).",
                path.display(),
                other.unwrap_or("<none>")
            )));
        }
    }
    match header.format_version {
        Some(FORMAT_VERSION) => {}
        other => {
            return Err(AppError::config(format!(
                "'{}' has unsupported artifact version {}; this build reads version {FORMAT_VERSION}.",
                path.display(),
                other.map(|v| v.to_string()).unwrap_or_else(|| "<none>".to_string())
            )));
        }
    }

    let artifact: ScoringArtifact = serde_json::from_str(&text)
        .map_err(|e| AppError::config(format!("'{}': malformed artifact: {e}", path.display())))?;
    artifact
        .check_consistency()
        .map_err(|e| AppError::config(format!("'{}': {}", path.display(), e.message())))?;
    Ok(artifact)
}
