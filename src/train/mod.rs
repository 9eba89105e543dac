//! Training orchestrator.
//!
//! The run is a straight sequence of stage values, each produced from the
//! previous one only:
//!
//! ```text
//! Loaded -> Cleaned -> Validated -> SplitSets -> FeaturesFit -> ModelsFit -> Evaluated -> TrainingRun
//! ```
//!
//! Raw input is read exactly once (in [`Trainer::load`]); every later stage
//! works on the value handed to it. Training is single-threaded and any
//! failure aborts the run.

use std::path::{Path, PathBuf};

use tracing::Span;

use crate::config::AppConfig;
use crate::data::{Cleaner, CleaningPolicy, Schema, StratifiedSplitter, TelcoColumns, Validator};
use crate::domain::{ModelSelection, ModelVariant, Record};
use crate::error::AppError;
use crate::features::{FeatureMatrix, FeaturePipeline};
use crate::io::{ScoringArtifact, read_csv, write_artifact};
use crate::logging::LogHandle;
use crate::models::ChurnModel;
use crate::report::{EvaluationMetrics, format_classification_report};

pub mod selection;

pub use selection::{BestChoice, choose_best};

/// File name of the designated best artifact inside the artifact directory.
pub const BEST_ARTIFACT_FILE: &str = "best_model.json";

/// Path of the per-variant artifact inside `dir`.
pub fn artifact_path(dir: &Path, variant: ModelVariant) -> PathBuf {
    dir.join(format!("{}.json", variant.artifact_stem()))
}

/// Raw rows as read from the input file.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub source: PathBuf,
    pub records: Vec<Record>,
    pub rows_skipped: usize,
}

impl Loaded {
    /// Start a run from rows already in memory; `source` only labels messages.
    pub fn from_records(source: impl Into<PathBuf>, records: Vec<Record>) -> Self {
        Self {
            source: source.into(),
            records,
            rows_skipped: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Cleaned {
    pub source: PathBuf,
    pub records: Vec<Record>,
    pub duplicates_removed: usize,
}

#[derive(Debug, Clone)]
pub struct Validated {
    pub records: Vec<Record>,
}

#[derive(Debug, Clone)]
pub struct SplitSets {
    pub train: Vec<Record>,
    pub test: Vec<Record>,
    /// Rows dropped because their label was neither `Yes` nor `No`.
    pub unlabeled: usize,
}

/// The fitted feature pipeline plus both encoded sets.
#[derive(Debug, Clone)]
pub struct FeaturesFit {
    pub pipeline: FeaturePipeline,
    pub x_train: FeatureMatrix,
    pub y_train: Vec<u8>,
    pub x_test: FeatureMatrix,
    pub y_test: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ModelsFit {
    pub features: FeaturesFit,
    pub models: Vec<ChurnModel>,
}

/// One variant after held-out evaluation.
#[derive(Debug, Clone)]
pub struct VariantOutcome {
    pub model: ChurnModel,
    pub metrics: EvaluationMetrics,
    /// In-process churn probabilities of the test set, in test order.
    pub test_probabilities: Vec<f64>,
}

impl VariantOutcome {
    pub fn variant(&self) -> ModelVariant {
        self.model.variant()
    }
}

#[derive(Debug, Clone)]
pub struct Evaluated {
    pub features: FeaturesFit,
    pub outcomes: Vec<VariantOutcome>,
}

/// Row counts carried into the run summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub duplicates_removed: usize,
    pub unlabeled: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub n_features: usize,
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct TrainingRun {
    pub source: PathBuf,
    pub selection: ModelSelection,
    pub counts: RunCounts,
    pub feature_names: Vec<String>,
    pub outcomes: Vec<VariantOutcome>,
    pub best: BestChoice,
    /// `(variant, path)` of every artifact written, in training order.
    pub artifacts: Vec<(ModelVariant, PathBuf)>,
    pub best_path: PathBuf,
    /// Held-out test rows as they entered the feature pipeline.
    pub test_records: Vec<Record>,
}

impl TrainingRun {
    pub fn outcome(&self, variant: ModelVariant) -> Option<&VariantOutcome> {
        self.outcomes.iter().find(|o| o.variant() == variant)
    }
}

/// Spans of the components a run constructs.
#[derive(Debug, Clone)]
struct Spans {
    loader: Span,
    cleaner: Span,
    validator: Span,
    splitter: Span,
    features: Span,
    models: Span,
    persist: Span,
}

impl Spans {
    fn from_handle(log: &LogHandle) -> Self {
        Self {
            loader: log.component("loader"),
            cleaner: log.component("cleaner"),
            validator: log.component("validator"),
            splitter: log.component("splitter"),
            features: log.component("features"),
            models: log.component("models"),
            persist: log.component("persist"),
        }
    }
}

/// Runs the training stages for one configuration.
pub struct Trainer {
    config: AppConfig,
    spans: Spans,
}

impl Trainer {
    pub fn new(config: AppConfig, log: &LogHandle) -> Self {
        Self {
            config,
            spans: Spans::from_handle(log),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn cleaning_policy(&self) -> CleaningPolicy {
        let fe = &self.config.feature_engineering;
        CleaningPolicy::new(fe.numerical_cols.clone(), &fe.charges_col, &fe.tenure_col)
    }

    /// Read the configured raw file. Unreadable input is fatal.
    pub fn load(&self) -> Result<Loaded, AppError> {
        let _entered = self.spans.loader.enter();
        let path = &self.config.data.raw_path;
        tracing::info!("Loading data from {}", path.display());
        let table = read_csv(path)?;
        tracing::info!(
            "Loaded {} of {} row(s) with {} column(s) from {}",
            table.records.len(),
            table.rows_read(),
            table.headers.len(),
            path.display()
        );
        Ok(Loaded {
            source: table.path,
            rows_skipped: table.row_errors.len(),
            records: table.records,
        })
    }

    /// Coerce/impute and deduplicate; the label column must survive.
    pub fn clean(&self, loaded: Loaded) -> Result<Cleaned, AppError> {
        let cleaner = Cleaner::new(self.cleaning_policy(), self.spans.cleaner.clone());
        let outcome = cleaner.clean(&loaded.records);
        let target = &self.config.data.target_col;
        if !outcome.records.iter().any(|r| r.contains(target)) {
            return Err(AppError::config(format!(
                "Label column `{target}` is absent after cleaning '{}' ({} row(s)).",
                loaded.source.display(),
                outcome.records.len()
            )));
        }
        Ok(Cleaned {
            source: loaded.source,
            records: outcome.records,
            duplicates_removed: outcome.duplicates_removed,
        })
    }

    /// Schema check under the configured training policy.
    pub fn validate(&self, cleaned: Cleaned) -> Result<Validated, AppError> {
        let (data, fe) = (&self.config.data, &self.config.feature_engineering);
        let cols = TelcoColumns {
            id: &data.id_col,
            target: &data.target_col,
            tenure: &fe.tenure_col,
            charges: &fe.charges_col,
        };
        let validator = Validator::new(Schema::telco(cols), self.spans.validator.clone());
        let records = validator.enforce(cleaned.records, self.config.validation.training)?;
        Ok(Validated { records })
    }

    /// Drop rows without a usable label, then split stratified by label.
    pub fn split(&self, validated: Validated) -> Result<SplitSets, AppError> {
        let target = &self.config.data.target_col;
        let total = validated.records.len();
        let records: Vec<Record> = validated
            .records
            .into_iter()
            .filter(|r| r.label(target).is_some())
            .collect();
        let unlabeled = total - records.len();
        if unlabeled > 0 {
            let _entered = self.spans.splitter.enter();
            tracing::warn!("Dropped {unlabeled} row(s) whose `{target}` is neither Yes nor No.");
        }

        let splitter = StratifiedSplitter::new(
            self.config.split.test_fraction,
            self.config.split.seed,
            self.spans.splitter.clone(),
        )?;
        let (train, test) = splitter.split(records, target)?.into_parts();
        Ok(SplitSets {
            train,
            test,
            unlabeled,
        })
    }

    /// Fit the feature pipeline on train only and encode both sets.
    pub fn fit_features(&self, sets: &SplitSets) -> Result<FeaturesFit, AppError> {
        let _entered = self.spans.features.enter();
        let data = &self.config.data;
        let mut pipeline =
            FeaturePipeline::from_config(&self.config.feature_engineering, &data.id_col, &data.target_col);
        let x_train = pipeline.fit_transform(&sets.train)?;
        let x_test = pipeline.transform(&sets.test)?;
        Ok(FeaturesFit {
            pipeline,
            x_train,
            y_train: labels(&sets.train, &data.target_col),
            x_test,
            y_test: labels(&sets.test, &data.target_col),
        })
    }

    /// Fit every variant of `selection` on the training matrix.
    pub fn fit_models(&self, features: FeaturesFit, selection: ModelSelection) -> Result<ModelsFit, AppError> {
        let mut models = Vec::new();
        for variant in selection.variants() {
            {
                let _entered = self.spans.models.enter();
                tracing::info!("Training {}...", variant.display_name());
            }
            let model = ChurnModel::fit(
                variant,
                &self.config.baseline,
                &self.config.challenger,
                &features.x_train,
                &features.y_train,
                &self.spans.models,
            )?;
            models.push(model);
        }
        Ok(ModelsFit { features, models })
    }

    /// Score the held-out set with every fitted model and log the metrics.
    pub fn evaluate(&self, fitted: ModelsFit) -> Result<Evaluated, AppError> {
        let _entered = self.spans.models.enter();
        let features = fitted.features;
        let mut outcomes = Vec::with_capacity(fitted.models.len());
        for model in fitted.models {
            let test_probabilities = model.predict_proba(&features.x_test)?;
            let metrics = EvaluationMetrics::evaluate(&features.y_test, &test_probabilities);
            let variant = model.variant();
            tracing::info!("{variant} results:");
            match metrics.auc {
                Some(auc) => tracing::info!("ROC-AUC: {auc:.4}"),
                None => tracing::warn!("ROC-AUC: undefined (test set holds a single class)"),
            }
            tracing::info!("Recall: {:.4}", metrics.recall);
            tracing::info!("Precision: {:.4}", metrics.precision);
            tracing::info!("F1-Score: {:.4}", metrics.f1);
            tracing::info!("\n{}", format_classification_report(&metrics));
            outcomes.push(VariantOutcome {
                model,
                metrics,
                test_probabilities,
            });
        }
        Ok(Evaluated { features, outcomes })
    }

    /// Write one artifact per variant, then the designated best one.
    pub fn persist(
        &self,
        evaluated: &Evaluated,
        selection: ModelSelection,
    ) -> Result<(BestChoice, Vec<(ModelVariant, PathBuf)>, PathBuf), AppError> {
        let dir = &self.config.artifacts.dir;
        let data = &self.config.data;
        let mut written = Vec::with_capacity(evaluated.outcomes.len());
        let mut artifacts = Vec::with_capacity(evaluated.outcomes.len());

        for outcome in &evaluated.outcomes {
            let artifact = ScoringArtifact::new(
                &data.target_col,
                &data.id_col,
                self.cleaning_policy(),
                evaluated.features.pipeline.clone(),
                outcome.model.clone(),
                Some(outcome.metrics.clone()),
            )?;
            let path = artifact_path(dir, outcome.variant());
            {
                let _entered = self.spans.persist.enter();
                write_artifact(&path, &artifact)?;
            }
            written.push((outcome.variant(), path));
            artifacts.push(artifact);
        }

        let candidates: Vec<(ModelVariant, Option<f64>)> = evaluated
            .outcomes
            .iter()
            .map(|o| (o.variant(), o.metrics.auc))
            .collect();
        let best = choose_best(&candidates, selection)?;
        let Some(best_artifact) = artifacts.iter().find(|a| a.variant == best.variant) else {
            return Err(AppError::config(format!("No artifact was built for `{}`.", best.variant)));
        };

        let _entered = self.spans.persist.enter();
        let best_path = dir.join(BEST_ARTIFACT_FILE);
        write_artifact(&best_path, best_artifact)?;
        tracing::info!("Saved {} as {BEST_ARTIFACT_FILE}: {}", best.variant, best.reason);
        Ok((best, written, best_path))
    }

    /// Full run from the configured raw file.
    pub fn run(&self, selection: ModelSelection) -> Result<TrainingRun, AppError> {
        tracing::info!("Starting training pipeline. Mode: {selection:?}");
        let loaded = self.load()?;
        self.run_loaded(loaded, selection)
    }

    /// Full run from already-loaded rows.
    pub fn run_loaded(&self, loaded: Loaded, selection: ModelSelection) -> Result<TrainingRun, AppError> {
        let rows_read = loaded.records.len();
        let rows_skipped = loaded.rows_skipped;

        let cleaned = self.clean(loaded)?;
        let source = cleaned.source.clone();
        let duplicates_removed = cleaned.duplicates_removed;
        let validated = self.validate(cleaned)?;
        let sets = self.split(validated)?;
        let features = self.fit_features(&sets)?;
        let fitted = self.fit_models(features, selection)?;
        let evaluated = self.evaluate(fitted)?;
        let (best, artifacts, best_path) = self.persist(&evaluated, selection)?;

        let counts = RunCounts {
            rows_read,
            rows_skipped,
            duplicates_removed,
            unlabeled: sets.unlabeled,
            n_train: sets.train.len(),
            n_test: sets.test.len(),
            n_features: evaluated.features.pipeline.width(),
        };
        Ok(TrainingRun {
            source,
            selection,
            counts,
            feature_names: evaluated.features.pipeline.feature_names().to_vec(),
            outcomes: evaluated.outcomes,
            best,
            artifacts,
            best_path,
            test_records: sets.test,
        })
    }
}

fn labels(rows: &[Record], target_col: &str) -> Vec<u8> {
    rows.iter().map(|r| r.label(target_col).unwrap_or(0)).collect()
}
