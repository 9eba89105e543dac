//! Shared command workflows used by the CLI handlers.
//!
//! Keeping them here (rather than in the handlers) keeps the steps testable
//! without a process: config -> trainer -> run, and records -> scorer -> rows.

use std::path::Path;

use crate::config::AppConfig;
use crate::data::{SampleConfig, TELCO_COLUMNS, generate_sample};
use crate::domain::{ModelSelection, PredictionResult, Record};
use crate::error::AppError;
use crate::io::{read_records, write_records_csv};
use crate::logging::LogHandle;
use crate::score::Scorer;
use crate::train::{Trainer, TrainingRun};

/// Run the training orchestrator for `config`.
pub fn run_training(config: AppConfig, selection: ModelSelection, log: &LogHandle) -> Result<TrainingRun, AppError> {
    let trainer = Trainer::new(config, log);
    trainer.run(selection)
}

/// Score every record of `input` and pair each result with its customer id.
///
/// Records without an id are labelled by their 1-based position (`#3`).
pub fn score_file(scorer: &Scorer, input: &Path) -> Result<Vec<(String, PredictionResult)>, AppError> {
    let records = read_records(input)?;
    if records.is_empty() {
        return Err(AppError::io(input, "no records to score"));
    }
    let results = scorer.score_batch(&records)?;
    let id_col = &scorer.artifact().id_col;
    Ok(records
        .iter()
        .zip(results)
        .enumerate()
        .map(|(i, (record, result))| (record_id(record, id_col, i), result))
        .collect())
}

/// Generate a synthetic dataset and write it as CSV; returns the row count.
pub fn write_synthetic(rows: usize, seed: u64, out: &Path) -> Result<usize, AppError> {
    let records = generate_sample(&SampleConfig::new(rows, seed))?;
    write_records_csv(out, &TELCO_COLUMNS, &records)?;
    Ok(records.len())
}

fn record_id(record: &Record, id_col: &str, index: usize) -> String {
    record
        .get(id_col)
        .and_then(|v| v.category_key())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("#{}", index + 1))
}
