//! Command-line parsing for the churn risk pipeline.
//!
//! Argument parsing stays separate from command dispatch (`app`) and from the
//! training/scoring code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_PATH;
use crate::domain::ModelSelection;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "churn", version, about = "Customer churn risk: training pipeline and scorer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Clean, validate, split, fit features and models, evaluate, and write artifacts.
    Train(TrainArgs),
    /// Score customer records (CSV or JSON) with a saved artifact.
    Score(ScoreArgs),
    /// Show whether an artifact loads, and what it holds.
    Info(InfoArgs),
    /// Write a synthetic Telco-style customer CSV.
    Synth(SynthArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct TrainArgs {
    /// Configuration file (TOML).
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Which variant(s) to train.
    #[arg(short, long, value_enum, default_value_t = ModelSelection::All)]
    pub model: ModelSelection,

    /// Override `data.raw_path`.
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Override `artifacts.dir`.
    #[arg(long = "artifact-dir")]
    pub artifact_dir: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct ScoreArgs {
    /// Artifact produced by `churn train`.
    #[arg(short, long, default_value = "artifacts/models/best_model.json")]
    pub artifact: PathBuf,

    /// Records to score: CSV with a header row, or JSON (object or array of objects).
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Write `customer_id,churn_probability,risk_category` to this CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Log schema violations instead of rejecting the input.
    #[arg(long)]
    pub advisory: bool,

    /// Configuration file for logging settings; optional.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct InfoArgs {
    /// Artifact to inspect.
    #[arg(short, long, default_value = "artifacts/models/best_model.json")]
    pub artifact: PathBuf,

    /// Print the info surface as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser, Clone)]
pub struct SynthArgs {
    /// Number of customers to generate (duplicates are added on top).
    #[arg(short = 'n', long, default_value_t = 2000)]
    pub rows: usize,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Output CSV path.
    #[arg(short, long, default_value = "data/raw/telco_synthetic.csv")]
    pub out: PathBuf,
}
