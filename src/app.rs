//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - loads configuration and installs logging
//! - runs training or scoring
//! - prints reports and writes optional exports

use std::path::Path;

use clap::Parser;

use crate::cli::{Command, InfoArgs, ScoreArgs, SynthArgs, TrainArgs};
use crate::config::{AppConfig, LoggingConfig};
use crate::domain::ValidationPolicy;
use crate::error::{AppError, ErrorKind};
use crate::logging::{self, LogHandle};
use crate::score::ScoringService;

pub mod pipeline;

/// Entry point for the `churn` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Train(args) => handle_train(args),
        Command::Score(args) => handle_score(args),
        Command::Info(args) => handle_info(args),
        Command::Synth(args) => handle_synth(args),
    }
}

fn handle_train(args: TrainArgs) -> Result<(), AppError> {
    let config = train_config_from_args(&args)?;
    let log = init_logging(&config.logging)?;
    let run = pipeline::run_training(config, args.model, &log)?;
    println!("{}", crate::report::format_run_summary(&run));
    Ok(())
}

fn handle_score(args: ScoreArgs) -> Result<(), AppError> {
    let (logging, configured_policy) = match &args.config {
        Some(path) => {
            let config = AppConfig::load(path)?;
            (config.logging, config.validation.serving)
        }
        None => (LoggingConfig::default(), ValidationPolicy::Strict),
    };
    let policy = if args.advisory {
        ValidationPolicy::Advisory
    } else {
        configured_policy
    };
    let log = init_logging(&logging)?;

    let service = ScoringService::start(&args.artifact, policy, log.component("scorer"));
    let rows = pipeline::score_file(service.scorer()?, &args.input)?;
    println!("{}", crate::report::format_predictions(&rows));

    if let Some(path) = &args.export {
        crate::io::write_predictions_csv(path, &rows)?;
        tracing::info!("Wrote {} prediction(s) to {}", rows.len(), path.display());
    }
    Ok(())
}

fn handle_info(args: InfoArgs) -> Result<(), AppError> {
    let log = init_logging(&LoggingConfig {
        level: "warn".to_string(),
        log_file: None,
    })?;
    let service = ScoringService::start(&args.artifact, ValidationPolicy::Strict, log.component("scorer"));
    let info = service.info();
    if args.json {
        let text = serde_json::to_string_pretty(&info)
            .map_err(|e| AppError::prediction(format!("failed to encode info: {e}")))?;
        println!("{text}");
    } else {
        print!("{}", crate::report::format_info(&info));
    }
    if info.ready {
        Ok(())
    } else {
        service.scorer().map(|_| ())
    }
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    let _log = init_logging(&LoggingConfig::default())?;
    let n = pipeline::write_synthetic(args.rows, args.seed, &args.out)?;
    println!("Wrote {n} row(s) to {}", args.out.display());
    Ok(())
}

/// Load the config file and apply command-line overrides on top of it.
pub fn train_config_from_args(args: &TrainArgs) -> Result<AppConfig, AppError> {
    let mut config = load_config_or_defaults(&args.config, args.data.as_deref())?;
    if let Some(path) = &args.data {
        config.data.raw_path = path.clone();
    }
    if let Some(dir) = &args.artifact_dir {
        config.artifacts.dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

/// A missing config file is only tolerated when `--data` names the input, in
/// which case the documented defaults (label `Churn`) apply.
fn load_config_or_defaults(path: &Path, data: Option<&Path>) -> Result<AppConfig, AppError> {
    match (path.exists(), data) {
        (false, Some(raw)) => {
            let mut config = AppConfig::with_defaults(raw, "Churn");
            config.apply_overrides(|key| std::env::var(key).ok());
            Ok(config)
        }
        _ => AppConfig::load(path),
    }
}

fn init_logging(config: &LoggingConfig) -> Result<LogHandle, AppError> {
    logging::init(config).map_err(|e| AppError::new(ErrorKind::InputIo, e.to_string()))
}
