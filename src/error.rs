//! Crate-wide error type.
//!
//! Every failure carries a coarse [`ErrorKind`] (which also decides the process
//! exit code of the `churn` binary) plus a message with enough context (file
//! path, column name, row counts) to diagnose the problem without re-running.

use std::path::Path;

/// Failure classes surfaced by the pipeline and the scoring service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Raw input file or artifact missing/unreadable/unwritable.
    InputIo,
    /// A record failed a declared domain constraint.
    SchemaViolation,
    /// Missing/invalid configuration key or label column.
    InvalidConfiguration,
    /// Scoring attempted before an artifact was successfully loaded.
    ModelNotLoaded,
    /// Unexpected failure while transforming or scoring a record.
    PredictionFailure,
}

impl ErrorKind {
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::InputIo => 2,
            ErrorKind::SchemaViolation => 3,
            ErrorKind::InvalidConfiguration => 4,
            ErrorKind::ModelNotLoaded => 5,
            ErrorKind::PredictionFailure => 6,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::InputIo => "input/io error",
            ErrorKind::SchemaViolation => "schema violation",
            ErrorKind::InvalidConfiguration => "invalid configuration",
            ErrorKind::ModelNotLoaded => "model not loaded",
            ErrorKind::PredictionFailure => "prediction failure",
        }
    }
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("{}: {message}", .kind.label())]
pub struct AppError {
    kind: ErrorKind,
    message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn io(path: &Path, message: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::InputIo, format!("'{}': {message}", path.display()))
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidConfiguration, message)
    }

    pub fn prediction(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PredictionFailure, message)
    }

    pub fn model_not_loaded(reason: &str) -> Self {
        Self::new(ErrorKind::ModelNotLoaded, format!("no scoring artifact available ({reason})"))
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn exit_code(&self) -> u8 {
        self.kind.exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_and_stable() {
        let kinds = [
            ErrorKind::InputIo,
            ErrorKind::SchemaViolation,
            ErrorKind::InvalidConfiguration,
            ErrorKind::ModelNotLoaded,
            ErrorKind::PredictionFailure,
        ];
        let codes: Vec<u8> = kinds.iter().map(|k| k.exit_code()).collect();
        assert_eq!(codes, vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn display_includes_kind_and_path() {
        let err = AppError::io(Path::new("data/raw.csv"), "No such file");
        let text = err.to_string();
        assert!(text.starts_with("input/io error"));
        assert!(text.contains("data/raw.csv"));
    }
}
