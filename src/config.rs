//! Run configuration.
//!
//! Loaded from a TOML file (default `configs/config.toml`), then overridden by
//! environment variables (a `.env` file is honoured through `dotenvy`):
//!
//! - `CHURN_RAW_PATH` -> `data.raw_path`
//! - `CHURN_TARGET_COL` -> `data.target_col`
//! - `CHURN_ARTIFACT_DIR` -> `artifacts.dir`
//! - `CHURN_LOG_LEVEL` -> `logging.level`
//!
//! `data.raw_path` and `data.target_col` have no defaults; everything else does.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::domain::ValidationPolicy;
use crate::error::AppError;
use crate::models::{BaselineParams, ChallengerParams};

pub const DEFAULT_CONFIG_PATH: &str = "configs/config.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub data: DataConfig,
    #[serde(default)]
    pub feature_engineering: FeatureConfig,
    #[serde(default)]
    pub split: SplitConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub baseline: BaselineParams,
    #[serde(default)]
    pub challenger: ChallengerParams,
    #[serde(default)]
    pub artifacts: ArtifactConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    pub raw_path: PathBuf,
    pub target_col: String,
    #[serde(default = "default_id_col")]
    pub id_col: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureConfig {
    #[serde(default = "default_categorical_cols")]
    pub categorical_cols: Vec<String>,
    #[serde(default = "default_numerical_cols")]
    pub numerical_cols: Vec<String>,
    #[serde(default = "default_log_cols")]
    pub log_cols: Vec<String>,
    #[serde(default = "default_tenure_col")]
    pub tenure_col: String,
    #[serde(default = "default_charges_col")]
    pub charges_col: String,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            categorical_cols: default_categorical_cols(),
            numerical_cols: default_numerical_cols(),
            log_cols: default_log_cols(),
            tenure_col: default_tenure_col(),
            charges_col: default_charges_col(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SplitConfig {
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: default_test_fraction(),
            seed: default_seed(),
        }
    }
}

/// Schema-check policy per call site.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_training_policy")]
    pub training: ValidationPolicy,
    #[serde(default = "default_serving_policy")]
    pub serving: ValidationPolicy,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            training: default_training_policy(),
            serving: default_serving_policy(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactConfig {
    #[serde(default = "default_artifact_dir")]
    pub dir: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: default_artifact_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_file: None,
        }
    }
}

impl AppConfig {
    /// Load the TOML file, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        let text = std::fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("Failed to read config '{}': {e}", path.display())))?;
        let mut config = Self::from_toml_str(&text)
            .map_err(|e| AppError::config(format!("Config '{}': {}", path.display(), e.message())))?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration text without touching the environment.
    pub fn from_toml_str(text: &str) -> Result<Self, AppError> {
        toml::from_str(text).map_err(|e| AppError::config(format!("Invalid configuration: {e}")))
    }

    /// Config for an in-memory run over `raw_path` with every other key defaulted.
    pub fn with_defaults(raw_path: impl Into<PathBuf>, target_col: impl Into<String>) -> Self {
        Self {
            data: DataConfig {
                raw_path: raw_path.into(),
                target_col: target_col.into(),
                id_col: default_id_col(),
            },
            feature_engineering: FeatureConfig::default(),
            split: SplitConfig::default(),
            validation: ValidationConfig::default(),
            baseline: BaselineParams::default(),
            challenger: ChallengerParams::default(),
            artifacts: ArtifactConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("CHURN_RAW_PATH").filter(|v| !v.trim().is_empty()) {
            self.data.raw_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("CHURN_TARGET_COL").filter(|v| !v.trim().is_empty()) {
            self.data.target_col = v;
        }
        if let Some(v) = lookup("CHURN_ARTIFACT_DIR").filter(|v| !v.trim().is_empty()) {
            self.artifacts.dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("CHURN_LOG_LEVEL").filter(|v| !v.trim().is_empty()) {
            self.logging.level = v;
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.data.raw_path.as_os_str().is_empty() {
            return Err(AppError::config("Missing required key `data.raw_path`."));
        }
        if self.data.target_col.trim().is_empty() {
            return Err(AppError::config("Missing required key `data.target_col`."));
        }
        let fe = &self.feature_engineering;
        if fe.categorical_cols.is_empty() && fe.numerical_cols.is_empty() {
            return Err(AppError::config(
                "`feature_engineering.categorical_cols` and `numerical_cols` are both empty.",
            ));
        }
        if fe.categorical_cols.iter().chain(&fe.numerical_cols).any(|c| c == &self.data.target_col) {
            return Err(AppError::config(format!(
                "Label column `{}` must not be listed as a feature.",
                self.data.target_col
            )));
        }
        let f = self.split.test_fraction;
        if !(f.is_finite() && f > 0.0 && f < 1.0) {
            return Err(AppError::config(format!(
                "`split.test_fraction` must be in (0, 1), got {f}."
            )));
        }
        self.baseline.validate()?;
        self.challenger.validate()?;
        Ok(())
    }
}

fn default_id_col() -> String {
    "customerID".to_string()
}

fn default_categorical_cols() -> Vec<String> {
    [
        "gender",
        "Partner",
        "Dependents",
        "PhoneService",
        "MultipleLines",
        "InternetService",
        "OnlineSecurity",
        "OnlineBackup",
        "DeviceProtection",
        "TechSupport",
        "StreamingTV",
        "StreamingMovies",
        "Contract",
        "PaperlessBilling",
        "PaymentMethod",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_numerical_cols() -> Vec<String> {
    ["SeniorCitizen", "tenure", "MonthlyCharges", "TotalCharges"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_log_cols() -> Vec<String> {
    vec!["TotalCharges".to_string()]
}

fn default_tenure_col() -> String {
    "tenure".to_string()
}

fn default_charges_col() -> String {
    "TotalCharges".to_string()
}

fn default_test_fraction() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

fn default_training_policy() -> ValidationPolicy {
    ValidationPolicy::Advisory
}

fn default_serving_policy() -> ValidationPolicy {
    ValidationPolicy::Strict
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("artifacts/models")
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn minimal_config_fills_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [data]
            raw_path = "data/raw/telco.csv"
            target_col = "Churn"
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.data.id_col, "customerID");
        assert_eq!(config.split.seed, 42);
        assert_eq!(config.validation.training, ValidationPolicy::Advisory);
        assert_eq!(config.validation.serving, ValidationPolicy::Strict);
        assert!(config.feature_engineering.categorical_cols.contains(&"Contract".to_string()));
        assert_eq!(config.challenger.n_estimators, 100);
    }

    #[test]
    fn missing_target_col_is_invalid_configuration() {
        let err = AppConfig::from_toml_str(
            r#"
            [data]
            raw_path = "data/raw/telco.csv"
            "#,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
        assert!(err.message().contains("target_col"));
    }

    #[test]
    fn out_of_range_test_fraction_is_rejected() {
        let mut config = AppConfig::with_defaults("x.csv", "Churn");
        config.split.test_fraction = 1.0;
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut config = AppConfig::with_defaults("x.csv", "Churn");
        config.apply_overrides(|key| match key {
            "CHURN_RAW_PATH" => Some("other.csv".to_string()),
            "CHURN_LOG_LEVEL" => Some("debug".to_string()),
            _ => None,
        });
        assert_eq!(config.data.raw_path, PathBuf::from("other.csv"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.data.target_col, "Churn");
    }

    #[test]
    fn validation_policies_parse_from_toml() {
        let config = AppConfig::from_toml_str(
            r#"
            [data]
            raw_path = "a.csv"
            target_col = "Churn"

            [validation]
            training = "strict"
            serving = "advisory"
            "#,
        )
        .unwrap();
        assert_eq!(config.validation.training, ValidationPolicy::Strict);
        assert_eq!(config.validation.serving, ValidationPolicy::Advisory);
    }
}
