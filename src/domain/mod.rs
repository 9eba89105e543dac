//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the loosely-typed record model (`Value`, `Record`) shared by ingest,
//!   cleaning, validation, feature transforms and scoring requests
//! - run selection enums (`ModelVariant`, `ModelSelection`, `ValidationPolicy`)
//! - scoring outputs (`PredictionResult`, `RiskCategory`)

pub mod types;

pub use types::*;
