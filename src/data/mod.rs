//! Record-level data stages: cleaning, schema validation, splitting, and the
//! synthetic sample generator used for demos and end-to-end tests.

pub mod clean;
pub mod sample;
pub mod split;
pub mod validate;

pub use clean::{CleanOutcome, Cleaner, CleaningPolicy};
pub use sample::{SampleConfig, TELCO_COLUMNS, generate_sample};
pub use split::{Split, StratifiedSplitter, class_distribution};
pub use validate::{FieldKind, FieldSpec, Schema, SchemaViolation, TelcoColumns, Validator, Violation};
