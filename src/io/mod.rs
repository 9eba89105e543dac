//! Input/output helpers.
//!
//! - CSV/JSON record ingest (`ingest`)
//! - prediction and record CSV exports (`export`)
//! - scoring artifact read/write (`artifact`)

pub mod artifact;
pub mod export;
pub mod ingest;

pub use artifact::*;
pub use export::*;
pub use ingest::*;
