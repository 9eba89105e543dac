//! `churn-risk` library crate.
//!
//! The binary (`churn`) is a thin wrapper around this library so that:
//!
//! - the training pipeline and the scorer are testable without spawning processes
//! - a serving shell can embed [`score::ScoringService`] directly
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod features;
pub mod io;
pub mod logging;
pub mod math;
pub mod models;
pub mod report;
pub mod score;
pub mod train;
