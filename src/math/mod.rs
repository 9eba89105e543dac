//! Numeric helpers: logistic link functions and small dense solves.

pub mod link;
pub mod solve;

pub use link::*;
pub use solve::*;
