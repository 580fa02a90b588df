//! Runtime configuration shared across Flatland crates.
//!
//! Two concerns live here: deterministic execution (seed derivation for every
//! random draw the estimator performs) and tracing initialisation.

pub mod determinism;
pub mod tracing;
