//! Utility functions and helpers for the lmcurve-rs library.

pub mod finite_difference;

pub use finite_difference::{parameter_step, variable_step, DELTA, NEARLY_ZERO};
