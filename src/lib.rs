//! # lmcurve-rs
//!
//! `lmcurve-rs` fits nonlinear models to measured data with the
//! Levenberg-Marquardt algorithm.
//!
//! The library provides:
//! - A Marquardt engine whose damped steps are solved by Givens QR
//! - Per-point weighting, including uncertainties on independent variables
//!   through the effective variance method
//! - Parameter prescaling for badly scaled problems
//! - Cooperative interruption with stop / continue / recovery choices
//! - Asymptotic standard errors, correlations and goodness-of-fit statistics
//!
//! ## Basic Usage
//!
//! ```
//! use lmcurve_rs::{DataSet, Fitter, ParameterVector, PointwiseModel};
//! use ndarray::array;
//!
//! let data = DataSet::from_xy(array![0.0, 1.0, 2.0, 3.0], array![1.0, 3.1, 4.9, 7.0]).unwrap();
//! let model = PointwiseModel::new(|p, x| p[0] * x[0] + p[1]);
//! let params = ParameterVector::from_pairs([("m", 1.0), ("c", 1.0)]).unwrap();
//!
//! let outcome = Fitter::new().fit(&model, &data, params).unwrap();
//! assert!(outcome.converged());
//! println!("{}", outcome.summary);
//! ```

pub mod data;
pub mod error;
pub mod linalg;
pub mod lm;
pub mod model;
pub mod parameters;
pub mod record;
pub mod report;
pub mod store;
pub mod uncertainty;
pub mod utils;

// Re-exports for convenience
pub use data::{DataSet, ErrorColumnMask};
pub use error::{FitError, Result, SolvePhase};
pub use lm::{
    AbortFlag, DiffMethod, FitConfig, FitHooks, FitOutcome, FitStatus, Fitter, FlagInterrupt,
    InterruptAction, InterruptSource,
};
pub use model::{FnModel, Model, PointwiseModel};
pub use parameters::{Parameter, ParameterVector};
pub use record::LastFitRecord;
pub use report::{IterationReport, LogReporter, Reporter, Verbosity};
pub use store::{ParameterStore, VariableStore};
pub use uncertainty::FitSummary;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
