//! Levenberg-Marquardt curve fitting.
//!
//! The pieces, leaf to root: [`weighting`] folds measurement uncertainties into
//! effective per-point errors, [`evaluator`] turns model predictions into
//! weighted residuals and Jacobians, [`step`] performs damped steps, and
//! [`algorithm`] drives the loop and finalizes the fit.

pub mod algorithm;
pub mod config;
pub mod convergence;
pub mod evaluator;
pub mod interrupt;
pub mod state;
pub mod step;
pub mod weighting;

// Re-export key types
pub use algorithm::{FitHooks, FitOutcome, Fitter};
pub use config::{DiffMethod, FitConfig, MAX_LAMBDA, MIN_LAMBDA};
pub use convergence::{FitStatus, StopCriteria};
pub use evaluator::{Evaluation, Evaluator};
pub use interrupt::{
    AbortFlag, FlagInterrupt, InterruptAction, InterruptGuard, InterruptSource, NoInterrupt,
};
pub use state::FitState;
pub use step::{MarquardtEngine, StepOutcome};
pub use weighting::ErrorModel;
