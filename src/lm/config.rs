//! Configuration options for the Marquardt fit.
//!
//! All options are read once at the start of a fit. The defaults reproduce a
//! purely relative convergence test with an automatically chosen starting
//! damping factor.

use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};
use crate::utils::finite_difference::DELTA;

/// Smallest damping factor; λ is not reduced further once at or below it.
pub const MIN_LAMBDA: f64 = 1e-20;

/// Largest damping factor; reaching it stops the fit.
pub const MAX_LAMBDA: f64 = 1e20;

/// Default relative convergence limit.
pub const DEFAULT_EPSILON: f64 = 1e-5;

/// Default factor by which λ is raised or lowered.
pub const DEFAULT_LAMBDA_FACTOR: f64 = 10.0;

/// Method for differentiating the model numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DiffMethod {
    /// One extra evaluation per parameter
    #[default]
    Forward,

    /// Two extra evaluations per parameter, second-order accurate
    Central,
}

/// Configuration options for the Marquardt fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Relative convergence limit on the χ² decrease. Default: 1e-5
    pub epsilon_rel: f64,

    /// Absolute convergence limit on the χ² decrease. Default: 0
    pub epsilon_abs: f64,

    /// Starting damping factor. Default: computed from the Jacobian
    pub initial_lambda: Option<f64>,

    /// Factor by which to increase lambda after a rejected step. Default: 10.0
    pub lambda_up_factor: f64,

    /// Factor by which to divide lambda after an accepted step. Default: 10.0
    pub lambda_down_factor: f64,

    /// Maximum number of iterations. Default: unbounded
    pub max_iterations: Option<usize>,

    /// Scale parameter errors by the reduced χ². Default: true
    pub error_scaling: bool,

    /// Normalize parameters by their starting values. Default: true
    pub prescale: bool,

    /// Numerical differentiation scheme. Default: Forward
    pub diff_method: DiffMethod,

    /// Relative step for numerical derivatives. Default: 1e-3
    pub delta: f64,

    /// Write the covariance matrix back through the parameter store. Default: false
    pub covariance_variables: bool,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            epsilon_rel: DEFAULT_EPSILON,
            epsilon_abs: 0.0,
            initial_lambda: None,
            lambda_up_factor: DEFAULT_LAMBDA_FACTOR,
            lambda_down_factor: DEFAULT_LAMBDA_FACTOR,
            max_iterations: None,
            error_scaling: true,
            prescale: true,
            diff_method: DiffMethod::default(),
            delta: DELTA,
            covariance_variables: false,
        }
    }
}

impl FitConfig {
    /// Builds a configuration from the conventional user variables.
    ///
    /// Recognized names are `FIT_LIMIT`, `FIT_LIMIT_ABS`, `FIT_START_LAMBDA`,
    /// `FIT_LAMBDA_FACTOR` and `FIT_MAXITER`. Missing or non-positive values
    /// keep their defaults; `FIT_MAXITER = 0` means unbounded.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<f64>,
    {
        let positive = |name: &str| lookup(name).filter(|v| *v > 0.0);
        let mut config = Self::default();

        if let Some(limit) = positive("FIT_LIMIT") {
            if limit < 1.0 {
                config.epsilon_rel = limit;
            }
        }
        if let Some(limit) = positive("FIT_LIMIT_ABS") {
            config.epsilon_abs = limit;
        }
        if let Some(lambda) = positive("FIT_START_LAMBDA") {
            config.initial_lambda = Some(lambda);
        }
        if let Some(factor) = positive("FIT_LAMBDA_FACTOR") {
            config.lambda_up_factor = factor;
            config.lambda_down_factor = factor;
        }
        if let Some(maxiter) = positive("FIT_MAXITER") {
            config.max_iterations = Some(maxiter as usize);
        }

        config
    }

    /// Checks the configuration before a fit starts.
    pub fn validate(&self) -> Result<()> {
        if !(self.epsilon_rel >= 0.0) || !(self.epsilon_abs >= 0.0) {
            return Err(FitError::InvalidInput(format!(
                "Convergence limits must be non-negative (relative {}, absolute {})",
                self.epsilon_rel, self.epsilon_abs
            )));
        }
        if self.epsilon_rel == 0.0 && self.epsilon_abs == 0.0 {
            return Err(FitError::InvalidInput(
                "At least one convergence limit must be positive".to_string(),
            ));
        }
        if !(self.lambda_up_factor > 1.0) || !(self.lambda_down_factor > 1.0) {
            return Err(FitError::InvalidInput(format!(
                "Lambda factors must be greater than one (up {}, down {})",
                self.lambda_up_factor, self.lambda_down_factor
            )));
        }
        if let Some(lambda) = self.initial_lambda {
            if !(lambda > 0.0) || !lambda.is_finite() {
                return Err(FitError::InvalidInput(format!(
                    "Initial lambda must be positive and finite, got {}",
                    lambda
                )));
            }
        }
        if !(self.delta > 0.0) || self.delta >= 1.0 {
            return Err(FitError::InvalidInput(format!(
                "Differentiation step must lie in (0, 1), got {}",
                self.delta
            )));
        }
        Ok(())
    }
}
