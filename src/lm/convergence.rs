//! Stopping rules for the Marquardt loop.
//!
//! The loop ends when λ blows up, when χ² reaches exactly zero, when an
//! accepted step no longer lowers χ² by more than the tolerance, or when the
//! iteration budget runs out. A rejected step never counts as convergence:
//! only λ changed, not the fit.

use serde::{Deserialize, Serialize};

use crate::lm::config::{FitConfig, MAX_LAMBDA};
use crate::lm::state::FitState;

/// How a fit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitStatus {
    /// The χ² decrease fell below the tolerance.
    Converged,

    /// χ² reached exactly zero; no error estimate is possible.
    PerfectFit,

    /// The iteration budget was used up.
    MaxIterationsReached,

    /// λ grew past its upper limit.
    LambdaExceeded,

    /// An interrupt asked the fit to stop.
    UserAborted,
}

impl FitStatus {
    /// Returns true if the fit reached a minimum.
    pub fn is_converged(&self) -> bool {
        matches!(self, FitStatus::Converged | FitStatus::PerfectFit)
    }

    /// Returns a description of the status.
    pub fn description(&self) -> &'static str {
        match self {
            FitStatus::Converged => "Fit converged",
            FitStatus::PerfectFit => "Fit converged to an exact solution (chisq = 0)",
            FitStatus::MaxIterationsReached => "Fit stopped: maximum number of iterations exceeded",
            FitStatus::LambdaExceeded => "Fit stopped: lambda exceeded its upper limit",
            FitStatus::UserAborted => "Fit stopped by user",
        }
    }
}

impl std::fmt::Display for FitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Tolerances and budget deciding when the loop stops.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopCriteria {
    /// Relative χ² decrease tolerance
    pub epsilon_rel: f64,

    /// Absolute χ² decrease tolerance
    pub epsilon_abs: f64,

    /// Maximum number of iterations, if any
    pub max_iterations: Option<usize>,
}

impl Default for StopCriteria {
    fn default() -> Self {
        Self::from_config(&FitConfig::default())
    }
}

impl StopCriteria {
    pub fn from_config(config: &FitConfig) -> Self {
        Self {
            epsilon_rel: config.epsilon_rel,
            epsilon_abs: config.epsilon_abs,
            max_iterations: config.max_iterations.filter(|&max| max > 0),
        }
    }

    /// The χ² decrease below which an accepted step counts as converged.
    pub fn limit(&self, chisq: f64) -> f64 {
        self.epsilon_rel * chisq + self.epsilon_abs
    }

    /// Decides after a step whether the loop stops, and why.
    pub fn check(&self, state: &FitState, accepted: bool) -> Option<FitStatus> {
        if state.lambda.map_or(false, |lambda| lambda >= MAX_LAMBDA) {
            return Some(FitStatus::LambdaExceeded);
        }
        if state.chisq == 0.0 {
            return Some(FitStatus::PerfectFit);
        }
        if accepted && state.last_chisq - state.chisq <= self.limit(state.chisq) {
            return Some(FitStatus::Converged);
        }
        match self.max_iterations {
            Some(max) if state.iterations >= max => Some(FitStatus::MaxIterationsReached),
            _ => None,
        }
    }
}
