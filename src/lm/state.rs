//! Mutable state of one fit invocation.

use crate::parameters::ParameterVector;

/// State of a fit in progress.
///
/// Created by the driver when a fit starts, updated by the Marquardt engine on
/// every step and consumed when the fit is finalized.
#[derive(Debug, Clone)]
pub struct FitState {
    /// Current parameters (normalized values and scales)
    pub params: ParameterVector,

    /// Damping factor; `None` until the engine is initialized
    pub lambda: Option<f64>,

    /// χ² at the current parameters
    pub chisq: f64,

    /// χ² at the start of the current iteration
    pub last_chisq: f64,

    /// Number of iterations begun after an accepted step
    pub iterations: usize,

    /// Whether the most recent step was accepted
    pub last_accepted: bool,
}

impl FitState {
    pub fn new(params: ParameterVector) -> Self {
        Self {
            params,
            lambda: None,
            chisq: f64::INFINITY,
            last_chisq: f64::INFINITY,
            iterations: 0,
            // the initial evaluation counts as an accepted point
            last_accepted: true,
        }
    }

    /// Starts a loop pass: a new iteration begins only after an accepted step.
    pub fn begin_pass(&mut self) {
        if self.last_accepted {
            self.iterations += 1;
            self.last_chisq = self.chisq;
        }
    }

    /// χ² change since the start of the current iteration (negative when improving).
    pub fn delta_chisq(&self) -> f64 {
        if self.last_chisq.is_finite() {
            self.chisq - self.last_chisq
        } else {
            0.0
        }
    }

    /// Relative χ² change during the last iteration.
    pub fn relative_change(&self) -> f64 {
        if self.chisq > 0.0 {
            self.delta_chisq() / self.chisq
        } else {
            0.0
        }
    }
}
