//! The Marquardt step engine.
//!
//! The engine owns the scratch buffers of one fit. It offers three
//! operations: [`initialize`](MarquardtEngine::initialize) evaluates the
//! starting point and picks λ, [`step`](MarquardtEngine::step) proposes and
//! accepts or rejects one damped Gauss-Newton step, and
//! [`release`](MarquardtEngine::release) frees the buffers.
//!
//! The damped step solves the augmented least-squares system
//!
//! ```text
//! [ C  ]        [ r ]
//! [ λI ] Δa ≈ - [ 0 ]
//! ```
//!
//! by Givens QR, where C is the Jacobian of the weighted residuals r.

use log::{debug, warn};
use ndarray::{s, Array1, Array2};

use crate::data::DataSet;
use crate::error::{FitError, Result, SolvePhase};
use crate::linalg::{allocate_matrix, allocate_vector, givens_rotate, givens_solve, sum_of_squares};
use crate::lm::config::{FitConfig, MIN_LAMBDA};
use crate::lm::evaluator::Evaluator;
use crate::lm::state::FitState;
use crate::model::Model;

/// Result of one Marquardt step.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Whether the trial point replaced the current one
    pub accepted: bool,

    /// χ² at the trial point
    pub trial_chisq: f64,

    /// Normalized parameters of the trial point
    pub trial_params: Array1<f64>,
}

struct StepBuffers {
    /// Weighted Jacobian at the current point; the bottom `num_params` rows stay zero
    jacobian: Array2<f64>,
    /// Weighted residuals at the current point, zero padded
    residuals: Array1<f64>,
    work_jacobian: Array2<f64>,
    work_residuals: Array1<f64>,
    step: Array1<f64>,
}

impl StepBuffers {
    fn allocate(num_data: usize, num_params: usize) -> Result<Self> {
        let rows = num_data + num_params;
        Ok(Self {
            jacobian: allocate_matrix(rows, num_params)?,
            residuals: allocate_vector(rows)?,
            work_jacobian: allocate_matrix(rows, num_params)?,
            work_residuals: allocate_vector(rows)?,
            step: allocate_vector(num_params)?,
        })
    }

    fn store(&mut self, residuals: &Array1<f64>, jacobian: &Array2<f64>) {
        let n = residuals.len();
        self.residuals.slice_mut(s![..n]).assign(residuals);
        self.jacobian.slice_mut(s![..n, ..]).assign(jacobian);
    }
}

/// Schwarz's estimate of the curvature scale, `sqrt(Σ C_ij² / (n p))`.
pub fn initial_lambda(jacobian: &Array2<f64>, num_data: usize, num_params: usize) -> f64 {
    let top = jacobian.slice(s![..num_data, ..]);
    (sum_of_squares(top.iter()) / (num_data * num_params) as f64).sqrt()
}

/// Indices of the Jacobian columns whose top `num_data` entries are all exactly zero.
///
/// A parameter with such a column cannot move: the damped step leaves it unchanged.
pub fn zero_columns(jacobian: &Array2<f64>, num_data: usize) -> Vec<usize> {
    let top = jacobian.slice(s![..num_data, ..]);
    top.columns()
        .into_iter()
        .enumerate()
        .filter(|(_, column)| column.iter().all(|&v| v == 0.0))
        .map(|(j, _)| j)
        .collect()
}

/// Proposes, evaluates and accepts or rejects damped steps.
pub struct MarquardtEngine<'a, M: Model> {
    evaluator: Evaluator<'a, M>,
    num_data: usize,
    initial_lambda: Option<f64>,
    lambda_up_factor: f64,
    lambda_down_factor: f64,
    buffers: Option<StepBuffers>,
}

impl<'a, M: Model> MarquardtEngine<'a, M> {
    /// Creates an engine for parameters normalized by `scale`.
    pub fn new(model: &'a M, data: &'a DataSet, config: &FitConfig, scale: Array1<f64>) -> Self {
        Self {
            evaluator: Evaluator::new(model, data, config, scale),
            num_data: data.num_data(),
            initial_lambda: config.initial_lambda,
            lambda_up_factor: config.lambda_up_factor,
            lambda_down_factor: config.lambda_down_factor,
            buffers: None,
        }
    }

    /// Number of model evaluations so far.
    pub fn evaluations(&self) -> usize {
        self.evaluator.evaluations()
    }

    pub fn is_initialized(&self) -> bool {
        self.buffers.is_some()
    }

    /// Allocates the buffers, evaluates the starting point and sets λ.
    pub fn initialize(&mut self, state: &mut FitState) -> Result<()> {
        let num_params = state.params.len();
        let mut buffers = StepBuffers::allocate(self.num_data, num_params)?;

        let a = state.params.normalized().clone();
        let evaluation = self.evaluator.evaluate(&a)?;
        let jacobian = self.evaluator.weighted_jacobian(&a, &evaluation)?;
        buffers.store(&evaluation.residuals, &jacobian);

        let lambda = match self.initial_lambda {
            Some(lambda) => lambda,
            None => {
                let lambda = initial_lambda(&buffers.jacobian, self.num_data, num_params);
                if lambda > 0.0 && lambda.is_finite() {
                    lambda
                } else {
                    warn!("Jacobian at the starting point vanishes; starting with lambda = 1");
                    1.0
                }
            }
        };
        for j in zero_columns(&buffers.jacobian, self.num_data) {
            warn!(
                "Zero derivative for parameter '{}' at {:e}; the fit cannot move it",
                state.params.names()[j],
                state.params.value(j)
            );
        }
        debug!("initial chisq = {:e}, lambda = {:e}", evaluation.chisq, lambda);

        state.chisq = evaluation.chisq;
        state.last_chisq = evaluation.chisq;
        state.lambda = Some(lambda);
        self.buffers = Some(buffers);
        Ok(())
    }

    /// Performs one damped step.
    ///
    /// A trial point with `χ² <= χ²_current` is accepted and λ is divided by the
    /// down factor (unless already at its floor). Otherwise the current point is
    /// kept and λ is multiplied by the up factor.
    pub fn step(&mut self, state: &mut FitState) -> Result<StepOutcome> {
        let not_ready =
            || FitError::InvalidInput("Marquardt engine used before initialization".to_string());
        let lambda = state.lambda.ok_or_else(not_ready)?;
        let buffers = self.buffers.as_mut().ok_or_else(not_ready)?;
        let num_params = state.params.len();

        buffers.work_jacobian.assign(&buffers.jacobian);
        buffers.work_residuals.assign(&buffers.residuals);
        for j in 0..num_params {
            buffers.work_jacobian[[self.num_data + j, j]] = lambda;
        }

        givens_solve(
            &mut buffers.work_jacobian,
            &mut buffers.work_residuals,
            &mut buffers.step,
        )?;

        let trial = state.params.normalized() + &buffers.step;
        let evaluation = self.evaluator.evaluate(&trial)?;

        let accepted = evaluation.chisq <= state.chisq;
        if accepted {
            let jacobian = self.evaluator.weighted_jacobian(&trial, &evaluation)?;
            buffers.store(&evaluation.residuals, &jacobian);
            state.params.set_normalized(trial.clone())?;
            state.chisq = evaluation.chisq;
            if lambda > MIN_LAMBDA {
                state.lambda = Some(lambda / self.lambda_down_factor);
            }
        } else {
            debug!(
                "rejected trial chisq = {:e} (current {:e}), raising lambda",
                evaluation.chisq, state.chisq
            );
            state.lambda = Some(lambda * self.lambda_up_factor);
        }
        state.last_accepted = accepted;

        Ok(StepOutcome {
            accepted,
            trial_chisq: evaluation.chisq,
            trial_params: trial,
        })
    }

    /// Upper triangular factor R of the undamped Jacobian at the current point.
    ///
    /// Returns a `num_params x num_params` matrix.
    pub fn covariance_factor(&self) -> Result<Array2<f64>> {
        let buffers = self.buffers.as_ref().ok_or_else(|| {
            FitError::InvalidInput("No Jacobian available for the covariance".to_string())
        })?;
        let num_params = buffers.step.len();

        let mut c = buffers.jacobian.slice(s![..self.num_data, ..]).to_owned();
        givens_rotate(&mut c, None).map_err(|err| match err {
            FitError::SingularMatrix { .. } => FitError::SingularMatrix {
                phase: SolvePhase::Covariance,
            },
            err => err,
        })?;

        Ok(c.slice(s![..num_params, ..]).to_owned())
    }

    /// Frees the scratch buffers. Safe to call more than once.
    pub fn release(&mut self) {
        if self.buffers.take().is_some() {
            debug!("released Marquardt buffers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lm::config::MAX_LAMBDA;
    use crate::model::PointwiseModel;
    use crate::parameters::ParameterVector;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn line_fixture() -> DataSet {
        DataSet::from_xy(array![0.0, 1.0, 2.0, 3.0], array![1.0, 3.0, 5.0, 7.0]).unwrap()
    }

    #[test]
    fn test_initialize_uses_schwarz_lambda() {
        let data = line_fixture();
        let model = PointwiseModel::new(|p, x| p[0] * x[0] + p[1]);
        let config = FitConfig::default();
        let params = ParameterVector::from_pairs([("a", 1.0), ("b", 1.0)]).unwrap();
        let mut state = FitState::new(params);
        let mut engine = MarquardtEngine::new(&model, &data, &config, array![1.0, 1.0]);

        engine.initialize(&mut state).unwrap();

        // C = [x, 1]: Σ C² = (0 + 1 + 4 + 9) + 4 = 18, n p = 8
        assert_relative_eq!(state.lambda.unwrap(), (18.0f64 / 8.0).sqrt(), epsilon = 1e-6);
        assert_eq!(state.chisq, 14.0);
        assert!(engine.is_initialized());
    }

    #[test]
    fn test_step_before_initialize_fails() {
        let data = line_fixture();
        let model = PointwiseModel::new(|p, x| p[0] * x[0]);
        let config = FitConfig::default();
        let params = ParameterVector::from_pairs([("a", 1.0)]).unwrap();
        let mut state = FitState::new(params);
        let mut engine = MarquardtEngine::new(&model, &data, &config, array![1.0]);

        assert!(engine.step(&mut state).is_err());
    }

    #[test]
    fn test_accepted_step_lowers_lambda() {
        let data = line_fixture();
        let model = PointwiseModel::new(|p, x| p[0] * x[0] + p[1]);
        let config = FitConfig {
            initial_lambda: Some(1e-3),
            ..FitConfig::default()
        };
        let params = ParameterVector::from_pairs([("a", 1.0), ("b", 1.0)]).unwrap();
        let mut state = FitState::new(params);
        let mut engine = MarquardtEngine::new(&model, &data, &config, array![1.0, 1.0]);
        engine.initialize(&mut state).unwrap();

        let outcome = engine.step(&mut state).unwrap();

        assert!(outcome.accepted);
        assert!(state.chisq < 14.0);
        assert_relative_eq!(state.lambda.unwrap(), 1e-4, epsilon = 1e-18);
        // A nearly undamped step on a linear model lands on the solution
        assert_relative_eq!(state.params.value(0), 2.0, epsilon = 1e-4);
        assert_relative_eq!(state.params.value(1), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_rejected_step_keeps_point_and_raises_lambda() {
        let data = line_fixture();
        // From k = -1 an undamped step overshoots to k ~ 13
        let model = PointwiseModel::new(|p, x| (p[0] * x[0]).exp());
        let config = FitConfig {
            initial_lambda: Some(1e-12),
            ..FitConfig::default()
        };
        let params = ParameterVector::from_pairs([("k", -1.0)]).unwrap();
        let mut state = FitState::new(params);
        let mut engine = MarquardtEngine::new(&model, &data, &config, array![1.0]);
        engine.initialize(&mut state).unwrap();
        let chisq = state.chisq;
        let before = state.params.normalized().clone();

        let outcome = engine.step(&mut state).unwrap();

        assert!(!outcome.accepted);
        assert!(!state.last_accepted);
        assert!(outcome.trial_chisq > chisq);
        assert!(outcome.trial_params[0] > 10.0);
        assert_eq!(state.params.normalized(), &before);
        assert_eq!(state.chisq, chisq);
        assert_relative_eq!(state.lambda.unwrap(), 1e-11, max_relative = 1e-12);
        assert!(state.lambda.unwrap() < MAX_LAMBDA);
    }

    #[test]
    fn test_zero_columns() {
        let jacobian = array![[1.0, 0.0, 0.0], [2.0, 0.0, 3.0], [0.0, 0.0, 0.0], [0.0, 5.0, 0.0]];
        // the bottom row is damping scratch and is ignored
        assert_eq!(zero_columns(&jacobian, 3), vec![1]);
        assert!(zero_columns(&array![[1.0], [2.0]], 2).is_empty());
    }

    #[test]
    fn test_parameter_starting_at_zero_is_frozen() {
        let data = line_fixture();
        // The 1e-33 step on a zero offset vanishes next to predictions of order one
        let model = PointwiseModel::new(|p, x| p[0] * (x[0] + 1.0) + p[1]);
        let config = FitConfig::default();
        let params = ParameterVector::from_pairs([("m", 1.0), ("c", 0.0)]).unwrap();
        let mut state = FitState::new(params);
        let mut engine = MarquardtEngine::new(&model, &data, &config, array![1.0, 1.0]);
        engine.initialize(&mut state).unwrap();

        let jacobian = engine.buffers.as_ref().unwrap().jacobian.clone();
        assert_eq!(zero_columns(&jacobian, 4), vec![1]);

        engine.step(&mut state).unwrap();
        assert_eq!(state.params.value(1), 0.0);
    }

    #[test]
    fn test_release_is_idempotent() {
        let data = line_fixture();
        let model = PointwiseModel::new(|p, x| p[0] * x[0] + p[1]);
        let config = FitConfig::default();
        let params = ParameterVector::from_pairs([("a", 1.0), ("b", 1.0)]).unwrap();
        let mut state = FitState::new(params);
        let mut engine = MarquardtEngine::new(&model, &data, &config, array![1.0, 1.0]);
        engine.initialize(&mut state).unwrap();

        engine.release();
        engine.release();
        assert!(!engine.is_initialized());
        assert!(engine.covariance_factor().is_err());
    }

    #[test]
    fn test_covariance_factor_is_upper_triangular() {
        let data = line_fixture();
        let model = PointwiseModel::new(|p, x| p[0] * x[0] + p[1]);
        let config = FitConfig::default();
        let params = ParameterVector::from_pairs([("a", 2.0), ("b", 1.0)]).unwrap();
        let mut state = FitState::new(params);
        let mut engine = MarquardtEngine::new(&model, &data, &config, array![1.0, 1.0]);
        engine.initialize(&mut state).unwrap();

        let r = engine.covariance_factor().unwrap();
        assert_eq!(r.shape(), &[2, 2]);
        assert_eq!(r[[1, 0]], 0.0);
        // RᵗR reproduces CᵗC: (CᵗC)_00 = Σ x² = 14
        assert_relative_eq!(r[[0, 0]] * r[[0, 0]], 14.0, epsilon = 1e-6);
    }
}
