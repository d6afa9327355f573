//! The regression driver.
//!
//! [`Fitter`] validates the inputs, runs the Marquardt loop until one of the
//! stopping rules fires, and then finalizes: covariance and standard errors,
//! write-back through the [`ParameterStore`], and the summary for the
//! [`Reporter`].

use log::{debug, warn};
use ndarray::Array2;

use crate::data::DataSet;
use crate::error::{FitError, Result};
use crate::model::Model;
use crate::parameters::ParameterVector;
use crate::record::LastFitRecord;
use crate::report::{IterationReport, NullReporter, Reporter};
use crate::store::{statistic, NullStore, ParameterStore};
use crate::uncertainty::{ErrorEstimate, FitSummary, UncertaintyCalculator};

use super::config::{DiffMethod, FitConfig};
use super::convergence::{FitStatus, StopCriteria};
use super::interrupt::{InterruptAction, InterruptGuard, InterruptSource, NoInterrupt};
use super::state::FitState;
use super::step::{MarquardtEngine, StepOutcome};

/// External collaborators of a fit.
pub struct FitHooks<'h> {
    /// Receives progress lines and the final summary
    pub reporter: &'h mut dyn Reporter,

    /// Polled for abort requests at the top of every loop pass
    pub interrupt: &'h mut dyn InterruptSource,

    /// Receives the final values, errors and statistics
    pub store: &'h mut dyn ParameterStore,
}

/// Result of a completed fit.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    /// Final report
    pub summary: FitSummary,

    /// Final parameters, unscaled
    pub params: ParameterVector,

    /// Covariance matrix in physical units, when available
    pub covariance: Option<Array2<f64>>,

    /// Record for continuing this fit later
    pub record: LastFitRecord,

    /// Number of model evaluations
    pub func_evals: usize,
}

impl FitOutcome {
    pub fn status(&self) -> FitStatus {
        self.summary.status
    }

    pub fn converged(&self) -> bool {
        self.summary.status.is_converged()
    }

    pub fn chisq(&self) -> f64 {
        self.summary.chisq()
    }

    pub fn iterations(&self) -> usize {
        self.summary.iterations
    }

    /// Final physical value of the parameter called `name`.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.params.get(name)
    }

    /// Standard error of the parameter called `name`, when errors are available.
    pub fn error(&self, name: &str) -> Option<f64> {
        let i = self.params.index_of(name)?;
        self.summary.errors.as_ref().map(|errors| errors[i])
    }
}

/// The Levenberg-Marquardt curve fitter.
#[derive(Debug, Clone, Default)]
pub struct Fitter {
    /// Configuration options
    config: FitConfig,
}

impl Fitter {
    /// Create a new fitter with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new fitter with the given configuration.
    pub fn with_config(config: FitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    /// Set the relative convergence limit.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.config.epsilon_rel = epsilon;
        self
    }

    /// Set the absolute convergence limit.
    pub fn with_epsilon_abs(mut self, epsilon: f64) -> Self {
        self.config.epsilon_abs = epsilon;
        self
    }

    /// Set the maximum number of iterations. Zero means unbounded, as with `FIT_MAXITER`.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = Some(max_iterations).filter(|&max| max > 0);
        self
    }

    /// Set the initial value for the damping parameter.
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.config.initial_lambda = Some(lambda);
        self
    }

    /// Set the factor by which lambda is raised and lowered.
    pub fn with_lambda_factor(mut self, factor: f64) -> Self {
        self.config.lambda_up_factor = factor;
        self.config.lambda_down_factor = factor;
        self
    }

    pub fn with_error_scaling(mut self, error_scaling: bool) -> Self {
        self.config.error_scaling = error_scaling;
        self
    }

    pub fn with_prescale(mut self, prescale: bool) -> Self {
        self.config.prescale = prescale;
        self
    }

    /// Set the method used for numerical derivatives.
    pub fn with_differentiation_method(mut self, method: DiffMethod) -> Self {
        self.config.diff_method = method;
        self
    }

    pub fn with_covariance_variables(mut self, enabled: bool) -> Self {
        self.config.covariance_variables = enabled;
        self
    }

    /// Fit `model` to `data` starting from `params`, without external hooks.
    pub fn fit<M: Model>(
        &self,
        model: &M,
        data: &DataSet,
        params: ParameterVector,
    ) -> Result<FitOutcome> {
        self.fit_with(
            model,
            data,
            params,
            FitHooks {
                reporter: &mut NullReporter,
                interrupt: &mut NoInterrupt,
                store: &mut NullStore,
            },
        )
    }

    /// Fit `model` to `data` starting from `params`.
    ///
    /// Fatal conditions (bad input, zero errors, singular step, undefined model
    /// values) are returned as errors; steps that failed are wrapped in
    /// [`FitError::FitFailed`]. All other endings, including a user abort,
    /// produce a [`FitOutcome`] whose status tells them apart.
    pub fn fit_with<M: Model>(
        &self,
        model: &M,
        data: &DataSet,
        params: ParameterVector,
        hooks: FitHooks<'_>,
    ) -> Result<FitOutcome> {
        let FitHooks {
            reporter,
            interrupt,
            store,
        } = hooks;

        self.config.validate()?;
        store.set_converged(false);
        self.check_sizes(data, &params)?;
        data.check_errors()?;

        let mut params = params;
        if self.config.prescale {
            params.prescale();
        } else {
            params.unscale();
        }

        let mut guard = InterruptGuard::new(interrupt);
        let mut engine = MarquardtEngine::new(model, data, &self.config, params.scale().clone());
        let mut state = FitState::new(params);
        reporter.on_start(state.params.names());

        let status = match self.iterate(&mut engine, &mut state, reporter, guard.source()) {
            Ok(status) => status,
            Err(err) => {
                engine.release();
                return Err(err);
            }
        };
        debug!(
            "{} after {} iterations ({} model evaluations)",
            status,
            state.iterations,
            engine.evaluations()
        );

        let calculator = UncertaintyCalculator::new(
            data.num_data(),
            state.params.len(),
            state.chisq,
            self.config.error_scaling,
            data.unit_weights(),
        );
        let estimate = self.estimate_errors(&engine, &state, &calculator, status);
        let func_evals = engine.evaluations();
        engine.release();
        drop(guard);

        let (estimate, covariance_valid) = match estimate {
            Ok(estimate) => (estimate, true),
            Err(FitError::SingularMatrix { phase }) => {
                warn!("Singular matrix in {}; parameter errors are unavailable", phase);
                (None, false)
            }
            Err(err) => return Err(err),
        };

        self.write_back(store, &state, &calculator, estimate.as_ref(), status);

        let summary = FitSummary {
            status,
            iterations: state.iterations,
            relative_change: state.relative_change(),
            statistics: calculator.statistics,
            parameters: state.params.to_parameters(),
            errors: estimate.as_ref().map(|e| e.standard_errors.to_vec()),
            correlation: estimate.as_ref().map(|e| {
                e.correlation
                    .outer_iter()
                    .map(|row| row.to_vec())
                    .collect()
            }),
            covariance_valid,
            errors_scaled: calculator.scale_errors,
        };
        summary.log_warnings();
        reporter.on_finish(&summary);

        let record = LastFitRecord {
            parameters: summary.parameters.clone(),
            errors: summary.errors.clone(),
            chisq: state.chisq,
            ndf: calculator.statistics.ndf,
            iterations: state.iterations,
            status,
            config: self.config.clone(),
        };

        let mut params = state.params;
        params.unscale();

        Ok(FitOutcome {
            summary,
            params,
            covariance: estimate.map(|e| e.covariance),
            record,
            func_evals,
        })
    }

    fn check_sizes(&self, data: &DataSet, params: &ParameterVector) -> Result<()> {
        if params.is_empty() {
            return Err(FitError::InvalidInput("No parameters to fit".to_string()));
        }
        if data.num_data() == 0 {
            return Err(FitError::InvalidInput("No data points to fit".to_string()));
        }
        if data.num_data() < params.len() {
            return Err(FitError::TooFewDataPoints {
                data: data.num_data(),
                params: params.len(),
            });
        }
        Ok(())
    }

    /// Runs the Marquardt loop and returns how it ended.
    fn iterate<M: Model>(
        &self,
        engine: &mut MarquardtEngine<'_, M>,
        state: &mut FitState,
        reporter: &mut dyn Reporter,
        interrupt: &mut dyn InterruptSource,
    ) -> Result<FitStatus> {
        let criteria = StopCriteria::from_config(&self.config);
        engine
            .initialize(state)
            .map_err(|err| err.during_iteration(0))?;

        loop {
            if interrupt.is_requested() {
                let report = current_report(state, &criteria);
                reporter.on_interrupt(&report);
                let action = interrupt.resolve(&report);
                interrupt.clear();
                match action {
                    InterruptAction::Stop => return Ok(FitStatus::UserAborted),
                    InterruptAction::Continue => debug!("interrupt ignored, continuing"),
                    InterruptAction::RunRecovery => interrupt.run_recovery()?,
                }
            }

            state.begin_pass();
            let outcome = engine
                .step(state)
                .map_err(|err| err.during_iteration(state.iterations))?;

            let report = step_report(state, &criteria, &outcome);
            reporter.on_iteration(&report);

            if let Some(status) = criteria.check(state, outcome.accepted) {
                return Ok(status);
            }
        }
    }

    fn estimate_errors<M: Model>(
        &self,
        engine: &MarquardtEngine<'_, M>,
        state: &FitState,
        calculator: &UncertaintyCalculator,
        status: FitStatus,
    ) -> Result<Option<ErrorEstimate>> {
        if status == FitStatus::UserAborted || !calculator.errors_defined() {
            return Ok(None);
        }
        let r = engine.covariance_factor()?;
        calculator.estimate(&r, state.params.scale()).map(Some)
    }

    fn write_back(
        &self,
        store: &mut dyn ParameterStore,
        state: &FitState,
        calculator: &UncertaintyCalculator,
        estimate: Option<&ErrorEstimate>,
        status: FitStatus,
    ) {
        let names = state.params.names();
        for (i, name) in names.iter().enumerate() {
            store.set_value(name, state.params.value(i));
        }

        if let Some(estimate) = estimate {
            for (name, &error) in names.iter().zip(estimate.standard_errors.iter()) {
                store.set_error(name, error);
            }
            if self.config.covariance_variables {
                for i in 0..names.len() {
                    for j in 0..=i {
                        store.set_covariance(&names[i], &names[j], estimate.covariance[[i, j]]);
                    }
                }
            }
        }

        let stats = &calculator.statistics;
        store.set_statistic(statistic::NDF, stats.ndf as f64);
        store.set_statistic(statistic::WSSR, stats.chisq);
        if let Some(rms) = stats.rms {
            store.set_statistic(statistic::STDFIT, rms);
        }
        if let Some(p) = stats.p_value {
            store.set_statistic(statistic::P, p);
        }
        store.set_statistic(statistic::NITER, state.iterations as f64);
        store.set_converged(status.is_converged());
    }
}

fn current_report(state: &FitState, criteria: &StopCriteria) -> IterationReport {
    IterationReport {
        iteration: state.iterations,
        chisq: state.chisq,
        delta_chisq: state.delta_chisq(),
        limit: criteria.limit(state.chisq),
        lambda: state.lambda.unwrap_or(0.0),
        params: state.params.physical().to_vec(),
        accepted: state.last_accepted,
    }
}

fn step_report(
    state: &FitState,
    criteria: &StopCriteria,
    outcome: &StepOutcome,
) -> IterationReport {
    if outcome.accepted {
        return current_report(state, criteria);
    }
    IterationReport {
        iteration: state.iterations,
        chisq: outcome.trial_chisq,
        delta_chisq: outcome.trial_chisq - state.chisq,
        limit: criteria.limit(state.chisq),
        lambda: state.lambda.unwrap_or(0.0),
        params: state.params.to_physical(&outcome.trial_params).to_vec(),
        accepted: false,
    }
}
