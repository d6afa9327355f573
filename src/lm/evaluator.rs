//! Residual and Jacobian evaluation.
//!
//! The evaluator owns the link between the optimizer's normalized parameters
//! and the model: it converts to physical values, calls the model, rejects
//! undefined predictions and differentiates numerically.

use std::cell::Cell;

use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::data::DataSet;
use crate::error::{FitError, Result};
use crate::linalg::{allocate_matrix, sum_of_squares};
use crate::lm::config::{DiffMethod, FitConfig};
use crate::lm::weighting::ErrorModel;
use crate::model::Model;
use crate::utils::finite_difference::{
    central_difference, central_difference_each, forward_difference, forward_difference_each,
    parameter_step, variable_step,
};

/// Model predictions and weighted residuals at one parameter vector.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Model predictions in data order
    pub predictions: Array1<f64>,

    /// Effective uncertainty of each point
    pub errors: Array1<f64>,

    /// Weighted residuals `(prediction - observed) / error`
    pub residuals: Array1<f64>,

    /// Sum of squared weighted residuals
    pub chisq: f64,
}

/// Evaluates a model against a data set.
pub struct Evaluator<'a, M: Model> {
    model: &'a M,
    data: &'a DataSet,
    errors: ErrorModel<'a>,
    scale: Array1<f64>,
    diff_method: DiffMethod,
    delta: f64,
    evaluations: Cell<usize>,
}

impl<'a, M: Model> Evaluator<'a, M> {
    /// Creates an evaluator for parameters normalized by `scale`.
    pub fn new(model: &'a M, data: &'a DataSet, config: &FitConfig, scale: Array1<f64>) -> Self {
        Self {
            model,
            data,
            errors: ErrorModel::new(data),
            scale,
            diff_method: config.diff_method,
            delta: config.delta,
            evaluations: Cell::new(0),
        }
    }

    /// Number of model evaluations so far.
    pub fn evaluations(&self) -> usize {
        self.evaluations.get()
    }

    pub fn num_data(&self) -> usize {
        self.data.num_data()
    }

    fn physical(&self, a: &Array1<f64>) -> Array1<f64> {
        a * &self.scale
    }

    fn call_model(&self, a: &Array1<f64>, indep: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let params = self.physical(a);
        self.evaluations.set(self.evaluations.get() + 1);

        let predictions = match self.model.eval(&params, indep) {
            Ok(p) => p,
            Err(err @ FitError::UndefinedModelValue { .. }) => return Err(err),
            Err(err) => {
                return Err(FitError::UndefinedModelValue {
                    point: None,
                    params: params.to_vec(),
                    reason: err.to_string(),
                })
            }
        };

        if predictions.len() != indep.nrows() {
            return Err(FitError::DimensionMismatch(format!(
                "Model returned {} values for {} data points",
                predictions.len(),
                indep.nrows()
            )));
        }
        if let Some(point) = predictions.iter().position(|v| !v.is_finite()) {
            return Err(FitError::UndefinedModelValue {
                point: Some(point),
                params: params.to_vec(),
                reason: format!("model returned {}", predictions[point]),
            });
        }

        Ok(predictions)
    }

    /// Model predictions at the normalized parameters `a`.
    pub fn evaluate_model(&self, a: &Array1<f64>) -> Result<Array1<f64>> {
        self.call_model(a, self.data.independent())
    }

    /// Derivatives of the model with respect to the normalized parameters.
    ///
    /// Returns a `num_data x num_params` matrix.
    pub fn evaluate_jacobian(
        &self,
        a: &Array1<f64>,
        predictions: &Array1<f64>,
    ) -> Result<Array2<f64>> {
        let mut jacobian = allocate_matrix(self.num_data(), a.len())?;

        for p in 0..a.len() {
            let h = parameter_step(a[p], self.delta);
            let mut shifted = a.clone();
            shifted[p] += h;
            let plus = self.evaluate_model(&shifted)?;

            let column = match self.diff_method {
                DiffMethod::Forward => forward_difference(predictions.view(), plus.view(), h),
                DiffMethod::Central => {
                    shifted[p] = a[p] - h;
                    let minus = self.evaluate_model(&shifted)?;
                    central_difference(plus.view(), minus.view(), h)
                }
            };
            jacobian.column_mut(p).assign(&column);
        }

        Ok(jacobian)
    }

    /// Derivatives of the model with respect to the independent variables.
    ///
    /// Only variables with an error column are differentiated; other columns
    /// stay zero. Returns `None` when no variable needs it.
    pub fn evaluate_independent_derivatives(
        &self,
        a: &Array1<f64>,
        predictions: &Array1<f64>,
    ) -> Result<Option<Array2<f64>>> {
        if !self.errors.needs_derivatives() {
            return Ok(None);
        }

        let indep = self.data.independent();
        let mut derivatives = allocate_matrix(self.num_data(), self.data.num_indep())?;

        for k in self.data.mask().independent_indices() {
            let x = indep.column(k);
            let mut shifted = indep.to_owned();
            let mut steps = x.mapv(|v| variable_step(v, self.delta));
            for (i, h) in steps.iter_mut().enumerate() {
                let moved = x[i] + *h;
                // use the step that is actually representable
                *h = moved - x[i];
                shifted[[i, k]] = moved;
            }
            let plus = self.call_model(a, shifted.view())?;

            let column = match self.diff_method {
                DiffMethod::Forward => {
                    forward_difference_each(predictions.view(), plus.view(), steps.view())
                }
                DiffMethod::Central => {
                    shifted
                        .column_mut(k)
                        .assign(&(&x - &steps));
                    let minus = self.call_model(a, shifted.view())?;
                    central_difference_each(plus.view(), minus.view(), steps.view())
                }
            };
            derivatives.column_mut(k).assign(&column);
        }

        Ok(Some(derivatives))
    }

    /// Predictions, effective errors, weighted residuals and χ² at `a`.
    pub fn evaluate(&self, a: &Array1<f64>) -> Result<Evaluation> {
        let predictions = self.evaluate_model(a)?;
        let derivatives = self.evaluate_independent_derivatives(a, &predictions)?;
        let errors = self.errors.effective_errors(derivatives.as_ref());

        let observed = self.data.dependent();
        let residuals: Array1<f64> = (0..self.num_data())
            .map(|i| (predictions[i] - observed[i]) / errors[i])
            .collect();
        let chisq = sum_of_squares(&residuals);

        Ok(Evaluation {
            predictions,
            errors,
            residuals,
            chisq,
        })
    }

    /// Jacobian of the weighted residuals at `a`, each row divided by its error.
    pub fn weighted_jacobian(
        &self,
        a: &Array1<f64>,
        evaluation: &Evaluation,
    ) -> Result<Array2<f64>> {
        let mut jacobian = self.evaluate_jacobian(a, &evaluation.predictions)?;
        for (mut row, &err) in jacobian.axis_iter_mut(Axis(0)).zip(evaluation.errors.iter()) {
            row /= err;
        }
        Ok(jacobian)
    }
}
