//! The model-evaluation interface.
//!
//! A model maps a physical parameter vector and a matrix of independent
//! values to one prediction per data row. How the model is implemented
//! (compiled expression, script callback, native function) does not matter
//! to the fitting engine.

use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::error::Result;

/// A model that can be fitted to a [`DataSet`](crate::data::DataSet).
///
/// Prediction `i` must depend only on row `i` of `indep`. The engine relies on
/// this when it perturbs independent values of all rows at once to
/// differentiate the model with respect to an independent variable.
///
/// A model signals an undefined value either by returning an error or by
/// returning a non-finite prediction; both abort the fit.
pub trait Model {
    /// Evaluates the model at every row of `indep`.
    ///
    /// # Arguments
    ///
    /// * `params` - Physical parameter values
    /// * `indep` - `num_data x num_indep` independent values
    ///
    /// # Returns
    ///
    /// * Exactly `indep.nrows()` predictions in data order
    fn eval(&self, params: &Array1<f64>, indep: ArrayView2<'_, f64>) -> Result<Array1<f64>>;
}

impl<M: Model + ?Sized> Model for &M {
    fn eval(&self, params: &Array1<f64>, indep: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        (**self).eval(params, indep)
    }
}

/// Adapts a closure over the whole independent-value matrix into a [`Model`].
pub struct FnModel<F> {
    f: F,
}

impl<F> FnModel<F>
where
    F: Fn(&Array1<f64>, ArrayView2<'_, f64>) -> Result<Array1<f64>>,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Model for FnModel<F>
where
    F: Fn(&Array1<f64>, ArrayView2<'_, f64>) -> Result<Array1<f64>>,
{
    fn eval(&self, params: &Array1<f64>, indep: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        (self.f)(params, indep)
    }
}

/// Adapts a per-row closure `f(params, x_row) -> y` into a [`Model`].
pub struct PointwiseModel<F> {
    f: F,
}

impl<F> PointwiseModel<F>
where
    F: Fn(&Array1<f64>, ArrayView1<'_, f64>) -> f64,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Model for PointwiseModel<F>
where
    F: Fn(&Array1<f64>, ArrayView1<'_, f64>) -> f64,
{
    fn eval(&self, params: &Array1<f64>, indep: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        Ok(indep.rows().into_iter().map(|row| (self.f)(params, row)).collect())
    }
}
