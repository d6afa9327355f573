//! Effective per-point uncertainties.
//!
//! With only a dependent-variable error column (or none) the supplied error is
//! used as is. When independent variables carry uncertainties too, they are
//! folded into the dependent one with the effective variance method (Orear 1982):
//!
//! `σ_eff² = σ_z² + Σ_k (∂f/∂x_k · σ_{x_k})²`

use ndarray::{Array1, Array2};

use crate::data::DataSet;

/// Computes effective uncertainties for a data set.
#[derive(Debug, Clone, Copy)]
pub struct ErrorModel<'a> {
    data: &'a DataSet,
}

impl<'a> ErrorModel<'a> {
    pub fn new(data: &'a DataSet) -> Self {
        Self { data }
    }

    /// True when model derivatives with respect to independent variables are required.
    pub fn needs_derivatives(&self) -> bool {
        self.data.mask().any_independent()
    }

    /// Effective uncertainty of data point `point`.
    ///
    /// `derivatives` holds `∂f/∂x_k` as a `num_data x num_indep` matrix; only
    /// columns of independent variables with an error column are read. It is
    /// ignored when no independent variable carries an uncertainty.
    pub fn effective_error(&self, derivatives: Option<&Array2<f64>>, point: usize) -> f64 {
        let sigma_z = self.data.dependent_error(point);
        let derivatives = match derivatives {
            Some(d) if self.needs_derivatives() => d,
            _ => return sigma_z,
        };

        let mut variance = sigma_z * sigma_z;
        for k in self.data.mask().independent_indices() {
            if let Some(errors) = self.data.independent_errors(k) {
                let term = derivatives[[point, k]] * errors[point];
                variance += term * term;
            }
        }
        variance.sqrt()
    }

    /// Effective uncertainties of all data points.
    pub fn effective_errors(&self, derivatives: Option<&Array2<f64>>) -> Array1<f64> {
        (0..self.data.num_data())
            .map(|i| self.effective_error(derivatives, i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_unit_weights() {
        let data = DataSet::from_xy(array![1.0, 2.0], array![1.0, 2.0]).unwrap();
        let model = ErrorModel::new(&data);
        assert!(!model.needs_derivatives());
        assert_eq!(model.effective_errors(None), array![1.0, 1.0]);
    }

    #[test]
    fn test_dependent_errors_used_directly() {
        let data = DataSet::from_xy(array![1.0, 2.0], array![1.0, 2.0])
            .unwrap()
            .with_dependent_errors(array![0.5, 2.0])
            .unwrap();
        let model = ErrorModel::new(&data);

        // Derivatives are irrelevant without independent error columns
        let derivs = array![[10.0], [10.0]];
        assert_eq!(model.effective_error(Some(&derivs), 1), 2.0);
    }

    #[test]
    fn test_effective_variance() {
        let data = DataSet::new(array![[1.0, 5.0], [2.0, 6.0]], array![0.0, 0.0])
            .unwrap()
            .with_dependent_errors(array![0.3, 0.3])
            .unwrap()
            .with_independent_errors(0, array![0.1, 0.2])
            .unwrap();
        let model = ErrorModel::new(&data);
        assert!(model.needs_derivatives());

        // Column 1 has no error column and must be ignored
        let derivs = array![[4.0, 100.0], [-2.0, 100.0]];
        let errors = model.effective_errors(Some(&derivs));

        assert_relative_eq!(errors[0], (0.09f64 + 0.16).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(errors[1], (0.09f64 + 0.16).sqrt(), epsilon = 1e-12);
    }
}
