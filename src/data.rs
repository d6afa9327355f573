//! Data points and their measurement uncertainties.
//!
//! A [`DataSet`] holds `num_data` rows, each with `num_indep` independent
//! values, one dependent value and optionally one uncertainty per column.
//! Which columns carry an uncertainty is recorded in an [`ErrorColumnMask`].

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};

/// Maximum number of independent variables an [`ErrorColumnMask`] can describe.
pub const MAX_INDEPENDENT: usize = 31;

/// One bit per independent-variable slot plus one for the dependent variable.
///
/// Bit 0 marks the dependent variable, bit `k + 1` marks independent variable `k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorColumnMask(u32);

impl ErrorColumnMask {
    /// A mask with no error columns (unit-weight fit).
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Marks the dependent variable as having an error column.
    pub fn with_dependent(self) -> Self {
        Self(self.0 | 1)
    }

    /// Marks independent variable `k` as having an error column.
    ///
    /// # Panics
    ///
    /// Panics if `k >= MAX_INDEPENDENT`.
    pub fn with_independent(self, k: usize) -> Self {
        assert!(k < MAX_INDEPENDENT, "independent variable index {k} out of range");
        Self(self.0 | (1 << (k + 1)))
    }

    pub fn has_dependent(&self) -> bool {
        self.0 & 1 != 0
    }

    pub fn has_independent(&self, k: usize) -> bool {
        k < MAX_INDEPENDENT && self.0 & (1 << (k + 1)) != 0
    }

    /// True if any independent variable carries an uncertainty.
    pub fn any_independent(&self) -> bool {
        self.0 & !1 != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Number of error columns marked in the mask.
    pub fn count(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Indices of the independent variables that carry an uncertainty.
    pub fn independent_indices(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_INDEPENDENT).filter(move |&k| self.has_independent(k))
    }
}

/// The data a curve is fitted to.
#[derive(Debug, Clone)]
pub struct DataSet {
    independent: Array2<f64>,
    dependent: Array1<f64>,
    dependent_errors: Option<Array1<f64>>,
    independent_errors: Vec<Option<Array1<f64>>>,
    mask: ErrorColumnMask,
}

impl DataSet {
    /// Creates a data set from a `num_data x num_indep` matrix of independent
    /// values and the matching dependent values.
    pub fn new(independent: Array2<f64>, dependent: Array1<f64>) -> Result<Self> {
        if independent.nrows() != dependent.len() {
            return Err(FitError::DimensionMismatch(format!(
                "{} rows of independent values but {} dependent values",
                independent.nrows(),
                dependent.len()
            )));
        }
        if independent.ncols() > MAX_INDEPENDENT {
            return Err(FitError::InvalidInput(format!(
                "At most {} independent variables are supported, got {}",
                MAX_INDEPENDENT,
                independent.ncols()
            )));
        }
        let num_indep = independent.ncols();
        Ok(Self {
            independent,
            dependent,
            dependent_errors: None,
            independent_errors: vec![None; num_indep],
            mask: ErrorColumnMask::empty(),
        })
    }

    /// Creates a data set with a single independent variable.
    pub fn from_xy(x: Array1<f64>, y: Array1<f64>) -> Result<Self> {
        let n = x.len();
        let independent = x
            .into_shape((n, 1))
            .map_err(|e| FitError::DimensionMismatch(e.to_string()))?;
        Self::new(independent, y)
    }

    /// Attaches uncertainties for the dependent variable.
    pub fn with_dependent_errors(mut self, errors: Array1<f64>) -> Result<Self> {
        self.check_column_len("dependent", errors.len())?;
        self.dependent_errors = Some(errors);
        self.mask = self.mask.with_dependent();
        Ok(self)
    }

    /// Attaches uncertainties for independent variable `k`.
    pub fn with_independent_errors(mut self, k: usize, errors: Array1<f64>) -> Result<Self> {
        if k >= self.num_indep() {
            return Err(FitError::InvalidInput(format!(
                "Independent variable {} does not exist ({} available)",
                k,
                self.num_indep()
            )));
        }
        self.check_column_len("independent", errors.len())?;
        self.independent_errors[k] = Some(errors);
        self.mask = self.mask.with_independent(k);
        Ok(self)
    }

    fn check_column_len(&self, what: &str, len: usize) -> Result<()> {
        if len != self.num_data() {
            return Err(FitError::DimensionMismatch(format!(
                "{} error column has {} values, expected {}",
                what,
                len,
                self.num_data()
            )));
        }
        Ok(())
    }

    pub fn num_data(&self) -> usize {
        self.dependent.len()
    }

    pub fn num_indep(&self) -> usize {
        self.independent.ncols()
    }

    /// Number of supplied error columns.
    pub fn num_errors(&self) -> usize {
        self.mask.count()
    }

    pub fn mask(&self) -> ErrorColumnMask {
        self.mask
    }

    /// True when no uncertainties were supplied at all.
    pub fn unit_weights(&self) -> bool {
        self.mask.is_empty()
    }

    pub fn independent(&self) -> ArrayView2<'_, f64> {
        self.independent.view()
    }

    pub fn dependent(&self) -> ArrayView1<'_, f64> {
        self.dependent.view()
    }

    /// Dependent-variable uncertainty of row `i`, `1.0` when none was supplied.
    pub fn dependent_error(&self, i: usize) -> f64 {
        self.dependent_errors.as_ref().map_or(1.0, |e| e[i])
    }

    /// Uncertainties of independent variable `k`, if supplied.
    pub fn independent_errors(&self, k: usize) -> Option<ArrayView1<'_, f64>> {
        self.independent_errors
            .get(k)
            .and_then(|e| e.as_ref())
            .map(|e| e.view())
    }

    /// Rejects zero or negative dependent-variable uncertainties.
    ///
    /// Reports the first offending row.
    pub fn check_errors(&self) -> Result<()> {
        if let Some(errors) = &self.dependent_errors {
            if let Some(row) = errors.iter().position(|&e| !(e > 0.0)) {
                return Err(FitError::ZeroErrorValue { row });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_mask_bits() {
        let mask = ErrorColumnMask::empty().with_dependent().with_independent(2);
        assert!(mask.has_dependent());
        assert!(!mask.has_independent(0));
        assert!(mask.has_independent(2));
        assert!(mask.any_independent());
        assert_eq!(mask.count(), 2);
        assert_eq!(mask.independent_indices().collect::<Vec<_>>(), vec![2]);

        let dep_only = ErrorColumnMask::empty().with_dependent();
        assert!(!dep_only.any_independent());
        assert!(ErrorColumnMask::default().is_empty());
    }

    #[test]
    fn test_from_xy() {
        let data = DataSet::from_xy(array![1.0, 2.0, 3.0], array![2.0, 4.0, 6.0]).unwrap();
        assert_eq!(data.num_data(), 3);
        assert_eq!(data.num_indep(), 1);
        assert_eq!(data.num_errors(), 0);
        assert!(data.unit_weights());
        assert_eq!(data.dependent_error(1), 1.0);
        assert_eq!(data.independent()[[2, 0]], 3.0);
    }

    #[test]
    fn test_error_columns() {
        let data = DataSet::from_xy(array![1.0, 2.0], array![3.0, 4.0])
            .unwrap()
            .with_dependent_errors(array![0.5, 0.25])
            .unwrap()
            .with_independent_errors(0, array![0.1, 0.1])
            .unwrap();

        assert_eq!(data.num_errors(), 2);
        assert!(!data.unit_weights());
        assert_eq!(data.dependent_error(1), 0.25);
        assert_eq!(data.independent_errors(0).unwrap()[0], 0.1);
        assert!(data.check_errors().is_ok());
    }

    #[test]
    fn test_dimension_checks() {
        assert!(DataSet::from_xy(array![1.0, 2.0], array![3.0]).is_err());

        let data = DataSet::from_xy(array![1.0, 2.0], array![3.0, 4.0]).unwrap();
        assert!(data.clone().with_dependent_errors(array![1.0]).is_err());
        assert!(data.with_independent_errors(1, array![1.0, 1.0]).is_err());
    }

    #[test]
    fn test_zero_error_reports_row() {
        let data = DataSet::from_xy(array![1.0, 2.0, 3.0], array![1.0, 2.0, 3.0])
            .unwrap()
            .with_dependent_errors(array![1.0, 0.0, -1.0])
            .unwrap();

        match data.check_errors() {
            Err(FitError::ZeroErrorValue { row }) => assert_eq!(row, 1),
            other => panic!("Expected ZeroErrorValue, got {:?}", other),
        }
    }
}
