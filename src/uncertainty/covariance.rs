//! # Covariance Matrix Calculations
//!
//! The covariance of the fitted parameters is `(CᵗC)⁻¹`, where C is the
//! weighted Jacobian at the solution. It is computed from the triangular QR
//! factor R of C as `(RᵗR)⁻¹`, so the normal equations are never formed.

use ndarray::{Array1, Array2};

use crate::error::Result;
use crate::linalg::invert_rtr;

/// Calculate the full covariance matrix from the QR factor `r`.
///
/// Only the lower triangle is computed; it is mirrored into the upper one.
pub fn covariance_from_factor(r: &Array2<f64>) -> Result<Array2<f64>> {
    let n = r.ncols();
    let mut covar = invert_rtr(r, n)?;
    for i in 0..n {
        for j in 0..i {
            covar[[j, i]] = covar[[i, j]];
        }
    }
    Ok(covar)
}

/// Returns true when every diagonal entry is strictly positive.
pub fn covariance_is_valid(covar: &Array2<f64>) -> bool {
    covar.diag().iter().all(|&v| v > 0.0)
}

/// Convert a covariance of normalized parameters into physical units.
///
/// `covar_phys[i,j] = covar[i,j] * scale[i] * scale[j]`
pub fn to_physical(covar: &Array2<f64>, scale: &Array1<f64>) -> Array2<f64> {
    let mut physical = covar.clone();
    for ((i, j), v) in physical.indexed_iter_mut() {
        *v *= scale[i] * scale[j];
    }
    physical
}

/// Calculate correlation matrix from covariance matrix.
///
/// `correl[i,j] = covar[i,j] / sqrt(covar[i,i] * covar[j,j])`
pub fn calculate_correlation(covar: &Array2<f64>) -> Array2<f64> {
    let n = covar.nrows();
    let mut correl = Array2::zeros((n, n));

    for i in 0..n {
        for j in 0..n {
            if i == j {
                correl[[i, j]] = 1.0;
            } else {
                let denom = (covar[[i, i]] * covar[[j, j]]).sqrt();
                if denom > 0.0 {
                    correl[[i, j]] = covar[[i, j]] / denom;
                }
            }
        }
    }

    correl
}

/// Extract standard errors from the covariance matrix.
///
/// Non-positive diagonal entries give a zero error.
pub fn standard_errors_from_covariance(covar: &Array2<f64>) -> Array1<f64> {
    covar
        .diag()
        .mapv(|v| if v > 0.0 { v.sqrt() } else { 0.0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::givens_rotate;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_covariance_from_factor_is_symmetric() {
        let mut c = array![[1.0, 1.0], [2.0, 1.0], [3.0, 1.0], [4.0, 1.0]];
        givens_rotate(&mut c, None).unwrap();
        let r = c.slice(ndarray::s![..2, ..]).to_owned();

        let covar = covariance_from_factor(&r).unwrap();

        assert_relative_eq!(covar[[0, 0]], 0.2, epsilon = 1e-12);
        assert_relative_eq!(covar[[1, 1]], 1.5, epsilon = 1e-12);
        assert_relative_eq!(covar[[0, 1]], -0.5, epsilon = 1e-12);
        assert_eq!(covar[[0, 1]], covar[[1, 0]]);
        assert!(covariance_is_valid(&covar));
    }

    #[test]
    fn test_invalid_covariance() {
        let covar = array![[1.0, 0.0], [0.0, -1e-3]];
        assert!(!covariance_is_valid(&covar));
        assert_eq!(standard_errors_from_covariance(&covar), array![1.0, 0.0]);
    }

    #[test]
    fn test_calculate_correlation() {
        let covar = array![[0.1, 0.05], [0.05, 0.2]];

        let correl = calculate_correlation(&covar);

        assert_eq!(correl[[0, 0]], 1.0);
        assert_eq!(correl[[1, 1]], 1.0);
        let expected = 0.05 / (0.1f64 * 0.2f64).sqrt();
        assert_relative_eq!(correl[[0, 1]], expected, epsilon = 1e-12);
        assert_relative_eq!(correl[[1, 0]], expected, epsilon = 1e-12);
    }

    #[test]
    fn test_to_physical() {
        let covar = array![[1.0, 0.5], [0.5, 2.0]];
        let physical = to_physical(&covar, &array![2.0, 10.0]);

        assert_eq!(physical, array![[4.0, 10.0], [10.0, 200.0]]);
        // Correlations do not depend on the parameter scale
        assert_relative_eq!(
            calculate_correlation(&physical)[[1, 0]],
            calculate_correlation(&covar)[[1, 0]],
            epsilon = 1e-12
        );
    }
}
