//! QR decomposition by Givens rotations and the triangular solves built on it.

use ndarray::{Array1, Array2};

use crate::error::{FitError, Result, SolvePhase};

/// In-place QR decomposition of `c` by Givens rotations.
///
/// Sub-diagonal entries are annihilated column by column, leaving the upper
/// triangular factor R in the top `ncols` rows of `c`. When `d` is given, the
/// same rotations are applied to it so that it becomes Qᵗd.
///
/// A rotation whose diagonal entry is negligible next to the entry being
/// eliminated degenerates to a signed row swap.
pub fn givens_rotate(c: &mut Array2<f64>, mut d: Option<&mut Array1<f64>>) -> Result<()> {
    let (nrows, ncols) = c.dim();
    if nrows < ncols {
        return Err(FitError::DimensionMismatch(format!(
            "QR decomposition needs at least as many rows as columns, got {}x{}",
            nrows, ncols
        )));
    }
    if let Some(d) = d.as_deref() {
        if d.len() != nrows {
            return Err(FitError::DimensionMismatch(format!(
                "Right-hand side has length {}, expected {}",
                d.len(),
                nrows
            )));
        }
    }

    for j in 0..ncols {
        for i in (j + 1)..nrows {
            let cij = c[[i, j]];
            if cij == 0.0 {
                continue;
            }
            let cjj = c[[j, j]];

            let (w, gamma, sigma) = if cjj.abs() < f64::EPSILON * cij.abs() {
                (-cij, 0.0, 1.0)
            } else {
                let w = cjj.signum() * cjj.hypot(cij);
                if w == 0.0 {
                    return Err(FitError::SingularMatrix {
                        phase: SolvePhase::StepSolve,
                    });
                }
                (w, cjj / w, -cij / w)
            };

            c[[j, j]] = w;
            c[[i, j]] = 0.0;
            for k in (j + 1)..ncols {
                let upper = c[[j, k]];
                let lower = c[[i, k]];
                c[[j, k]] = gamma * upper - sigma * lower;
                c[[i, k]] = sigma * upper + gamma * lower;
            }

            if let Some(d) = d.as_deref_mut() {
                let upper = d[j];
                let lower = d[i];
                d[j] = gamma * upper - sigma * lower;
                d[i] = sigma * upper + gamma * lower;
            }
        }
    }

    Ok(())
}

/// Solves `R x = -d` for the upper triangular R held in the top rows of `r`.
pub fn back_substitute(r: &Array2<f64>, d: &Array1<f64>, x: &mut Array1<f64>) -> Result<()> {
    let n = r.ncols();
    if x.len() != n || d.len() < n {
        return Err(FitError::DimensionMismatch(format!(
            "Back substitution on {} unknowns got x of length {} and d of length {}",
            n,
            x.len(),
            d.len()
        )));
    }

    for i in (0..n).rev() {
        let mut s = d[i];
        for k in (i + 1)..n {
            s += r[[i, k]] * x[k];
        }
        if r[[i, i]] == 0.0 {
            return Err(FitError::SingularMatrix {
                phase: SolvePhase::StepSolve,
            });
        }
        x[i] = -s / r[[i, i]];
    }

    Ok(())
}

/// Least-squares solve of `C x ≈ -d` via Givens QR.
///
/// Both `c` and `d` are overwritten: `c` with its QR factor R and `d` with Qᵗd.
pub fn givens_solve(c: &mut Array2<f64>, d: &mut Array1<f64>, x: &mut Array1<f64>) -> Result<()> {
    givens_rotate(c, Some(d))?;
    back_substitute(c, d, x)
}

/// Computes `(RᵗR)⁻¹` from the upper triangular factor in the top `n` rows of `r`.
///
/// Solves `Rᵗ B = I` by forward substitution and then `R A = B` by backward
/// substitution. Only the lower triangle of the result is written; the upper
/// triangle is left at zero.
pub fn invert_rtr(r: &Array2<f64>, n: usize) -> Result<Array2<f64>> {
    if r.nrows() < n || r.ncols() < n {
        return Err(FitError::DimensionMismatch(format!(
            "Cannot invert a {}x{} Gramian from a {}x{} factor",
            n,
            n,
            r.nrows(),
            r.ncols()
        )));
    }
    if (0..n).any(|i| r[[i, i]] == 0.0) {
        return Err(FitError::SingularMatrix {
            phase: SolvePhase::Covariance,
        });
    }

    // B = (Rᵗ)⁻¹ is lower triangular
    let mut b = super::allocate_matrix(n, n)?;
    for j in 0..n {
        for i in j..n {
            let mut s = if i == j { 1.0 } else { 0.0 };
            for k in j..i {
                s -= r[[k, i]] * b[[k, j]];
            }
            b[[i, j]] = s / r[[i, i]];
        }
    }

    let mut inverse = super::allocate_matrix(n, n)?;
    for j in 0..n {
        for i in (j..n).rev() {
            let mut s = b[[i, j]];
            for k in (i + 1)..n {
                s -= r[[i, k]] * inverse[[k, j]];
            }
            inverse[[i, j]] = s / r[[i, i]];
        }
    }

    Ok(inverse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array1};

    #[test]
    fn test_solve_square_system() {
        // C x = -d with C = [[2, 1], [1, 3]], solution x = [1, 2]
        let mut c = array![[2.0, 1.0], [1.0, 3.0]];
        let mut d = array![-4.0, -7.0];
        let mut x = Array1::zeros(2);

        givens_solve(&mut c, &mut d, &mut x).unwrap();

        assert_relative_eq!(x[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 2.0, epsilon = 1e-12);
        // R is upper triangular
        assert_eq!(c[[1, 0]], 0.0);
    }

    #[test]
    fn test_overdetermined_least_squares() {
        // Fit y = a x + b through (0,1), (1,3), (2,5): exact a = 2, b = 1
        let mut c = array![[0.0, 1.0], [1.0, 1.0], [2.0, 1.0]];
        let mut d = array![-1.0, -3.0, -5.0];
        let mut x = Array1::zeros(2);

        givens_solve(&mut c, &mut d, &mut x).unwrap();

        assert_relative_eq!(x[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-12);
        // The rotated residual below R is zero for a consistent system
        assert_relative_eq!(d[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_rotation_swaps_rows() {
        // Zero leading diagonal forces the (cos=0, sin=1) rotation
        let mut c = array![[0.0, 1.0], [3.0, 2.0]];
        let mut d = array![-1.0, -8.0];
        let mut x = Array1::zeros(2);

        givens_solve(&mut c, &mut d, &mut x).unwrap();

        // 3 x0 + 2 x1 = 8, x1 = 1  =>  x0 = 2
        assert_relative_eq!(x[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(x[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_matrix_detected() {
        let mut c = array![[1.0, 2.0], [2.0, 4.0]];
        let mut d = array![1.0, 2.0];
        let mut x = Array1::zeros(2);

        let err = givens_solve(&mut c, &mut d, &mut x).unwrap_err();
        assert!(matches!(err, FitError::SingularMatrix { .. }));
    }

    #[test]
    fn test_invert_rtr_matches_inverse_gramian() {
        let j = array![[1.0, 1.0], [2.0, 1.0], [3.0, 1.0], [4.0, 1.0]];
        let mut c = j.clone();
        givens_rotate(&mut c, None).unwrap();

        let inv = invert_rtr(&c, 2).unwrap();

        // JᵗJ = [[30, 10], [10, 4]], det = 20
        assert_relative_eq!(inv[[0, 0]], 4.0 / 20.0, epsilon = 1e-12);
        assert_relative_eq!(inv[[1, 0]], -10.0 / 20.0, epsilon = 1e-12);
        assert_relative_eq!(inv[[1, 1]], 30.0 / 20.0, epsilon = 1e-12);
        // Upper triangle is not written
        assert_eq!(inv[[0, 1]], 0.0);
    }

    #[test]
    fn test_invert_rtr_singular() {
        let r = array![[1.0, 2.0], [0.0, 0.0]];
        let err = invert_rtr(&r, 2).unwrap_err();
        assert!(matches!(
            err,
            FitError::SingularMatrix {
                phase: SolvePhase::Covariance
            }
        ));
    }
}
