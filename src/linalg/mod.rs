//! Dense linear-algebra kernel for the Marquardt engine.
//!
//! Everything here works on plain `ndarray` containers. Allocation is fallible
//! so that a fit on a very large data set fails with
//! [`FitError::OutOfMemory`] instead of aborting the process.

mod givens;
mod summation;

pub use givens::{back_substitute, givens_rotate, givens_solve, invert_rtr};
pub use summation::sum_of_squares;

use ndarray::{s, Array1, Array2};

use crate::error::{FitError, Result};

fn try_storage(requested: usize) -> Result<Vec<f64>> {
    let mut storage = Vec::new();
    storage
        .try_reserve_exact(requested)
        .map_err(|_| FitError::OutOfMemory { requested })?;
    storage.resize(requested, 0.0);
    Ok(storage)
}

/// Allocates a zero-filled vector of length `n`.
pub fn allocate_vector(n: usize) -> Result<Array1<f64>> {
    Ok(Array1::from_vec(try_storage(n)?))
}

/// Allocates a zero-filled `rows x cols` matrix.
pub fn allocate_matrix(rows: usize, cols: usize) -> Result<Array2<f64>> {
    let requested = rows
        .checked_mul(cols)
        .ok_or(FitError::OutOfMemory {
            requested: usize::MAX,
        })?;
    Array2::from_shape_vec((rows, cols), try_storage(requested)?)
        .map_err(|e| FitError::DimensionMismatch(e.to_string()))
}

/// Resizes `vec` to `new_len`, keeping the first `min(old, new)` entries.
///
/// New entries are zero. On allocation failure `vec` is left untouched.
pub fn resize_vector(vec: &mut Array1<f64>, new_len: usize) -> Result<()> {
    let mut resized = allocate_vector(new_len)?;
    let keep = vec.len().min(new_len);
    resized
        .slice_mut(s![..keep])
        .assign(&vec.slice(s![..keep]));
    *vec = resized;
    Ok(())
}
