//! Finite difference step sizes and difference quotients.
//!
//! Parameter steps are relative to the parameter's magnitude with a tiny
//! absolute floor. Steps for independent variables also carry an absolute
//! component so that they stay well conditioned near zero.

use ndarray::{Array1, ArrayView1, Zip};

/// Default relative step for numerical derivatives.
pub const DELTA: f64 = 1e-3;

/// Floor on the magnitude a parameter step is taken relative to.
pub const NEARLY_ZERO: f64 = 1e-30;

/// Step used to differentiate with respect to a (normalized) parameter.
///
/// `h = max(|value|, NEARLY_ZERO) * delta`
pub fn parameter_step(value: f64, delta: f64) -> f64 {
    value.abs().max(NEARLY_ZERO) * delta
}

/// Step used to differentiate with respect to an independent variable.
///
/// `h = max(delta * |x|, sqrt(eps) * (|x| + eps))`
pub fn variable_step(x: f64, delta: f64) -> f64 {
    let floor = f64::EPSILON.sqrt() * (x.abs() + f64::EPSILON);
    (delta * x.abs()).max(floor)
}

/// Forward difference `(perturbed - base) / h`.
pub fn forward_difference(
    base: ArrayView1<'_, f64>,
    perturbed: ArrayView1<'_, f64>,
    h: f64,
) -> Array1<f64> {
    Zip::from(&perturbed)
        .and(&base)
        .map_collect(|&p, &b| (p - b) / h)
}

/// Central difference `(plus - minus) / (2h)`.
pub fn central_difference(
    plus: ArrayView1<'_, f64>,
    minus: ArrayView1<'_, f64>,
    h: f64,
) -> Array1<f64> {
    Zip::from(&plus)
        .and(&minus)
        .map_collect(|&p, &m| (p - m) / (2.0 * h))
}

/// Forward difference with a separate step per element.
pub fn forward_difference_each(
    base: ArrayView1<'_, f64>,
    perturbed: ArrayView1<'_, f64>,
    h: ArrayView1<'_, f64>,
) -> Array1<f64> {
    Zip::from(&perturbed)
        .and(&base)
        .and(&h)
        .map_collect(|&p, &b, &step| (p - b) / step)
}

/// Central difference with a separate step per element.
pub fn central_difference_each(
    plus: ArrayView1<'_, f64>,
    minus: ArrayView1<'_, f64>,
    h: ArrayView1<'_, f64>,
) -> Array1<f64> {
    Zip::from(&plus)
        .and(&minus)
        .and(&h)
        .map_collect(|&p, &m, &step| (p - m) / (2.0 * step))
}
