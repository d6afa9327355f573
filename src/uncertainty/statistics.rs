//! Goodness-of-fit statistics.

use serde::{Deserialize, Serialize};
use statrs::function::gamma::gamma_ur;

/// Probability of a χ² at least as large as `chisq` for `ndf` degrees of freedom.
///
/// This is the upper regularized incomplete gamma function `Q(ndf/2, χ²/2)`.
pub fn chisq_p_value(chisq: f64, ndf: usize) -> f64 {
    if ndf == 0 || chisq.is_nan() {
        return f64::NAN;
    }
    if chisq <= 0.0 {
        return 1.0;
    }
    if chisq.is_infinite() {
        return 0.0;
    }
    gamma_ur(ndf as f64 / 2.0, chisq / 2.0)
}

/// Statistics of the final fit.
///
/// The derived quantities are `None` when the fit is exactly determined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitStatistics {
    /// Degrees of freedom, `num_data - num_params`
    pub ndf: usize,

    /// Weighted sum of squared residuals
    pub chisq: f64,

    /// `chisq / ndf`
    pub reduced_chisq: Option<f64>,

    /// RMS of residuals, `sqrt(chisq / ndf)`
    pub rms: Option<f64>,

    /// χ² p-value
    pub p_value: Option<f64>,
}

impl FitStatistics {
    pub fn new(num_data: usize, num_params: usize, chisq: f64) -> Self {
        let ndf = num_data.saturating_sub(num_params);
        if ndf == 0 {
            return Self {
                ndf,
                chisq,
                reduced_chisq: None,
                rms: None,
                p_value: None,
            };
        }

        let reduced_chisq = chisq / ndf as f64;
        Self {
            ndf,
            chisq,
            reduced_chisq: Some(reduced_chisq),
            rms: Some(reduced_chisq.sqrt()),
            p_value: Some(chisq_p_value(chisq, ndf)),
        }
    }
}
