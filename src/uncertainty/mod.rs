//! # Uncertainty Calculation
//!
//! Asymptotic parameter uncertainties of a finished fit:
//!
//! - Covariance matrix from the QR factor of the final Jacobian
//! - Standard errors and correlation matrix
//! - Reduced χ² scaling of the errors
//! - Goodness-of-fit statistics and the final summary table

mod covariance;
mod statistics;

pub use covariance::{
    calculate_correlation, covariance_from_factor, covariance_is_valid,
    standard_errors_from_covariance, to_physical,
};
pub use statistics::{chisq_p_value, FitStatistics};

use std::fmt;

use log::warn;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result, SolvePhase};
use crate::lm::convergence::FitStatus;
use crate::parameters::Parameter;

/// Parameter uncertainties in physical units.
#[derive(Debug, Clone)]
pub struct ErrorEstimate {
    /// Covariance matrix, scaled by the reduced χ² when error scaling applies
    pub covariance: Array2<f64>,
    /// Standard error of each parameter
    pub standard_errors: Array1<f64>,
    /// Correlation matrix
    pub correlation: Array2<f64>,
}

/// Calculator for parameter uncertainties.
#[derive(Debug, Clone)]
pub struct UncertaintyCalculator {
    /// Goodness-of-fit statistics at the solution
    pub statistics: FitStatistics,
    /// Whether errors are multiplied by the reduced χ²
    pub scale_errors: bool,
}

impl UncertaintyCalculator {
    /// Create a new UncertaintyCalculator.
    ///
    /// Errors are scaled when `error_scaling` is requested or the data carry
    /// no uncertainties of their own.
    pub fn new(
        num_data: usize,
        num_params: usize,
        chisq: f64,
        error_scaling: bool,
        unit_weights: bool,
    ) -> Self {
        Self {
            statistics: FitStatistics::new(num_data, num_params, chisq),
            scale_errors: error_scaling || unit_weights,
        }
    }

    /// Returns false when the fit leaves no room for an error estimate.
    pub fn errors_defined(&self) -> bool {
        if self.statistics.ndf == 0 {
            return false;
        }
        !(self.scale_errors && self.statistics.chisq == 0.0)
    }

    /// Estimate the uncertainties from the QR factor `r` of the normalized Jacobian.
    ///
    /// Fails with a covariance-phase `SingularMatrix` when R is singular or the
    /// covariance has a non-positive diagonal entry.
    pub fn estimate(&self, r: &Array2<f64>, scale: &Array1<f64>) -> Result<ErrorEstimate> {
        let mut covar = covariance_from_factor(r)?;
        if !covariance_is_valid(&covar) {
            return Err(FitError::SingularMatrix {
                phase: SolvePhase::Covariance,
            });
        }

        if self.scale_errors {
            if let Some(redchi) = self.statistics.reduced_chisq {
                covar *= redchi;
            }
        }

        let covariance = to_physical(&covar, scale);
        Ok(ErrorEstimate {
            standard_errors: standard_errors_from_covariance(&covariance),
            correlation: calculate_correlation(&covariance),
            covariance,
        })
    }
}

/// Final report of a fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitSummary {
    /// How the fit ended
    pub status: FitStatus,

    /// Number of iterations
    pub iterations: usize,

    /// Relative χ² change during the last iteration
    pub relative_change: f64,

    /// Goodness-of-fit statistics
    pub statistics: FitStatistics,

    /// Final parameters in physical units
    pub parameters: Vec<Parameter>,

    /// Asymptotic standard errors, when available
    pub errors: Option<Vec<f64>>,

    /// Correlation matrix, row-major, when available
    pub correlation: Option<Vec<Vec<f64>>>,

    /// False when the covariance was singular or had a non-positive diagonal
    pub covariance_valid: bool,

    /// Whether the errors were scaled by the reduced χ²
    pub errors_scaled: bool,
}

impl FitSummary {
    /// Returns true if standard errors were computed.
    pub fn errors_available(&self) -> bool {
        self.errors.is_some()
    }

    /// Weighted sum of squared residuals.
    pub fn chisq(&self) -> f64 {
        self.statistics.chisq
    }

    /// Emits a warning for every result that needs the reader's attention.
    pub fn log_warnings(&self) {
        if !self.status.is_converged() {
            warn!("{}", self.status);
        }
        if self.statistics.ndf == 0 {
            warn!("Exactly as many data points as parameters; errors are undefined");
        } else if self.statistics.chisq == 0.0 {
            warn!("Residuals are exactly zero; errors are undefined");
        }
        if !self.covariance_valid {
            warn!("Covariance matrix is not positive definite; errors are unavailable");
        }
    }

    fn name_width(&self) -> usize {
        self.parameters
            .iter()
            .map(|p| p.name.len())
            .max()
            .unwrap_or(0)
            .max(8)
    }
}

impl fmt::Display for FitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.name_width();
        let stats = &self.statistics;

        writeln!(f, "{} after {} iterations", self.status, self.iterations)?;
        writeln!(f, "final sum of squares of residuals : {:.6e}", stats.chisq)?;
        writeln!(f, "rel. change during last iteration : {:.6e}", self.relative_change)?;
        writeln!(f)?;
        writeln!(f, "degrees of freedom    (ndf)            : {}", stats.ndf)?;
        match (stats.rms, stats.reduced_chisq, stats.p_value) {
            (Some(rms), Some(redchi), Some(p)) => {
                writeln!(f, "rms of residuals      sqrt(WSSR/ndf)   : {:.6e}", rms)?;
                writeln!(f, "reduced chisquare     WSSR/ndf         : {:.6e}", redchi)?;
                writeln!(f, "p-value of the chisq distribution      : {:.6e}", p)?;
            }
            _ => writeln!(f, "(exactly determined: no residual statistics)")?,
        }
        writeln!(f)?;

        match &self.errors {
            Some(errors) => {
                writeln!(f, "Final set of parameters            Asymptotic Standard Error")?;
                writeln!(f, "=======================            ==========================")?;
                for (param, err) in self.parameters.iter().zip(errors) {
                    let percent = if param.value != 0.0 {
                        (err / param.value * 100.0).abs()
                    } else {
                        0.0
                    };
                    writeln!(
                        f,
                        "{:<width$} = {:<15.6e} +/- {:<12.4e} ({:.4}%)",
                        param.name,
                        param.value,
                        err,
                        percent,
                        width = width
                    )?;
                }
            }
            None => {
                writeln!(f, "Final set of parameters (errors undefined)")?;
                writeln!(f, "==========================================")?;
                for param in &self.parameters {
                    writeln!(f, "{:<width$} = {:.6e}", param.name, param.value, width = width)?;
                }
            }
        }

        if let Some(correlation) = &self.correlation {
            writeln!(f)?;
            writeln!(f, "correlation matrix of the fit parameters:")?;
            write!(f, "{:<width$}", "", width = width)?;
            for param in &self.parameters {
                write!(f, " {:>8.8}", param.name)?;
            }
            writeln!(f)?;
            for (i, row) in correlation.iter().enumerate() {
                write!(f, "{:<width$}", self.parameters[i].name, width = width)?;
                for value in row.iter().take(i + 1) {
                    write!(f, " {:>8.3}", value)?;
                }
                writeln!(f)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::givens_rotate;
    use approx::assert_relative_eq;
    use ndarray::{array, s};

    fn factor(jacobian: Array2<f64>) -> Array2<f64> {
        let p = jacobian.ncols();
        let mut c = jacobian;
        givens_rotate(&mut c, None).unwrap();
        c.slice(s![..p, ..]).to_owned()
    }

    #[test]
    fn test_estimate_with_scaling() {
        let r = factor(array![[1.0, 1.0], [2.0, 1.0], [3.0, 1.0], [4.0, 1.0]]);
        // ndf = 2, redchi = 3
        let calc = UncertaintyCalculator::new(4, 2, 6.0, true, false);
        assert!(calc.errors_defined());

        let estimate = calc.estimate(&r, &array![1.0, 1.0]).unwrap();

        assert_relative_eq!(estimate.covariance[[0, 0]], 0.2 * 3.0, epsilon = 1e-12);
        assert_relative_eq!(estimate.standard_errors[1], (1.5f64 * 3.0).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(
            estimate.correlation[[1, 0]],
            -0.5 / (0.2f64 * 1.5).sqrt(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_unit_weights_force_scaling() {
        let calc = UncertaintyCalculator::new(4, 2, 6.0, false, true);
        assert!(calc.scale_errors);

        let calc = UncertaintyCalculator::new(4, 2, 6.0, false, false);
        assert!(!calc.scale_errors);
        let r = factor(array![[1.0, 1.0], [2.0, 1.0], [3.0, 1.0], [4.0, 1.0]]);
        let estimate = calc.estimate(&r, &array![1.0, 1.0]).unwrap();
        assert_relative_eq!(estimate.covariance[[0, 0]], 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_fits_have_no_errors() {
        assert!(!UncertaintyCalculator::new(2, 2, 1.0, true, false).errors_defined());
        assert!(!UncertaintyCalculator::new(5, 2, 0.0, true, false).errors_defined());
        // Unscaled errors remain meaningful at χ² = 0
        assert!(UncertaintyCalculator::new(5, 2, 0.0, false, false).errors_defined());
    }

    #[test]
    fn test_singular_factor() {
        let calc = UncertaintyCalculator::new(4, 2, 1.0, true, false);
        let err = calc.estimate(&array![[1.0, 1.0], [0.0, 0.0]], &array![1.0, 1.0]).unwrap_err();
        assert!(matches!(
            err,
            FitError::SingularMatrix {
                phase: SolvePhase::Covariance
            }
        ));
    }

    #[test]
    fn test_summary_display() {
        let summary = FitSummary {
            status: FitStatus::Converged,
            iterations: 4,
            relative_change: -1e-7,
            statistics: FitStatistics::new(10, 2, 8.0),
            parameters: vec![Parameter::new("slope", 2.0), Parameter::new("offset", 1.0)],
            errors: Some(vec![0.1, 0.2]),
            correlation: Some(vec![vec![1.0, -0.9], vec![-0.9, 1.0]]),
            covariance_valid: true,
            errors_scaled: true,
        };

        let text = summary.to_string();
        assert!(text.contains("Fit converged after 4 iterations"));
        assert!(text.contains("slope"));
        assert!(text.contains("+/-"));
        assert!(text.contains("(5.0000%)"));
        assert!(text.contains("correlation matrix"));
        assert!(summary.errors_available());
    }

    #[test]
    fn test_summary_without_errors() {
        let summary = FitSummary {
            status: FitStatus::PerfectFit,
            iterations: 1,
            relative_change: 0.0,
            statistics: FitStatistics::new(2, 2, 0.0),
            parameters: vec![Parameter::new("a", 1.0), Parameter::new("b", 2.0)],
            errors: None,
            correlation: None,
            covariance_valid: true,
            errors_scaled: true,
        };

        let text = summary.to_string();
        assert!(text.contains("errors undefined"));
        assert!(text.contains("exactly determined"));
        assert!(!summary.errors_available());
    }
}
