use std::fmt;

use thiserror::Error;

/// The phase of a fit in which a linear solve was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolvePhase {
    /// Solving the damped system for a trial step.
    StepSolve,

    /// Inverting RᵗR for the final covariance matrix.
    Covariance,
}

impl fmt::Display for SolvePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolvePhase::StepSolve => write!(f, "step solve"),
            SolvePhase::Covariance => write!(f, "covariance inversion"),
        }
    }
}

/// Error types for the lmcurve-rs library.
#[derive(Error, Debug)]
pub enum FitError {
    /// A vector or matrix could not be allocated.
    #[error("Out of memory: failed to allocate {requested} elements")]
    OutOfMemory { requested: usize },

    /// A pivot was zero during a QR solve or triangular inversion.
    #[error("Singular matrix encountered during {phase}")]
    SingularMatrix { phase: SolvePhase },

    /// The model could not produce a value at the given parameters.
    #[error("{}", undefined_message(*point, params, reason))]
    UndefinedModelValue {
        point: Option<usize>,
        params: Vec<f64>,
        reason: String,
    },

    /// A dependent-variable uncertainty was zero or negative.
    #[error("Zero or negative error value in data row {row}")]
    ZeroErrorValue { row: usize },

    /// Fewer data points than free parameters.
    #[error("Number of data points ({data}) smaller than number of parameters ({params})")]
    TooFewDataPoints { data: usize, params: usize },

    /// Error indicating a mismatch in vector or matrix dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Invalid input data or configuration.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A fatal engine error raised while iterating.
    #[error("Fit failed in iteration {iteration}: {source}")]
    FitFailed {
        iteration: usize,
        #[source]
        source: Box<FitError>,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

fn undefined_message(point: Option<usize>, params: &[f64], reason: &str) -> String {
    let values = params
        .iter()
        .map(|p| format!("{p:e}"))
        .collect::<Vec<_>>()
        .join(", ");
    match point {
        Some(i) => format!(
            "Undefined value during function evaluation at data point {i} \
             (parameters: [{values}]): {reason}"
        ),
        None => format!(
            "Undefined value during function evaluation (parameters: [{values}]): {reason}"
        ),
    }
}

impl FitError {
    /// Wraps an engine error raised during the given iteration.
    pub(crate) fn during_iteration(self, iteration: usize) -> Self {
        match self {
            err @ FitError::FitFailed { .. } => err,
            err => FitError::FitFailed {
                iteration,
                source: Box::new(err),
            },
        }
    }

    /// The innermost error, looking through any `FitFailed` wrapper.
    pub fn root_cause(&self) -> &FitError {
        match self {
            FitError::FitFailed { source, .. } => source.root_cause(),
            err => err,
        }
    }
}

/// Result type alias for lmcurve-rs operations.
pub type Result<T> = std::result::Result<T, FitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FitError::DimensionMismatch("expected 3x3, got 2x2".to_string());
        assert!(format!("{}", err).contains("expected 3x3, got 2x2"));

        let err = FitError::ZeroErrorValue { row: 7 };
        assert!(format!("{}", err).contains("row 7"));

        let err = FitError::UndefinedModelValue {
            point: Some(3),
            params: vec![1.0, -2.5],
            reason: "NaN".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("data point 3"));
        assert!(msg.contains("-2.5e0"));
    }

    #[test]
    fn test_root_cause_unwraps_fit_failed() {
        let err = FitError::SingularMatrix {
            phase: SolvePhase::StepSolve,
        }
        .during_iteration(4);

        match &err {
            FitError::FitFailed { iteration, .. } => assert_eq!(*iteration, 4),
            _ => panic!("Expected FitFailed variant"),
        }
        assert!(matches!(
            err.root_cause(),
            FitError::SingularMatrix {
                phase: SolvePhase::StepSolve
            }
        ));

        // Wrapping twice keeps the first iteration number
        let err = err.during_iteration(9);
        match err {
            FitError::FitFailed { iteration, .. } => assert_eq!(iteration, 4),
            _ => panic!("Expected FitFailed variant"),
        }
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<Vec<f64>>("not json").unwrap_err();
        let err: FitError = json_err.into();
        assert!(matches!(err, FitError::JsonError(_)));
    }
}
