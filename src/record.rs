//! Record of the most recent completed fit.
//!
//! A later "continue" fit can start from the recorded parameters with
//! [`ParameterVector::from_record`](crate::parameters::ParameterVector::from_record).

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::lm::config::FitConfig;
use crate::lm::convergence::FitStatus;
use crate::parameters::Parameter;

/// Final state of a fit that completed without a fatal error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastFitRecord {
    /// Final parameter values in physical units
    pub parameters: Vec<Parameter>,

    /// Standard errors, when they could be computed
    pub errors: Option<Vec<f64>>,

    /// Final weighted sum of squared residuals
    pub chisq: f64,

    /// Degrees of freedom
    pub ndf: usize,

    pub iterations: usize,

    pub status: FitStatus,

    /// Configuration the fit ran with
    pub config: FitConfig,
}

impl LastFitRecord {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
