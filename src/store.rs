//! Write-back of fit results.
//!
//! At the end of a fit the driver writes the final parameter values, their
//! errors, optionally the covariances, and a set of summary statistics into a
//! [`ParameterStore`]. Nothing is read back during the fit.

use std::collections::BTreeMap;

/// Statistic names written through [`ParameterStore::set_statistic`].
pub mod statistic {
    pub const CONVERGED: &str = "FIT_CONVERGED";
    pub const NDF: &str = "FIT_NDF";
    pub const WSSR: &str = "FIT_WSSR";
    pub const STDFIT: &str = "FIT_STDFIT";
    pub const P: &str = "FIT_P";
    pub const NITER: &str = "FIT_NITER";
}

/// Destination for the results of a fit, keyed by parameter name.
pub trait ParameterStore {
    fn set_value(&mut self, name: &str, value: f64);

    fn set_error(&mut self, name: &str, error: f64);

    fn set_covariance(&mut self, _first: &str, _second: &str, _covariance: f64) {}

    fn set_statistic(&mut self, _name: &str, _value: f64) {}

    fn set_converged(&mut self, converged: bool) {
        self.set_statistic(statistic::CONVERGED, if converged { 1.0 } else { 0.0 });
    }
}

impl<S: ParameterStore + ?Sized> ParameterStore for &mut S {
    fn set_value(&mut self, name: &str, value: f64) {
        (**self).set_value(name, value)
    }

    fn set_error(&mut self, name: &str, error: f64) {
        (**self).set_error(name, error)
    }

    fn set_covariance(&mut self, first: &str, second: &str, covariance: f64) {
        (**self).set_covariance(first, second, covariance)
    }

    fn set_statistic(&mut self, name: &str, value: f64) {
        (**self).set_statistic(name, value)
    }

    fn set_converged(&mut self, converged: bool) {
        (**self).set_converged(converged)
    }
}

/// Discards every write.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl ParameterStore for NullStore {
    fn set_value(&mut self, _name: &str, _value: f64) {}

    fn set_error(&mut self, _name: &str, _error: f64) {}
}

/// Flat map of named variables.
///
/// Errors are stored as `<name>_err` and covariances as `FIT_COV_<a>_<b>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableStore {
    variables: BTreeMap<String, f64>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.variables.get(name).copied()
    }

    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.variables.insert(name.into(), value);
    }

    pub fn error_name(name: &str) -> String {
        format!("{}_err", name)
    }

    pub fn covariance_name(first: &str, second: &str) -> String {
        format!("FIT_COV_{}_{}", first, second)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.variables.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl ParameterStore for VariableStore {
    fn set_value(&mut self, name: &str, value: f64) {
        self.set(name, value);
    }

    fn set_error(&mut self, name: &str, error: f64) {
        self.set(Self::error_name(name), error);
    }

    fn set_covariance(&mut self, first: &str, second: &str, covariance: f64) {
        self.set(Self::covariance_name(first, second), covariance);
    }

    fn set_statistic(&mut self, name: &str, value: f64) {
        self.set(name, value);
    }
}
