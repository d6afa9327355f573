//! Named fit parameters with prescaling.
//!
//! The optimizer works on normalized values `a[i]`; the value the model sees
//! (the physical value) is `a[i] * scale[i]`. Prescaling sets each scale to the
//! parameter's starting magnitude so that all normalized values start near one.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};
use crate::linalg::resize_vector;
use crate::record::LastFitRecord;

/// A named parameter with its physical starting value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Name of the parameter
    pub name: String,

    /// Physical value of the parameter
    pub value: f64,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// The ordered parameter vector of a fit.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterVector {
    names: Vec<String>,
    values: Array1<f64>,
    scale: Array1<f64>,
}

impl Default for ParameterVector {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterVector {
    /// Creates an empty parameter vector.
    pub fn new() -> Self {
        Self {
            names: Vec::new(),
            values: Array1::zeros(0),
            scale: Array1::zeros(0),
        }
    }

    /// Builds a parameter vector from `(name, value)` pairs.
    pub fn from_pairs<S: Into<String>>(pairs: impl IntoIterator<Item = (S, f64)>) -> Result<Self> {
        let mut params = Self::new();
        for (name, value) in pairs {
            params.add(name, value)?;
        }
        Ok(params)
    }

    /// Seeds a parameter vector from the values of a previous fit.
    pub fn from_record(record: &LastFitRecord) -> Result<Self> {
        Self::from_pairs(
            record
                .parameters
                .iter()
                .map(|p| (p.name.clone(), p.value)),
        )
    }

    /// Appends a parameter with unit scale.
    pub fn add(&mut self, name: impl Into<String>, value: f64) -> Result<()> {
        let name = name.into();
        if self.names.contains(&name) {
            return Err(FitError::InvalidInput(format!(
                "Parameter '{}' specified twice",
                name
            )));
        }
        if !value.is_finite() {
            return Err(FitError::InvalidInput(format!(
                "Parameter '{}' has non-finite starting value {}",
                name, value
            )));
        }

        let n = self.names.len() + 1;
        resize_vector(&mut self.values, n)?;
        resize_vector(&mut self.scale, n)?;
        self.values[n - 1] = value;
        self.scale[n - 1] = 1.0;
        self.names.push(name);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Index of the parameter called `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Normalized values the optimizer works on.
    pub fn normalized(&self) -> &Array1<f64> {
        &self.values
    }

    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    /// Replaces the normalized values.
    pub fn set_normalized(&mut self, values: Array1<f64>) -> Result<()> {
        if values.len() != self.len() {
            return Err(FitError::DimensionMismatch(format!(
                "Expected {} parameter values, got {}",
                self.len(),
                values.len()
            )));
        }
        self.values = values;
        Ok(())
    }

    /// Physical values `a[i] * scale[i]`.
    pub fn physical(&self) -> Array1<f64> {
        self.to_physical(&self.values)
    }

    /// Converts normalized values `a` to physical values using this vector's scales.
    pub fn to_physical(&self, a: &Array1<f64>) -> Array1<f64> {
        a * &self.scale
    }

    /// Physical value of parameter `i`.
    pub fn value(&self, i: usize) -> f64 {
        self.values[i] * self.scale[i]
    }

    /// Physical value of the parameter called `name`.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.index_of(name).map(|i| self.value(i))
    }

    /// Normalizes every parameter by its current physical magnitude.
    ///
    /// Parameters that are currently zero keep a unit scale.
    pub fn prescale(&mut self) {
        for i in 0..self.len() {
            let physical = self.value(i);
            if physical != 0.0 {
                self.scale[i] = physical;
                self.values[i] = 1.0;
            } else {
                self.scale[i] = 1.0;
                self.values[i] = 0.0;
            }
        }
    }

    /// Folds the scales back into the values, leaving every scale at one.
    pub fn unscale(&mut self) {
        self.values = self.physical();
        self.scale.fill(1.0);
    }

    /// Named physical values.
    pub fn to_parameters(&self) -> Vec<Parameter> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| Parameter::new(name.clone(), self.value(i)))
            .collect()
    }
}
