// fusion_core/src/config/mod.rs

//! Filter configuration: loading from TOML with `figment` and validating the result.

pub mod serde_helpers;

use figment::{
    providers::{Format, Toml},
    Figment,
};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{ConfigError, MeasurementError};
use crate::models::measurement::SensorKind;
use crate::types::{all_finite, is_positive_semidefinite, max_asymmetry};

/// Tolerance used when checking configured matrices for symmetry.
const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// Relative tolerance on negative eigenvalues of configured covariances.
pub(crate) const PSD_TOLERANCE: f64 = 1e-9;

/// A square covariance matrix as it appears in a config file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct CovarianceSpec(
    #[serde(with = "serde_helpers::dmatrix_rows_or_diagonal")] pub DMatrix<f64>,
);

/// # FilterConfig
/// All recognized options for the measurement core.
///
/// ```toml
/// max_delay_window = 0.5
/// initial_uncertainty = [1.0, 1.0, 1.0]
///
/// [sensor_noise]
/// gps = [0.25, 0.25, 1.0]
/// altimeter = [[0.04]]
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)] // Fail if the TOML has fields not in our struct
pub struct FilterConfig {
    /// How far back (seconds) a delayed measurement may reach behind the head.
    #[serde(default = "default_max_delay_window")]
    pub max_delay_window: f64,

    /// Measurement noise covariance `R` for each sensor kind.
    #[serde(default)]
    pub sensor_noise: HashMap<SensorKind, CovarianceSpec>,

    /// Covariance seeded into components written by an init measurement.
    #[serde(default)]
    pub initial_uncertainty: Option<CovarianceSpec>,

    /// Variance used on the diagonal when no `initial_uncertainty` is configured.
    #[serde(default = "default_initial_variance")]
    pub default_initial_variance: f64,

    /// Upper bound on any matrix dimension the correction step will accept.
    #[serde(default = "default_max_state_dim")]
    pub max_state_dim: usize,
}

fn default_max_delay_window() -> f64 {
    0.5
}

fn default_initial_variance() -> f64 {
    1.0
}

fn default_max_state_dim() -> usize {
    64
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_delay_window: default_max_delay_window(),
            sensor_noise: HashMap::new(),
            initial_uncertainty: None,
            default_initial_variance: default_initial_variance(),
            max_state_dim: default_max_state_dim(),
        }
    }
}

impl FilterConfig {
    /// Loads and validates a configuration file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: FilterConfig = Figment::new().merge(Toml::file(path.as_ref())).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration from an in-memory TOML document.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config: FilterConfig = Figment::new().merge(Toml::string(toml)).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.max_delay_window.is_finite() || self.max_delay_window < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "max_delay_window must be a finite, non-negative duration, got {}",
                self.max_delay_window
            )));
        }
        if !self.default_initial_variance.is_finite() || self.default_initial_variance < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "default_initial_variance must be finite and non-negative, got {}",
                self.default_initial_variance
            )));
        }
        if self.max_state_dim == 0 {
            return Err(ConfigError::Invalid(
                "max_state_dim must be at least 1".to_string(),
            ));
        }

        for (kind, spec) in &self.sensor_noise {
            check_covariance(&format!("sensor_noise.{kind}"), &spec.0, self.max_state_dim)?;
        }
        if let Some(spec) = &self.initial_uncertainty {
            check_covariance("initial_uncertainty", &spec.0, self.max_state_dim)?;
        }
        Ok(())
    }

    /// The configured `R` for a sensor kind, if any.
    pub fn noise_for(&self, kind: SensorKind) -> Option<&DMatrix<f64>> {
        self.sensor_noise.get(&kind).map(|spec| &spec.0)
    }

    /// The covariance an init measurement seeds into a state of dimension `dim`.
    pub fn initial_uncertainty_for(&self, dim: usize) -> Result<DMatrix<f64>, MeasurementError> {
        match &self.initial_uncertainty {
            Some(spec) => {
                if spec.0.nrows() != dim {
                    return Err(MeasurementError::DimensionMismatch {
                        what: "initial uncertainty",
                        expected: dim,
                        found: spec.0.nrows(),
                    });
                }
                Ok(spec.0.clone())
            }
            None => Ok(DMatrix::identity(dim, dim) * self.default_initial_variance),
        }
    }
}

fn check_covariance(name: &str, m: &DMatrix<f64>, max_dim: usize) -> Result<(), ConfigError> {
    if m.nrows() == 0 || m.nrows() != m.ncols() {
        return Err(ConfigError::Invalid(format!(
            "{name} must be a non-empty square matrix, got {}x{}",
            m.nrows(),
            m.ncols()
        )));
    }
    if m.nrows() > max_dim {
        return Err(ConfigError::Invalid(format!(
            "{name} has dimension {} which exceeds max_state_dim {max_dim}",
            m.nrows()
        )));
    }
    if !all_finite(m) {
        return Err(ConfigError::Invalid(format!("{name} contains non-finite entries")));
    }
    if max_asymmetry(m) > SYMMETRY_TOLERANCE {
        return Err(ConfigError::Invalid(format!("{name} is not symmetric")));
    }
    if m.diagonal().iter().any(|&d| d < 0.0) {
        return Err(ConfigError::Invalid(format!(
            "{name} has a negative variance on its diagonal"
        )));
    }
    if !is_positive_semidefinite(m, PSD_TOLERANCE) {
        return Err(ConfigError::Invalid(format!(
            "{name} is not positive semi-definite"
        )));
    }
    Ok(())
}
