// fusion_core/src/models/measurement/mod.rs

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

use crate::config::PSD_TOLERANCE;
use crate::error::MeasurementError;
use crate::frames::{StateSnapshot, StateVariable};
use crate::types::{all_finite, is_positive_semidefinite, max_asymmetry};

/// The closed set of sensor kinds the core knows how to fuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Gps,
    Magnetometer,
    Altimeter,
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorKind::Gps => "gps",
            SensorKind::Magnetometer => "magnetometer",
            SensorKind::Altimeter => "altimeter",
        };
        f.write_str(name)
    }
}

// --- SENSOR MODEL TRAIT ---
// Represents the mathematical model of a sensor. `z = h(x) + v`
pub trait SensorModel: Debug + Send + Sync {
    /// The raw reading a sensor adapter hands over.
    type Reading: Debug;

    const KIND: SensorKind;

    /// Number of rows of `z`.
    fn measurement_dim(&self) -> usize;

    /// Dimension of the state layout this model was built against.
    fn state_dim(&self) -> usize;

    /// Returns the measurement noise covariance matrix `R`.
    fn noise_covariance(&self) -> &DMatrix<f64>;

    /// Turns a raw reading into the measurement vector `z`.
    /// Degenerate readings (NaN, out of range) fail with `ConversionFailed`.
    fn convert_reading(&self, reading: &Self::Reading) -> Result<DVector<f64>, MeasurementError>;

    /// Predicts the ideal measurement `z_pred = h(x)` from a snapshot.
    fn predict_measurement(&self, snapshot: &StateSnapshot) -> DVector<f64>;

    /// Calculates the measurement Jacobian `H = ∂h/∂x` at a snapshot.
    fn calculate_jacobian(&self, snapshot: &StateSnapshot) -> DMatrix<f64>;
}

/// Resolves the index of `var` in `layout`, or reports which variable is missing.
pub(crate) fn require_idx(
    layout: &[StateVariable],
    var: &StateVariable,
) -> Result<usize, MeasurementError> {
    layout
        .iter()
        .position(|v| v == var)
        .ok_or_else(|| MeasurementError::MissingStateVariable(format!("{var:?}")))
}

/// Checks a configured `R` against the sensor's measurement dimension. `R` must
/// also be finite, symmetric and positive semi-definite.
pub(crate) fn check_noise(
    noise_covariance: &DMatrix<f64>,
    measurement_dim: usize,
) -> Result<(), MeasurementError> {
    for found in [noise_covariance.nrows(), noise_covariance.ncols()] {
        if found != measurement_dim {
            return Err(MeasurementError::DimensionMismatch {
                what: "noise covariance",
                expected: measurement_dim,
                found,
            });
        }
    }
    if !all_finite(noise_covariance)
        || max_asymmetry(noise_covariance) > PSD_TOLERANCE
        || !is_positive_semidefinite(noise_covariance, PSD_TOLERANCE)
    {
        return Err(MeasurementError::ConversionFailed(
            "noise covariance must be a finite, symmetric PSD matrix".to_string(),
        ));
    }
    Ok(())
}

/// Rejects readings containing NaN or infinities.
pub(crate) fn finite_reading(z: DVector<f64>, kind: SensorKind) -> Result<DVector<f64>, MeasurementError> {
    if z.iter().all(|v| v.is_finite()) {
        Ok(z)
    } else {
        Err(MeasurementError::ConversionFailed(format!(
            "{kind} reading contains non-finite values"
        )))
    }
}

pub mod altimeter;
pub mod gps;
pub mod magnetometer;

pub use altimeter::AltimeterModel;
pub use gps::GpsModel;
pub use magnetometer::MagnetometerModel;
