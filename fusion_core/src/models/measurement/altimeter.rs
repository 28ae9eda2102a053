// fusion_core/src/models/measurement/altimeter.rs

use nalgebra::{DMatrix, DVector};
use std::ops::RangeInclusive;

use crate::config::FilterConfig;
use crate::error::MeasurementError;
use crate::frames::{FrameId, StateSnapshot, StateVariable};
use crate::messages::AltitudeSample;
use crate::models::measurement::{check_noise, require_idx, SensorKind, SensorModel};

/// Height above the world origin, observing `Pz(World)`.
#[derive(Debug, Clone)]
pub struct AltimeterModel {
    noise_covariance: DMatrix<f64>,
    height_idx: usize,
    state_dim: usize,
    /// Readings outside this range are treated as sensor faults.
    plausible_range: RangeInclusive<f64>,
}

impl AltimeterModel {
    pub fn new(
        layout: &[StateVariable],
        noise_covariance: DMatrix<f64>,
        plausible_range: RangeInclusive<f64>,
    ) -> Result<Self, MeasurementError> {
        check_noise(&noise_covariance, 1)?;
        Ok(Self {
            noise_covariance,
            height_idx: require_idx(layout, &StateVariable::Pz(FrameId::World))?,
            state_dim: layout.len(),
            plausible_range,
        })
    }

    pub fn from_config(
        layout: &[StateVariable],
        config: &FilterConfig,
        plausible_range: RangeInclusive<f64>,
    ) -> Result<Self, MeasurementError> {
        let r = config
            .noise_for(Self::KIND)
            .cloned()
            .ok_or(MeasurementError::NoiseNotConfigured(Self::KIND))?;
        Self::new(layout, r, plausible_range)
    }
}

impl SensorModel for AltimeterModel {
    type Reading = AltitudeSample;

    const KIND: SensorKind = SensorKind::Altimeter;

    fn measurement_dim(&self) -> usize {
        1
    }

    fn state_dim(&self) -> usize {
        self.state_dim
    }

    fn noise_covariance(&self) -> &DMatrix<f64> {
        &self.noise_covariance
    }

    fn convert_reading(&self, reading: &AltitudeSample) -> Result<DVector<f64>, MeasurementError> {
        if !self.plausible_range.contains(&reading.height) {
            // NaN also ends up here, `contains` is false for it.
            return Err(MeasurementError::ConversionFailed(format!(
                "altitude {} outside plausible range {:?}",
                reading.height, self.plausible_range
            )));
        }
        Ok(DVector::from_element(1, reading.height))
    }

    fn predict_measurement(&self, snapshot: &StateSnapshot) -> DVector<f64> {
        DVector::from_element(1, snapshot.vector[self.height_idx])
    }

    fn calculate_jacobian(&self, snapshot: &StateSnapshot) -> DMatrix<f64> {
        let mut h_jac = DMatrix::zeros(1, snapshot.dim());
        h_jac[(0, self.height_idx)] = 1.0;
        h_jac
    }
}
