// fusion_core/src/models/measurement/gps.rs

use nalgebra::{DMatrix, DVector};

use crate::config::FilterConfig;
use crate::error::MeasurementError;
use crate::frames::{FrameId, StateSnapshot, StateVariable};
use crate::messages::GpsFix;
use crate::models::measurement::{check_noise, finite_reading, require_idx, SensorKind, SensorModel};

/// World-frame position fix. Observes `Px`, `Py`, `Pz` directly.
#[derive(Debug, Clone)]
pub struct GpsModel {
    // The R matrix for this sensor
    noise_covariance: DMatrix<f64>,
    /// Indices of Px, Py, Pz in the state layout.
    position_idx: [usize; 3],
    state_dim: usize,
}

impl GpsModel {
    pub fn new(
        layout: &[StateVariable],
        noise_covariance: DMatrix<f64>,
    ) -> Result<Self, MeasurementError> {
        check_noise(&noise_covariance, 3)?;
        let position_idx = [
            require_idx(layout, &StateVariable::Px(FrameId::World))?,
            require_idx(layout, &StateVariable::Py(FrameId::World))?,
            require_idx(layout, &StateVariable::Pz(FrameId::World))?,
        ];
        Ok(Self {
            noise_covariance,
            position_idx,
            state_dim: layout.len(),
        })
    }

    /// Builds the model with the `gps` noise from the configuration.
    pub fn from_config(
        layout: &[StateVariable],
        config: &FilterConfig,
    ) -> Result<Self, MeasurementError> {
        let r = config
            .noise_for(Self::KIND)
            .cloned()
            .ok_or(MeasurementError::NoiseNotConfigured(Self::KIND))?;
        Self::new(layout, r)
    }
}

impl SensorModel for GpsModel {
    type Reading = GpsFix;

    const KIND: SensorKind = SensorKind::Gps;

    fn measurement_dim(&self) -> usize {
        3
    }

    fn state_dim(&self) -> usize {
        self.state_dim
    }

    fn noise_covariance(&self) -> &DMatrix<f64> {
        &self.noise_covariance
    }

    fn convert_reading(&self, reading: &GpsFix) -> Result<DVector<f64>, MeasurementError> {
        finite_reading(
            DVector::from_row_slice(reading.position.as_slice()),
            Self::KIND,
        )
    }

    fn predict_measurement(&self, snapshot: &StateSnapshot) -> DVector<f64> {
        DVector::from_iterator(3, self.position_idx.iter().map(|&i| snapshot.vector[i]))
    }

    fn calculate_jacobian(&self, snapshot: &StateSnapshot) -> DMatrix<f64> {
        // The Jacobian H must be size (measurement_dims x state_dims)
        let mut h_jac = DMatrix::zeros(3, snapshot.dim());
        for (row, &col) in self.position_idx.iter().enumerate() {
            h_jac[(row, col)] = 1.0;
        }
        h_jac
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::layout::standard_ins_state_layout;
    use crate::types::FrameHandle;
    use nalgebra::Vector3;

    #[test]
    fn jacobian_selects_position_block() {
        let layout = standard_ins_state_layout(FrameHandle(3));
        let model = GpsModel::new(&layout, DMatrix::identity(3, 3)).unwrap();
        let mut snapshot = StateSnapshot::new(layout, 1.0, 0.0);
        snapshot.vector[2] = 5.0;

        let h = model.calculate_jacobian(&snapshot);
        assert_eq!(h.shape(), (3, 16));
        assert_eq!(h[(2, 2)], 1.0);
        assert_eq!(h.sum(), 3.0);
        assert_eq!(model.predict_measurement(&snapshot)[2], 5.0);
    }

    #[test]
    fn rejects_wrong_noise_size_and_nan_fix() {
        let layout = standard_ins_state_layout(FrameHandle(3));
        assert!(matches!(
            GpsModel::new(&layout, DMatrix::identity(2, 2)),
            Err(MeasurementError::DimensionMismatch { .. })
        ));
        let indefinite = DMatrix::from_row_slice(3, 3, &[1.0, 2.0, 0.0, 2.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        assert!(matches!(
            GpsModel::new(&layout, indefinite),
            Err(MeasurementError::ConversionFailed(_))
        ));

        let model = GpsModel::new(&layout, DMatrix::identity(3, 3)).unwrap();
        let fix = GpsFix {
            position: Vector3::new(0.0, f64::NAN, 0.0),
        };
        assert!(matches!(
            model.convert_reading(&fix),
            Err(MeasurementError::ConversionFailed(_))
        ));
    }

    #[test]
    fn layout_without_position_is_rejected() {
        let layout = vec![StateVariable::Vx(FrameId::World)];
        assert!(matches!(
            GpsModel::new(&layout, DMatrix::identity(3, 3)),
            Err(MeasurementError::MissingStateVariable(_))
        ));
    }
}
