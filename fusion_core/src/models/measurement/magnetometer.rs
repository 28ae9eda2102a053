// fusion_core/src/models/measurement/magnetometer.rs

use nalgebra::{DMatrix, DVector, Quaternion, UnitQuaternion, Vector3};

use crate::config::FilterConfig;
use crate::error::MeasurementError;
use crate::frames::{FrameId, StateSnapshot, StateVariable};
use crate::messages::MagneticFieldSample;
use crate::models::measurement::{check_noise, finite_reading, require_idx, SensorKind, SensorModel};
use crate::types::FrameHandle;

/// Step used for the finite-difference Jacobian.
const JACOBIAN_EPSILON: f64 = 1e-8;

/// A measurement model for a 3-axis magnetometer.
///
/// This model relates a measured magnetic field vector to the filter's
/// orientation state, providing an absolute heading reference.
#[derive(Debug, Clone)]
pub struct MagnetometerModel {
    /// The 3x3 measurement noise covariance matrix, R.
    r_matrix: DMatrix<f64>,
    /// The "true" magnetic field vector in the world (ENU) frame.
    world_magnetic_field: Vector3<f64>,
    /// Index of `Qx(Body, World)`; the quaternion occupies four entries from here.
    orientation_idx: usize,
    state_dim: usize,
}

impl MagnetometerModel {
    pub fn new(
        layout: &[StateVariable],
        agent_handle: FrameHandle,
        r_matrix: DMatrix<f64>,
        world_magnetic_field: Vector3<f64>,
    ) -> Result<Self, MeasurementError> {
        check_noise(&r_matrix, 3)?;
        let orientation_idx = require_idx(
            layout,
            &StateVariable::Qx(FrameId::Body(agent_handle), FrameId::World),
        )?;
        if orientation_idx + 4 > layout.len() {
            return Err(MeasurementError::MissingStateVariable(
                "a full [x, y, z, w] orientation block".to_string(),
            ));
        }
        if !(world_magnetic_field.norm() > 0.0) {
            return Err(MeasurementError::ConversionFailed(
                "world magnetic field must be a non-zero vector".to_string(),
            ));
        }
        Ok(Self {
            r_matrix,
            world_magnetic_field,
            orientation_idx,
            state_dim: layout.len(),
        })
    }

    /// Builds the model with the `magnetometer` noise from the configuration.
    pub fn from_config(
        layout: &[StateVariable],
        agent_handle: FrameHandle,
        config: &FilterConfig,
        world_magnetic_field: Vector3<f64>,
    ) -> Result<Self, MeasurementError> {
        let r = config
            .noise_for(Self::KIND)
            .cloned()
            .ok_or(MeasurementError::NoiseNotConfigured(Self::KIND))?;
        Self::new(layout, agent_handle, r, world_magnetic_field)
    }

    /// Body -> World orientation of this agent, read from its own `[x, y, z, w]` block.
    fn orientation(&self, snapshot: &StateSnapshot) -> UnitQuaternion<f64> {
        let idx = self.orientation_idx;
        let v = &snapshot.vector;
        if idx + 4 > v.len() {
            return UnitQuaternion::identity();
        }
        let q = Quaternion::new(v[idx + 3], v[idx], v[idx + 1], v[idx + 2]);
        if q.norm() < 1e-9 {
            return UnitQuaternion::identity();
        }
        UnitQuaternion::from_quaternion(q)
    }
}

impl SensorModel for MagnetometerModel {
    type Reading = MagneticFieldSample;

    const KIND: SensorKind = SensorKind::Magnetometer;

    fn measurement_dim(&self) -> usize {
        3
    }

    fn state_dim(&self) -> usize {
        self.state_dim
    }

    fn noise_covariance(&self) -> &DMatrix<f64> {
        &self.r_matrix
    }

    fn convert_reading(
        &self,
        reading: &MagneticFieldSample,
    ) -> Result<DVector<f64>, MeasurementError> {
        let z = finite_reading(DVector::from_row_slice(reading.field.as_slice()), Self::KIND)?;
        if z.norm() == 0.0 {
            return Err(MeasurementError::ConversionFailed(
                "magnetometer reading is a zero vector".to_string(),
            ));
        }
        Ok(z)
    }

    fn predict_measurement(&self, snapshot: &StateSnapshot) -> DVector<f64> {
        // Predict what the magnetometer should see by taking the true world
        // magnetic field and rotating it into the body frame.
        let q_body_from_world = self.orientation(snapshot).inverse();
        let predicted_mag_body = q_body_from_world * self.world_magnetic_field;
        DVector::from_row_slice(predicted_mag_body.as_slice())
    }

    /// Calculates the Jacobian H using numerical differentiation.
    fn calculate_jacobian(&self, snapshot: &StateSnapshot) -> DMatrix<f64> {
        let state_dim = snapshot.dim();
        let mut h_jac = DMatrix::zeros(3, state_dim);
        let z_base = self.predict_measurement(snapshot);
        let q_range = self.orientation_idx..self.orientation_idx + 4;

        for j in 0..state_dim {
            let mut perturbed = snapshot.clone();
            perturbed.vector[j] += JACOBIAN_EPSILON;

            // Re-normalize if we're perturbing the quaternion part.
            if q_range.contains(&j) {
                let mut q = perturbed.vector.rows_mut(self.orientation_idx, 4);
                let norm = q.norm();
                if norm > 1e-9 {
                    q /= norm;
                }
            }

            let derivative_column = (self.predict_measurement(&perturbed) - &z_base) / JACOBIAN_EPSILON;
            h_jac.column_mut(j).copy_from(&derivative_column);
        }

        h_jac
    }
}
