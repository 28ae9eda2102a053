// fusion_core/src/frames.rs

use nalgebra::{DMatrix, DVector, Quaternion, UnitQuaternion, Vector3};
use std::hash::Hash;

use crate::types::{FrameHandle, Timestamp};

pub mod layout;

/// A unique, hashable identifier for any coordinate frame the filter talks about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FrameId {
    /// The global ENU navigation frame.
    World,
    /// The origin of the rigid body being estimated.
    Body(FrameHandle),
    /// The specific origin of a sensor component.
    Sensor(FrameHandle),
}

/// An enum that defines every variable that can exist in a state vector.
/// The FrameId specifies which frame the variable is expressed in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StateVariable {
    // --- Cartesian Position ---
    Px(FrameId),
    Py(FrameId),
    Pz(FrameId),
    // --- Cartesian Velocity ---
    Vx(FrameId),
    Vy(FrameId),
    Vz(FrameId),
    // --- Acceleration (or accelerometer bias when expressed in Body) ---
    Ax(FrameId),
    Ay(FrameId),
    Az(FrameId),
    // --- Orientation (as a quaternion) ---
    // Represents the rotation FROM the first frame TO the second frame.
    Qx(FrameId, FrameId),
    Qy(FrameId, FrameId),
    Qz(FrameId, FrameId),
    Qw(FrameId, FrameId),
    // --- Angular Velocity (or gyroscope bias when expressed in Body) ---
    Wx(FrameId),
    Wy(FrameId),
    Wz(FrameId),
    // --- Magnetic Field ---
    MagX(FrameId),
    MagY(FrameId),
    MagZ(FrameId),
}

/// One time-indexed estimate: state vector, covariance and the bookkeeping that
/// travels with them.
///
/// Snapshots are what corrections mutate. The head snapshot is the live estimate;
/// older ones are retained by the `StateHistoryBuffer` so delayed measurements can
/// be applied at their true time.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    /// The ordered "schema" of the state vector.
    pub layout: Vec<StateVariable>,
    /// The actual numerical data vector `x`.
    pub vector: DVector<f64>,
    /// The covariance matrix `P`.
    pub covariance: DMatrix<f64>,
    /// The time this estimate is valid at.
    pub time: Timestamp,
    /// Per-component flag, set once a component has been seeded by an init measurement.
    pub reset_flags: Vec<bool>,
    /// Raw gyroscope reading associated with this snapshot (rad/s, body frame).
    pub gyro_measured: Vector3<f64>,
    /// Raw accelerometer reading associated with this snapshot (m/s^2, body frame).
    pub accel_measured: Vector3<f64>,
}

impl StateSnapshot {
    /// Creates a new snapshot with a given layout, initializing the vector to zero
    /// (with a valid identity quaternion) and the covariance to a scaled identity matrix.
    pub fn new(layout: Vec<StateVariable>, initial_covariance_val: f64, time: Timestamp) -> Self {
        let dim = layout.len();
        let mut vector = DVector::zeros(dim);

        // A zero quaternion is not a rotation. Start every orientation at identity.
        for (i, var) in layout.iter().enumerate() {
            if matches!(var, StateVariable::Qw(_, _)) {
                vector[i] = 1.0;
            }
        }

        Self {
            layout,
            vector,
            covariance: DMatrix::identity(dim, dim) * initial_covariance_val,
            time,
            reset_flags: vec![false; dim],
            gyro_measured: Vector3::zeros(),
            accel_measured: Vector3::zeros(),
        }
    }

    /// Returns the dimension (number of rows) of the state vector.
    pub fn dim(&self) -> usize {
        self.layout.len()
    }

    /// Finds the index of a specific `StateVariable` in the layout.
    pub fn find_idx(&self, var: &StateVariable) -> Option<usize> {
        self.layout.iter().position(|v| v == var)
    }

    /// Reads three consecutive entries starting at `first`.
    pub fn get_vector3(&self, first: &StateVariable) -> Option<Vector3<f64>> {
        let idx = self.find_idx(first)?;
        if idx + 3 > self.vector.len() {
            return None;
        }
        Some(Vector3::new(
            self.vector[idx],
            self.vector[idx + 1],
            self.vector[idx + 2],
        ))
    }

    /// Index of the first `Qx` in the layout, whatever its frame pair. Models that
    /// track a specific body resolve their own index instead. The four entries are stored contiguously as `[x, y, z, w]`.
    pub fn orientation_idx(&self) -> Option<usize> {
        let idx = self
            .layout
            .iter()
            .position(|v| matches!(v, StateVariable::Qx(_, _)))?;
        (idx + 4 <= self.vector.len()).then_some(idx)
    }

    /// The orientation stored at `orientation_idx`.
    pub fn get_orientation(&self) -> Option<UnitQuaternion<f64>> {
        let idx = self.orientation_idx()?;
        let v = &self.vector;
        let q = Quaternion::new(v[idx + 3], v[idx], v[idx + 1], v[idx + 2]);
        if q.norm() < 1e-9 {
            return None;
        }
        Some(UnitQuaternion::from_quaternion(q))
    }

    /// Re-normalizes every quaternion block after an additive correction.
    pub fn normalize_orientation(&mut self) {
        let dim = self.vector.len();
        for idx in 0..self.layout.len() {
            if matches!(self.layout[idx], StateVariable::Qx(_, _)) && idx + 4 <= dim {
                let mut q = self.vector.rows_mut(idx, 4);
                let norm = q.norm();
                if norm > 1e-9 {
                    q /= norm;
                }
            }
        }
    }

    /// `true` once every component has been seeded by some init measurement.
    pub fn is_fully_initialized(&self) -> bool {
        self.reset_flags.iter().all(|&flag| flag)
    }
}
