// fusion_core/src/messages.rs

use nalgebra::Vector3;

// =========================================================================
// == Raw Sensor Readings ==
// =========================================================================
// These are what sensor adapters hand to the core. Each `SensorModel` names
// one of them as its `Reading` type and converts it into a measurement vector.

/// A position fix already projected into the local world (ENU) frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsFix {
    pub position: Vector3<f64>,
}

/// A 3-axis magnetic field sample in the sensor (body) frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagneticFieldSample {
    pub field: Vector3<f64>,
}

/// A barometric or range-based height above the world origin, in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AltitudeSample {
    pub height: f64,
}

/// Raw 6-DOF IMU sample. Used to seed the snapshot's gyro/accel fields during
/// staged initialization.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImuSample {
    /// Angular velocity in rad/s, body frame.
    pub gyro: Vector3<f64>,
    /// Specific force in m/s^2, body frame.
    pub accel: Vector3<f64>,
}
