// fusion_core/src/prelude.rs

// --- Core Abstractions (The main contracts of the library) ---
pub use crate::diagnostics::{DiagnosticEvent, DiagnosticSink, LogSink, NullSink, RecordingSink};
pub use crate::estimation::{FilterContext, FilterCore, StateEstimator};
pub use crate::models::measurement::{SensorKind, SensorModel};

// --- Core Data Structures (The "nouns" of the library) ---
pub use crate::config::FilterConfig;
pub use crate::error::{ConfigError, MeasurementError};
pub use crate::frames::{FrameId, StateSnapshot, StateVariable};
pub use crate::messages::{AltitudeSample, GpsFix, ImuSample, MagneticFieldSample};
pub use crate::types::{Covariance, FrameHandle, State, Timestamp};

// --- Estimation Algorithms ---
pub use crate::estimation::filters::{DelayedEkf, ProcessSummary};
pub use crate::estimation::{CorrectionEngine, MeasurementScheduler, StateHistoryBuffer};

// --- Measurements and Concrete Sensor Models ---
pub use crate::measurement::{
    InitMeasurement, InvalidMeasurement, Measurement, MeasurementKind, TypedMeasurement,
};
pub use crate::models::measurement::{AltimeterModel, GpsModel, MagnetometerModel};
