// fusion_core/src/measurement/mod.rs

//! The measurement variants the core accepts.
//!
//! The set is closed: every sensor kind gets its own `TypedMeasurement<S>`
//! variant, plus the init and invalid variants. `apply` dispatches by `match`.

use std::sync::Arc;

use crate::diagnostics::DiagnosticEvent;
use crate::error::MeasurementError;
use crate::estimation::FilterContext;
use crate::frames::StateSnapshot;
use crate::models::measurement::{
    AltimeterModel, GpsModel, MagnetometerModel, SensorKind, SensorModel,
};
use crate::types::Timestamp;

pub mod init;
pub mod invalid;
pub mod typed;

pub use init::InitMeasurement;
pub use invalid::InvalidMeasurement;
pub use typed::TypedMeasurement;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasurementKind {
    Sensor(SensorKind),
    Init,
    Invalid,
}

#[derive(Debug)]
pub enum Measurement {
    Gps(TypedMeasurement<GpsModel>),
    Magnetometer(TypedMeasurement<MagnetometerModel>),
    Altimeter(TypedMeasurement<AltimeterModel>),
    Init(InitMeasurement),
    Invalid(InvalidMeasurement),
}

impl Measurement {
    /// Converts a raw reading. If conversion fails the result is an
    /// `Invalid` measurement carrying the cause, never an error.
    pub fn from_reading<S>(model: Arc<S>, reading: &S::Reading, time: Timestamp) -> Self
    where
        S: SensorModel,
        TypedMeasurement<S>: Into<Measurement>,
    {
        match TypedMeasurement::from_reading(model, reading, time) {
            Ok(typed) => typed.into(),
            Err(cause) => Measurement::Invalid(InvalidMeasurement::new(time, Some(S::KIND), cause)),
        }
    }

    pub fn time(&self) -> Timestamp {
        match self {
            Measurement::Gps(m) => m.time(),
            Measurement::Magnetometer(m) => m.time(),
            Measurement::Altimeter(m) => m.time(),
            Measurement::Init(m) => m.time(),
            Measurement::Invalid(m) => m.time(),
        }
    }

    pub fn kind(&self) -> MeasurementKind {
        match self {
            Measurement::Gps(_) => MeasurementKind::Sensor(SensorKind::Gps),
            Measurement::Magnetometer(_) => MeasurementKind::Sensor(SensorKind::Magnetometer),
            Measurement::Altimeter(_) => MeasurementKind::Sensor(SensorKind::Altimeter),
            Measurement::Init(_) => MeasurementKind::Init,
            Measurement::Invalid(_) => MeasurementKind::Invalid,
        }
    }

    /// Applies this measurement to `head`, resolving delayed measurements through
    /// `ctx.history`. Consumes the measurement, so it can only ever run once.
    ///
    /// On failure nothing is mutated and the error is also reported to
    /// `ctx.diagnostics`.
    pub fn apply(
        self,
        head: &mut StateSnapshot,
        ctx: &mut FilterContext<'_>,
    ) -> Result<(), MeasurementError> {
        let time = self.time();
        let kind = self.kind();

        let result = match self {
            Measurement::Gps(m) => m.apply(head, ctx),
            Measurement::Magnetometer(m) => m.apply(head, ctx),
            Measurement::Altimeter(m) => m.apply(head, ctx),
            Measurement::Init(m) => m.apply(head, ctx),
            Measurement::Invalid(m) => m.apply(),
        };

        if let Err(error) = &result {
            ctx.report(DiagnosticEvent::MeasurementRejected {
                time,
                kind,
                error: error.clone(),
            });
        }
        result
    }
}

impl From<TypedMeasurement<GpsModel>> for Measurement {
    fn from(m: TypedMeasurement<GpsModel>) -> Self {
        Measurement::Gps(m)
    }
}

impl From<TypedMeasurement<MagnetometerModel>> for Measurement {
    fn from(m: TypedMeasurement<MagnetometerModel>) -> Self {
        Measurement::Magnetometer(m)
    }
}

impl From<TypedMeasurement<AltimeterModel>> for Measurement {
    fn from(m: TypedMeasurement<AltimeterModel>) -> Self {
        Measurement::Altimeter(m)
    }
}

impl From<InitMeasurement> for Measurement {
    fn from(m: InitMeasurement) -> Self {
        Measurement::Init(m)
    }
}

impl From<InvalidMeasurement> for Measurement {
    fn from(m: InvalidMeasurement) -> Self {
        Measurement::Invalid(m)
    }
}
