// fusion_core/src/measurement/invalid.rs

use crate::error::MeasurementError;
use crate::models::measurement::SensorKind;
use crate::types::Timestamp;

/// Stand-in for a measurement whose conversion failed.
///
/// Producers queue this instead of aborting, so one bad reading never stalls the
/// rest of the queue. Applying it always fails and touches nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidMeasurement {
    time: Timestamp,
    source: Option<SensorKind>,
    cause: MeasurementError,
}

impl InvalidMeasurement {
    pub fn new(time: Timestamp, source: Option<SensorKind>, cause: MeasurementError) -> Self {
        Self {
            time,
            source,
            cause,
        }
    }

    pub fn time(&self) -> Timestamp {
        self.time
    }

    /// The sensor kind whose conversion failed, if known.
    pub fn source(&self) -> Option<SensorKind> {
        self.source
    }

    pub fn cause(&self) -> &MeasurementError {
        &self.cause
    }

    pub fn apply(self) -> Result<(), MeasurementError> {
        Err(MeasurementError::Invalid {
            cause: Box::new(self.cause),
        })
    }
}
