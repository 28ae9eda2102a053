// fusion_core/src/error.rs

use thiserror::Error;

use crate::models::measurement::SensorKind;
use crate::types::Timestamp;

/// Everything that can go wrong while building or applying a measurement.
///
/// None of these are fatal. The owning loop logs them through its
/// `DiagnosticSink` and moves on to the next queued measurement.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeasurementError {
    /// The raw reading could not be turned into correction inputs.
    #[error("sensor reading could not be converted: {0}")]
    ConversionFailed(String),

    /// `H`, `R`, the residual or the covariance disagree on a dimension.
    #[error("dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("dimension {dim} exceeds the configured limit of {max}")]
    DimensionLimitExceeded { dim: usize, max: usize },

    /// The measurement predates everything still retained in the history window.
    #[error("measurement at t={time} predates the retained history (window starts at t={window_start})")]
    TooOld {
        time: Timestamp,
        window_start: Timestamp,
    },

    #[error("innovation covariance is singular or numerically indefinite")]
    SingularInnovation,

    #[error("no init value has been set for component {index}")]
    NotSet { index: usize },

    #[error("component {index} already holds an init value, clear it before setting again")]
    AlreadySet { index: usize },

    #[error("component {index} is out of range for a state of dimension {dim}")]
    ComponentOutOfRange { index: usize, dim: usize },

    #[error("no noise covariance configured for {0}")]
    NoiseNotConfigured(SensorKind),

    #[error("state layout has no entry for {0}")]
    MissingStateVariable(String),

    /// Returned by the invalid sentinel; carries why the measurement could not be built.
    #[error("invalid measurement: {cause}")]
    Invalid { cause: Box<MeasurementError> },
}

/// Failures while loading or validating a `FilterConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load filter configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid filter configuration: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}
