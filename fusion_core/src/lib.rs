// fusion_core/src/lib.rs

//! Measurement-application core of an extended Kalman filter.
//!
//! Sensor readings become [`measurement::Measurement`]s, wait in a
//! [`estimation::MeasurementScheduler`] and are applied in time order. A measurement
//! older than the head is corrected against the retained
//! [`estimation::StateHistoryBuffer`] and handed back to the filter core for
//! re-propagation.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod estimation;
pub mod frames;
pub mod measurement;
pub mod messages;
pub mod models;
pub mod prelude;
pub mod types;
