// fusion_core/src/diagnostics.rs

//! Structured failure and diagnostic events.
//!
//! The core never logs on its own. Every event goes through the `DiagnosticSink`
//! carried by the `FilterContext`, and the host decides where it ends up.

use crate::error::MeasurementError;
use crate::measurement::MeasurementKind;
use crate::types::Timestamp;

#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticEvent {
    /// A measurement was dropped without touching any snapshot.
    MeasurementRejected {
        time: Timestamp,
        kind: MeasurementKind,
        error: MeasurementError,
    },
    /// A measurement was applied behind the head and re-propagation was requested.
    DelayedCorrection {
        measurement_time: Timestamp,
        snapshot_time: Timestamp,
        head_time: Timestamp,
    },
    /// Inserting a snapshot pushed older ones out of the retained window.
    SnapshotsEvicted { count: usize, window_start: Timestamp },
    /// An init measurement seeded these state components.
    ComponentsInitialized {
        time: Timestamp,
        components: Vec<usize>,
    },
}

/// The Logger collaborator.
pub trait DiagnosticSink {
    fn report(&mut self, event: DiagnosticEvent);
}

/// Forwards events to the `log` facade. Rejections are warnings, the rest is debug.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&mut self, event: DiagnosticEvent) {
        match event {
            DiagnosticEvent::MeasurementRejected { time, kind, error } => {
                log::warn!("dropping {kind:?} measurement at t={time:.6}: {error}");
            }
            DiagnosticEvent::DelayedCorrection {
                measurement_time,
                snapshot_time,
                head_time,
            } => {
                log::debug!(
                    "delayed measurement t={measurement_time:.6} applied at snapshot t={snapshot_time:.6} (head t={head_time:.6})"
                );
            }
            DiagnosticEvent::SnapshotsEvicted {
                count,
                window_start,
            } => {
                log::debug!("evicted {count} snapshot(s) older than t={window_start:.6}");
            }
            DiagnosticEvent::ComponentsInitialized { time, components } => {
                log::debug!("init at t={time:.6} seeded components {components:?}");
            }
        }
    }
}

/// Keeps every event in memory. Used by tests and offline replay tools.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub events: Vec<DiagnosticEvent>,
}

impl RecordingSink {
    pub fn rejections(&self) -> impl Iterator<Item = &MeasurementError> {
        self.events.iter().filter_map(|event| match event {
            DiagnosticEvent::MeasurementRejected { error, .. } => Some(error),
            _ => None,
        })
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&mut self, event: DiagnosticEvent) {
        self.events.push(event);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn report(&mut self, _event: DiagnosticEvent) {}
}
