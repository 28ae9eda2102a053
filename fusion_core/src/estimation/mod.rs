// fusion_core/src/estimation/mod.rs

use crate::config::FilterConfig;
use crate::diagnostics::{DiagnosticEvent, DiagnosticSink};
use crate::error::MeasurementError;
use crate::frames::StateSnapshot;
use crate::measurement::Measurement;
use crate::types::Timestamp;

pub mod correction;
pub mod filters;
pub mod history;
pub mod scheduler;

pub use correction::{CorrectionEngine, CorrectionInputs, CorrectionResult};
pub use history::StateHistoryBuffer;
pub use scheduler::MeasurementScheduler;

/// The Filter-Core collaborator: owns propagation, which this crate does not.
///
/// After a delayed measurement corrects a historical snapshot, the core asks it to
/// bring every newer snapshot, and the head, back in line with that correction.
/// Whether intervening corrections are replayed or only the propagation transform
/// is reapplied is up to the implementation.
pub trait FilterCore {
    fn reapply_from(
        &mut self,
        time: Timestamp,
        history: &mut StateHistoryBuffer,
        head: &mut StateSnapshot,
    );
}

/// Everything a measurement may touch besides the snapshot it is applied to.
/// Built by the owning loop for each `apply` call.
pub struct FilterContext<'a> {
    /// Retained past snapshots, for delayed measurements.
    pub history: &'a mut StateHistoryBuffer,
    /// Re-propagation hook.
    pub core: &'a mut dyn FilterCore,
    /// Where failures and diagnostics go.
    pub diagnostics: &'a mut dyn DiagnosticSink,
    pub config: &'a FilterConfig,
}

impl FilterContext<'_> {
    pub fn engine(&self) -> CorrectionEngine {
        CorrectionEngine::new(self.config.max_state_dim)
    }

    pub fn report(&mut self, event: DiagnosticEvent) {
        self.diagnostics.report(event);
    }

    /// Stores a copy of `snapshot` in the history and reports any eviction.
    pub fn record(&mut self, snapshot: StateSnapshot) {
        let evicted = self.history.insert(snapshot);
        if evicted > 0 {
            let window_start = self.history.window_start().unwrap_or(f64::NEG_INFINITY);
            self.report(DiagnosticEvent::SnapshotsEvicted {
                count: evicted,
                window_start,
            });
        }
    }
}

/// The contract for any algorithm that performs the "State Estimator" role.
pub trait StateEstimator {
    /// Applies one measurement. Failures are already reported to the diagnostics
    /// sink when this returns `Err`.
    fn process(&mut self, measurement: Measurement) -> Result<(), MeasurementError>;

    /// Returns a reference to the current best estimate of the state.
    fn get_state(&self) -> &StateSnapshot;
}
