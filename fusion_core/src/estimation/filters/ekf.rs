// fusion_core/src/estimation/filters/ekf.rs

use crate::config::FilterConfig;
use crate::diagnostics::{DiagnosticEvent, DiagnosticSink};
use crate::error::MeasurementError;
use crate::estimation::{
    FilterContext, FilterCore, MeasurementScheduler, StateEstimator, StateHistoryBuffer,
};
use crate::frames::StateSnapshot;
use crate::measurement::Measurement;

/// Counts from one `process_pending` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub applied: usize,
    pub rejected: usize,
}

/// An EKF measurement stage that tolerates out-of-order delivery.
///
/// Owns the head estimate, the retained history and the collaborators, and feeds
/// measurements through `Measurement::apply` one at a time. Prediction stays with
/// the caller: whoever propagates the state hands each new head to `advance_head`.
pub struct DelayedEkf<C: FilterCore> {
    /// The current state of the filter (x, P, t).
    head: StateSnapshot,
    history: StateHistoryBuffer,
    config: FilterConfig,
    core: C,
    diagnostics: Box<dyn DiagnosticSink + Send>,
}

impl<C: FilterCore> DelayedEkf<C> {
    /// Creates a new filter. The initial state is also the first history entry.
    pub fn new(
        initial_state: StateSnapshot,
        config: FilterConfig,
        core: C,
        diagnostics: Box<dyn DiagnosticSink + Send>,
    ) -> Self {
        let mut history = StateHistoryBuffer::new(config.max_delay_window);
        history.insert(initial_state.clone());
        Self {
            head: initial_state,
            history,
            config,
            core,
            diagnostics,
        }
    }

    pub fn head(&self) -> &StateSnapshot {
        &self.head
    }

    pub fn history(&self) -> &StateHistoryBuffer {
        &self.history
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn core(&self) -> &C {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut C {
        &mut self.core
    }

    /// Installs a newly propagated head and records it in the history.
    pub fn advance_head(&mut self, snapshot: StateSnapshot) {
        let evicted = self.history.insert(snapshot.clone());
        if evicted > 0 {
            self.diagnostics.report(DiagnosticEvent::SnapshotsEvicted {
                count: evicted,
                window_start: self.history.window_start().unwrap_or(f64::NEG_INFINITY),
            });
        }
        self.head = snapshot;
    }

    /// Applies one measurement against the head.
    pub fn apply_measurement(&mut self, measurement: Measurement) -> Result<(), MeasurementError> {
        let mut ctx = FilterContext {
            history: &mut self.history,
            core: &mut self.core,
            diagnostics: self.diagnostics.as_mut(),
            config: &self.config,
        };
        measurement.apply(&mut self.head, &mut ctx)
    }

    /// Drains the scheduler until it is empty. A failed measurement is dropped and
    /// the next one is processed.
    pub fn process_pending(&mut self, scheduler: &MeasurementScheduler) -> ProcessSummary {
        let mut summary = ProcessSummary::default();
        while let Some(measurement) = scheduler.drain_next() {
            match self.apply_measurement(measurement) {
                Ok(()) => summary.applied += 1,
                Err(_) => summary.rejected += 1,
            }
        }
        summary
    }
}

// --- The Public Trait Implementation ---
impl<C: FilterCore> StateEstimator for DelayedEkf<C> {
    fn process(&mut self, measurement: Measurement) -> Result<(), MeasurementError> {
        self.apply_measurement(measurement)
    }

    fn get_state(&self) -> &StateSnapshot {
        &self.head
    }
}
