// fusion_core/src/measurement/typed.rs

use nalgebra::{DMatrix, DVector};
use std::sync::Arc;

use crate::diagnostics::DiagnosticEvent;
use crate::error::MeasurementError;
use crate::estimation::{CorrectionInputs, FilterContext};
use crate::frames::StateSnapshot;
use crate::models::measurement::SensorModel;
use crate::types::Timestamp;

/// A sensor reading converted into what the correction step needs.
///
/// `z` and `R` are fixed at construction. `H` and the residual depend on the state
/// the correction lands on, so they are evaluated against whichever snapshot delay
/// resolution picks.
#[derive(Debug)]
pub struct TypedMeasurement<S: SensorModel> {
    time: Timestamp,
    model: Arc<S>,
    z: DVector<f64>,
    r: DMatrix<f64>,
}

impl<S: SensorModel> TypedMeasurement<S> {
    pub fn from_reading(
        model: Arc<S>,
        reading: &S::Reading,
        time: Timestamp,
    ) -> Result<Self, MeasurementError> {
        if !time.is_finite() {
            return Err(MeasurementError::ConversionFailed(format!(
                "{} reading has a non-finite timestamp",
                S::KIND
            )));
        }

        let m = model.measurement_dim();
        let z = model.convert_reading(reading)?;
        if z.len() != m {
            return Err(MeasurementError::DimensionMismatch {
                what: "measurement vector",
                expected: m,
                found: z.len(),
            });
        }

        let r = model.noise_covariance().clone();
        if r.nrows() != m || r.ncols() != m {
            return Err(MeasurementError::DimensionMismatch {
                what: "noise covariance",
                expected: m,
                found: if r.nrows() != m { r.nrows() } else { r.ncols() },
            });
        }

        Ok(Self { time, model, z, r })
    }

    pub fn time(&self) -> Timestamp {
        self.time
    }

    pub fn z(&self) -> &DVector<f64> {
        &self.z
    }

    pub fn model(&self) -> &S {
        &self.model
    }

    /// `H`, `res = z - h(x)` and `R`, evaluated at `snapshot`.
    pub fn correction_inputs(
        &self,
        snapshot: &StateSnapshot,
    ) -> Result<CorrectionInputs, MeasurementError> {
        if snapshot.dim() != self.model.state_dim() {
            return Err(MeasurementError::DimensionMismatch {
                what: "state dimension",
                expected: self.model.state_dim(),
                found: snapshot.dim(),
            });
        }
        let h = self.model.calculate_jacobian(snapshot);
        let residual = &self.z - self.model.predict_measurement(snapshot);
        Ok(CorrectionInputs {
            h,
            residual,
            r: self.r.clone(),
        })
    }

    /// Corrects `head` directly, or, for a measurement older than the head, the
    /// retained snapshot at or just before its time followed by re-propagation.
    pub fn apply(
        self,
        head: &mut StateSnapshot,
        ctx: &mut FilterContext<'_>,
    ) -> Result<(), MeasurementError> {
        let engine = ctx.engine();

        if self.time >= head.time {
            let inputs = self.correction_inputs(head)?;
            engine.apply(head, &inputs)?;
            ctx.record(head.clone());
            return Ok(());
        }

        let window_start = head.time - ctx.config.max_delay_window;
        let too_old = MeasurementError::TooOld {
            time: self.time,
            window_start,
        };
        if self.time < window_start {
            return Err(too_old);
        }

        let target = ctx.history.find_at_or_before(self.time).ok_or(too_old)?;
        let inputs = self.correction_inputs(target)?;
        engine.apply(target, &inputs)?;
        let snapshot_time = target.time;

        ctx.report(DiagnosticEvent::DelayedCorrection {
            measurement_time: self.time,
            snapshot_time,
            head_time: head.time,
        });
        ctx.core.reapply_from(snapshot_time, &mut *ctx.history, head);
        Ok(())
    }
}
