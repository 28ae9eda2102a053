// fusion_core/src/measurement/init.rs

use nalgebra::{DMatrix, DVector};

use crate::diagnostics::DiagnosticEvent;
use crate::error::MeasurementError;
use crate::estimation::FilterContext;
use crate::frames::StateSnapshot;
use crate::messages::ImuSample;
use crate::config::PSD_TOLERANCE;
use crate::types::{all_finite, is_positive_semidefinite, max_asymmetry, Timestamp};

/// A measurement that seeds some, or all, of the state.
///
/// Initialization can be split across sensors: each one builds its own
/// `InitMeasurement`, flags only the components it knows about, and applying them
/// in any order never overwrites what another sensor seeded.
///
/// A component's flag is set by the setter and has to be cleared explicitly before
/// the component can be set again.
#[derive(Debug, Clone, PartialEq)]
pub struct InitMeasurement {
    time: Timestamp,
    values: DVector<f64>,
    flags: Vec<bool>,
    contains_initial_sensor_readings: bool,
    imu: ImuSample,
    initial_covariance: Option<DMatrix<f64>>,
}

impl InitMeasurement {
    pub fn new(
        state_dim: usize,
        time: Timestamp,
        contains_initial_sensor_readings: bool,
    ) -> Result<Self, MeasurementError> {
        if !time.is_finite() {
            return Err(MeasurementError::ConversionFailed(
                "init measurement has a non-finite timestamp".to_string(),
            ));
        }
        Ok(Self {
            time,
            values: DVector::zeros(state_dim),
            flags: vec![false; state_dim],
            contains_initial_sensor_readings,
            imu: ImuSample::default(),
            initial_covariance: None,
        })
    }

    pub fn time(&self) -> Timestamp {
        self.time
    }

    pub fn state_dim(&self) -> usize {
        self.flags.len()
    }

    fn check_index(&self, index: usize) -> Result<(), MeasurementError> {
        if index < self.flags.len() {
            Ok(())
        } else {
            Err(MeasurementError::ComponentOutOfRange {
                index,
                dim: self.flags.len(),
            })
        }
    }

    /// Stores `value` for component `index` and flags it.
    pub fn set_component_init_value(
        &mut self,
        index: usize,
        value: f64,
    ) -> Result<(), MeasurementError> {
        self.check_index(index)?;
        if self.flags[index] {
            return Err(MeasurementError::AlreadySet { index });
        }
        if !value.is_finite() {
            return Err(MeasurementError::ConversionFailed(format!(
                "init value for component {index} is not finite"
            )));
        }
        self.values[index] = value;
        self.flags[index] = true;
        Ok(())
    }

    /// Seeds `values.len()` consecutive components starting at `start`.
    /// Either all of them are set or none is.
    pub fn set_block_init_value(
        &mut self,
        start: usize,
        values: &[f64],
    ) -> Result<(), MeasurementError> {
        if values.is_empty() {
            return Ok(());
        }
        let end = start
            .checked_add(values.len())
            .ok_or(MeasurementError::ComponentOutOfRange {
                index: start,
                dim: self.flags.len(),
            })?;
        self.check_index(end - 1)?;
        if let Some(index) = (start..end).find(|&i| self.flags[i]) {
            return Err(MeasurementError::AlreadySet { index });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(MeasurementError::ConversionFailed(format!(
                "init block starting at component {start} is not finite"
            )));
        }
        for (offset, &value) in values.iter().enumerate() {
            self.values[start + offset] = value;
            self.flags[start + offset] = true;
        }
        Ok(())
    }

    /// Clears the flag for `index`. The stored value is kept. Clearing twice is fine.
    pub fn clear_component_init_value(&mut self, index: usize) -> Result<(), MeasurementError> {
        self.check_index(index)?;
        self.flags[index] = false;
        Ok(())
    }

    pub fn get_component_init_value(&self, index: usize) -> Result<f64, MeasurementError> {
        self.check_index(index)?;
        if !self.flags[index] {
            return Err(MeasurementError::NotSet { index });
        }
        Ok(self.values[index])
    }

    pub fn has_init_value(&self, index: usize) -> bool {
        self.flags.get(index).copied().unwrap_or(false)
    }

    /// Indices of every flagged component, ascending.
    pub fn flagged_components(&self) -> impl Iterator<Item = usize> + '_ {
        self.flags
            .iter()
            .enumerate()
            .filter_map(|(i, &flag)| flag.then_some(i))
    }

    pub fn contains_initial_sensor_readings(&self) -> bool {
        self.contains_initial_sensor_readings
    }

    /// Raw gyro/accel readings to copy into the snapshot. Only used when the
    /// measurement was created with `contains_initial_sensor_readings`.
    pub fn set_imu_readings(&mut self, imu: ImuSample) {
        self.imu = imu;
    }

    pub fn imu_readings(&self) -> &ImuSample {
        &self.imu
    }

    /// Overrides the configured initial uncertainty for this measurement only.
    pub fn set_initial_covariance(&mut self, p0: DMatrix<f64>) -> Result<(), MeasurementError> {
        let n = self.state_dim();
        for found in [p0.nrows(), p0.ncols()] {
            if found != n {
                return Err(MeasurementError::DimensionMismatch {
                    what: "initial covariance",
                    expected: n,
                    found,
                });
            }
        }
        if !all_finite(&p0) || max_asymmetry(&p0) > 1e-9 {
            return Err(MeasurementError::ConversionFailed(
                "initial covariance must be finite and symmetric".to_string(),
            ));
        }
        if !is_positive_semidefinite(&p0, PSD_TOLERANCE) {
            return Err(MeasurementError::ConversionFailed(
                "initial covariance must be positive semi-definite".to_string(),
            ));
        }
        self.initial_covariance = Some(p0);
        Ok(())
    }

    pub fn initial_covariance(&self) -> Option<&DMatrix<f64>> {
        self.initial_covariance.as_ref()
    }

    /// Writes every flagged component into `snapshot` and resets its covariance.
    ///
    /// For the seeded set, rows and columns of `P` are replaced by the matching
    /// entries of the initial uncertainty. Cross terms with components this
    /// measurement does not seed are zeroed.
    pub fn apply(
        self,
        snapshot: &mut StateSnapshot,
        ctx: &mut FilterContext<'_>,
    ) -> Result<(), MeasurementError> {
        let n = snapshot.dim();
        let expect = |what, found: usize| {
            if found == n {
                Ok(())
            } else {
                Err(MeasurementError::DimensionMismatch {
                    what,
                    expected: n,
                    found,
                })
            }
        };
        expect("init measurement", self.state_dim())?;
        expect("state vector", snapshot.vector.len())?;
        expect("covariance rows", snapshot.covariance.nrows())?;
        expect("covariance columns", snapshot.covariance.ncols())?;
        if n > ctx.config.max_state_dim {
            return Err(MeasurementError::DimensionLimitExceeded {
                dim: n,
                max: ctx.config.max_state_dim,
            });
        }

        let seeded: Vec<usize> = self.flagged_components().collect();
        let p0 = match self.initial_covariance {
            Some(p0) => p0,
            None => ctx.config.initial_uncertainty_for(n)?,
        };

        let mut vector = snapshot.vector.clone();
        let mut covariance = snapshot.covariance.clone();
        for &i in &seeded {
            vector[i] = self.values[i];
            for j in 0..n {
                let value = if self.flags[j] { p0[(i, j)] } else { 0.0 };
                covariance[(i, j)] = value;
                covariance[(j, i)] = value;
            }
        }

        // Nothing can fail past this point.
        snapshot.vector = vector;
        snapshot.covariance = covariance;
        snapshot.reset_flags.resize(n, false);
        for &i in &seeded {
            snapshot.reset_flags[i] = true;
        }
        if self.contains_initial_sensor_readings {
            snapshot.gyro_measured = self.imu.gyro;
            snapshot.accel_measured = self.imu.accel;
        }

        ctx.record(snapshot.clone());
        ctx.report(DiagnosticEvent::ComponentsInitialized {
            time: self.time,
            components: seeded,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterConfig;
    use crate::diagnostics::RecordingSink;
    use crate::estimation::{FilterCore, StateHistoryBuffer};
    use crate::frames::layout::{standard_ins_state_layout, INS_GYRO_BIAS_IDX};
    use crate::types::FrameHandle;
    use nalgebra::Vector3;

    struct NoCore;

    impl FilterCore for NoCore {
        fn reapply_from(&mut self, _: Timestamp, _: &mut StateHistoryBuffer, _: &mut StateSnapshot) {}
    }

    fn ins_snapshot() -> StateSnapshot {
        let mut snapshot = StateSnapshot::new(standard_ins_state_layout(FrameHandle(1)), 5.0, 0.0);
        // Fully coupled prior so zeroed cross terms are visible.
        snapshot.covariance.fill(0.5);
        snapshot.covariance.fill_diagonal(5.0);
        snapshot
    }

    fn apply_init(init: InitMeasurement, snapshot: &mut StateSnapshot, config: &FilterConfig) -> RecordingSink {
        let mut history = StateHistoryBuffer::new(config.max_delay_window);
        let mut sink = RecordingSink::default();
        let mut core = NoCore;
        let mut ctx = FilterContext {
            history: &mut history,
            core: &mut core,
            diagnostics: &mut sink,
            config,
        };
        init.apply(snapshot, &mut ctx).unwrap();
        assert_eq!(history.len(), 1);
        sink
    }

    #[test]
    fn set_once_until_cleared() {
        let mut init = InitMeasurement::new(4, 0.0, false).unwrap();
        assert_eq!(
            init.get_component_init_value(2),
            Err(MeasurementError::NotSet { index: 2 })
        );
        init.set_component_init_value(2, 1.5).unwrap();
        assert_eq!(init.get_component_init_value(2), Ok(1.5));
        assert_eq!(
            init.set_component_init_value(2, 3.0),
            Err(MeasurementError::AlreadySet { index: 2 })
        );

        init.clear_component_init_value(2).unwrap();
        init.clear_component_init_value(2).unwrap();
        assert!(!init.has_init_value(2));
        init.set_component_init_value(2, 3.0).unwrap();
        assert_eq!(init.get_component_init_value(2), Ok(3.0));

        assert_eq!(
            init.set_component_init_value(4, 0.0),
            Err(MeasurementError::ComponentOutOfRange { index: 4, dim: 4 })
        );
    }

    #[test]
    fn block_setter_is_all_or_nothing() {
        let mut init = InitMeasurement::new(6, 0.0, false).unwrap();
        init.set_component_init_value(4, 1.0).unwrap();
        assert_eq!(
            init.set_block_init_value(3, &[7.0, 8.0, 9.0]),
            Err(MeasurementError::AlreadySet { index: 4 })
        );
        assert!(!init.has_init_value(3));
        init.set_block_init_value(0, &[7.0, 8.0, 9.0]).unwrap();
        assert_eq!(init.flagged_components().collect::<Vec<_>>(), vec![0, 1, 2, 4]);
    }

    #[test]
    fn block_setter_rejects_out_of_range_starts() {
        let mut init = InitMeasurement::new(6, 0.0, false).unwrap();
        assert_eq!(
            init.set_block_init_value(usize::MAX, &[1.0]),
            Err(MeasurementError::ComponentOutOfRange {
                index: usize::MAX,
                dim: 6
            })
        );
        assert_eq!(
            init.set_block_init_value(usize::MAX - 1, &[1.0, 2.0, 3.0]),
            Err(MeasurementError::ComponentOutOfRange {
                index: usize::MAX - 1,
                dim: 6
            })
        );
        assert_eq!(
            init.set_block_init_value(5, &[1.0, 2.0]),
            Err(MeasurementError::ComponentOutOfRange { index: 6, dim: 6 })
        );
        assert_eq!(init.flagged_components().count(), 0);
    }

    #[test]
    fn apply_seeds_only_flagged_components() {
        let config = FilterConfig {
            default_initial_variance: 0.1,
            ..FilterConfig::default()
        };
        let mut snapshot = ins_snapshot();
        snapshot.vector[3] = -4.0;

        let mut init = InitMeasurement::new(16, 0.0, false).unwrap();
        init.set_block_init_value(0, &[1.0, 2.0, 3.0]).unwrap();
        let sink = apply_init(init, &mut snapshot, &config);

        assert_eq!(
            snapshot.vector.iter().take(3).copied().collect::<Vec<_>>(),
            vec![1.0, 2.0, 3.0]
        );
        assert_eq!(snapshot.vector[3], -4.0);
        assert_eq!(snapshot.covariance[(0, 0)], 0.1);
        assert_eq!(snapshot.covariance[(0, 1)], 0.0);
        assert_eq!(snapshot.covariance[(0, 5)], 0.0);
        assert_eq!(snapshot.covariance[(5, 0)], 0.0);
        // Unseeded block keeps its coupling.
        assert_eq!(snapshot.covariance[(4, 5)], 0.5);
        assert_eq!(&snapshot.reset_flags[..4], &[true, true, true, false]);
        assert_eq!(
            sink.events,
            vec![DiagnosticEvent::ComponentsInitialized {
                time: 0.0,
                components: vec![0, 1, 2]
            }]
        );
    }

    #[test]
    fn disjoint_inits_commute() {
        let config = FilterConfig::default();

        let build = || {
            let mut position = InitMeasurement::new(16, 0.0, false).unwrap();
            position.set_block_init_value(0, &[1.0, 2.0, 3.0]).unwrap();
            let mut bias = InitMeasurement::new(16, 0.0, true).unwrap();
            bias.set_block_init_value(INS_GYRO_BIAS_IDX, &[0.01, 0.02, 0.03])
                .unwrap();
            bias.set_imu_readings(ImuSample {
                gyro: Vector3::new(0.1, 0.0, 0.0),
                accel: Vector3::new(0.0, 0.0, 9.81),
            });
            (position, bias)
        };

        let mut a = ins_snapshot();
        let (position, bias) = build();
        apply_init(position, &mut a, &config);
        apply_init(bias, &mut a, &config);

        let mut b = ins_snapshot();
        let (position, bias) = build();
        apply_init(bias, &mut b, &config);
        apply_init(position, &mut b, &config);

        assert_eq!(a.vector, b.vector);
        assert_eq!(a.covariance, b.covariance);
        assert_eq!(a.vector[1], 2.0);
        assert_eq!(a.vector[INS_GYRO_BIAS_IDX + 2], 0.03);
        assert_eq!(a.vector[9], 1.0);
        assert_eq!(a.accel_measured, Vector3::new(0.0, 0.0, 9.81));
        assert!(!a.is_fully_initialized());
    }

    #[test]
    fn per_measurement_covariance_overrides_config() {
        let config = FilterConfig::default();
        let mut snapshot = ins_snapshot();
        let mut init = InitMeasurement::new(16, 0.0, false).unwrap();
        init.set_component_init_value(0, 1.0).unwrap();
        init.set_initial_covariance(DMatrix::identity(16, 16) * 0.25)
            .unwrap();
        apply_init(init, &mut snapshot, &config);
        assert_eq!(snapshot.covariance[(0, 0)], 0.25);

        let mut wrong = InitMeasurement::new(16, 0.0, false).unwrap();
        assert!(matches!(
            wrong.set_initial_covariance(DMatrix::identity(3, 3)),
            Err(MeasurementError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn indefinite_initial_covariance_is_rejected() {
        let mut init = InitMeasurement::new(2, 0.0, false).unwrap();
        let indefinite = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        assert!(matches!(
            init.set_initial_covariance(indefinite),
            Err(MeasurementError::ConversionFailed(_))
        ));
        assert!(init.initial_covariance().is_none());
    }

    #[test]
    fn seeded_covariance_stays_psd_through_a_correction() {
        use crate::estimation::{CorrectionEngine, CorrectionInputs};
        use crate::frames::layout::position_layout;
        use crate::types::is_positive_semidefinite;

        let config = FilterConfig::from_toml_str(
            "initial_uncertainty = [[1.0, 0.5, 0.0], [0.5, 1.0, 0.0], [0.0, 0.0, 1.0]]",
        )
        .unwrap();
        let mut snapshot = StateSnapshot::new(position_layout(), 10.0, 0.0);
        let mut init = InitMeasurement::new(3, 0.0, false).unwrap();
        init.set_block_init_value(0, &[0.0, 0.0, 5.0]).unwrap();
        apply_init(init, &mut snapshot, &config);
        assert!(is_positive_semidefinite(&snapshot.covariance, 1e-9));

        let inputs = CorrectionInputs {
            h: DMatrix::from_row_slice(1, 3, &[0.0, 0.0, 1.0]),
            residual: DVector::from_element(1, 0.3),
            r: DMatrix::from_element(1, 1, 0.04),
        };
        CorrectionEngine::new(config.max_state_dim)
            .apply(&mut snapshot, &inputs)
            .unwrap();
        assert!(is_positive_semidefinite(&snapshot.covariance, 1e-9));
    }

    #[test]
    fn dimension_mismatch_leaves_snapshot_alone() {
        let config = FilterConfig::default();
        let mut snapshot = ins_snapshot();
        let before = snapshot.clone();
        let mut init = InitMeasurement::new(3, 0.0, false).unwrap();
        init.set_component_init_value(0, 1.0).unwrap();

        let mut history = StateHistoryBuffer::new(1.0);
        let mut sink = RecordingSink::default();
        let mut core = NoCore;
        let mut ctx = FilterContext {
            history: &mut history,
            core: &mut core,
            diagnostics: &mut sink,
            config: &config,
        };
        assert!(matches!(
            init.apply(&mut snapshot, &mut ctx),
            Err(MeasurementError::DimensionMismatch { .. })
        ));
        assert_eq!(snapshot, before);
        assert!(history.is_empty());
    }
}
