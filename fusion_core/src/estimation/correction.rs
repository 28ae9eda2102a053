// fusion_core/src/estimation/correction.rs

use nalgebra::{DMatrix, DVector};

use crate::error::MeasurementError;
use crate::frames::StateSnapshot;
use crate::types::{all_finite, symmetrize};

/// Smallest accepted squared Cholesky pivot of `S`, relative to its largest diagonal entry.
/// Anything smaller is treated as singular instead of producing an exploding gain.
const RELATIVE_PIVOT_TOLERANCE: f64 = 1e-12;

/// The generic inputs every sensor boils down to.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionInputs {
    /// Measurement Jacobian `H` (m x n).
    pub h: DMatrix<f64>,
    /// Residual `z - h(x)` (m).
    pub residual: DVector<f64>,
    /// Measurement noise covariance `R` (m x m).
    pub r: DMatrix<f64>,
}

/// The outcome of one Kalman update. Produced, then immediately folded into a snapshot.
#[derive(Debug, Clone)]
pub struct CorrectionResult {
    pub gain: DMatrix<f64>,
    pub delta: DVector<f64>,
    pub updated_covariance: DMatrix<f64>,
}

impl CorrectionResult {
    /// Commits the correction: `x += Δx`, `P = P'`.
    pub fn fold_into(self, snapshot: &mut StateSnapshot) {
        snapshot.vector += &self.delta;
        snapshot.covariance = self.updated_covariance;
        snapshot.normalize_orientation();
    }
}

/// Linearized Kalman update in Joseph form.
///
/// ```text
/// S  = H P Hᵀ + R
/// K  = P Hᵀ S⁻¹
/// Δx = K · res
/// P' = (I − K H) P (I − K H)ᵀ + K R Kᵀ
/// ```
///
/// `S` is factored with a Cholesky decomposition, never inverted explicitly.
/// All validation happens before anything is written, so a failed update leaves
/// the snapshot exactly as it was.
#[derive(Debug, Clone, Copy)]
pub struct CorrectionEngine {
    max_dim: usize,
}

impl CorrectionEngine {
    pub fn new(max_dim: usize) -> Self {
        Self { max_dim }
    }

    pub fn max_dim(&self) -> usize {
        self.max_dim
    }

    /// Computes the correction without touching the snapshot.
    pub fn compute(
        &self,
        snapshot: &StateSnapshot,
        inputs: &CorrectionInputs,
    ) -> Result<CorrectionResult, MeasurementError> {
        let n = snapshot.vector.len();
        let m = inputs.residual.len();
        self.check_dimensions(snapshot, inputs, n, m)?;

        if !all_finite(&inputs.h)
            || !all_finite(&inputs.r)
            || inputs.residual.iter().any(|v| !v.is_finite())
        {
            return Err(MeasurementError::ConversionFailed(
                "correction inputs contain non-finite values".to_string(),
            ));
        }

        let p = &snapshot.covariance;
        let ph_t = p * inputs.h.transpose(); // n x m

        // 1. Innovation covariance.
        let mut s = &inputs.h * &ph_t + &inputs.r;
        symmetrize(&mut s);
        let largest_diag = s.diagonal().iter().fold(0.0_f64, |acc, d| acc.max(d.abs()));

        let chol = s.cholesky().ok_or(MeasurementError::SingularInnovation)?;
        let smallest_pivot_sq = chol
            .l_dirty()
            .diagonal()
            .iter()
            .fold(f64::INFINITY, |acc, d| acc.min(d * d));
        if !(smallest_pivot_sq > RELATIVE_PIVOT_TOLERANCE * largest_diag.max(f64::MIN_POSITIVE)) {
            return Err(MeasurementError::SingularInnovation);
        }

        // 2. Gain. S is symmetric, so Kᵀ = S⁻¹ (P Hᵀ)ᵀ.
        let gain = chol.solve(&ph_t.transpose()).transpose(); // n x m

        // 3. State delta and Joseph-form covariance.
        let delta = &gain * &inputs.residual;
        let i_kh = DMatrix::<f64>::identity(n, n) - &gain * &inputs.h;
        let mut updated_covariance =
            &i_kh * p * i_kh.transpose() + &gain * &inputs.r * gain.transpose();
        symmetrize(&mut updated_covariance);

        if !all_finite(&updated_covariance) || delta.iter().any(|v| !v.is_finite()) {
            return Err(MeasurementError::SingularInnovation);
        }

        Ok(CorrectionResult {
            gain,
            delta,
            updated_covariance,
        })
    }

    /// Computes the correction and folds it into `snapshot` on success.
    pub fn apply(
        &self,
        snapshot: &mut StateSnapshot,
        inputs: &CorrectionInputs,
    ) -> Result<(), MeasurementError> {
        let result = self.compute(snapshot, inputs)?;
        result.fold_into(snapshot);
        Ok(())
    }

    fn check_dimensions(
        &self,
        snapshot: &StateSnapshot,
        inputs: &CorrectionInputs,
        n: usize,
        m: usize,
    ) -> Result<(), MeasurementError> {
        for dim in [n, m] {
            if dim > self.max_dim {
                return Err(MeasurementError::DimensionLimitExceeded {
                    dim,
                    max: self.max_dim,
                });
            }
        }
        let expect = |what, expected: usize, found: usize| {
            if expected == found {
                Ok(())
            } else {
                Err(MeasurementError::DimensionMismatch {
                    what,
                    expected,
                    found,
                })
            }
        };

        expect("state layout", snapshot.dim(), n)?;
        expect("covariance rows", n, snapshot.covariance.nrows())?;
        expect("covariance columns", n, snapshot.covariance.ncols())?;
        if m == 0 {
            return Err(MeasurementError::DimensionMismatch {
                what: "residual",
                expected: 1,
                found: 0,
            });
        }
        expect("jacobian rows", m, inputs.h.nrows())?;
        expect("jacobian columns", n, inputs.h.ncols())?;
        expect("noise covariance rows", m, inputs.r.nrows())?;
        expect("noise covariance columns", m, inputs.r.ncols())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::layout::{position_layout, standard_ins_state_layout};
    use crate::frames::{FrameId, StateVariable};
    use crate::types::{max_asymmetry, FrameHandle};
    use approx::assert_abs_diff_eq;

    fn scalar_snapshot(p: f64) -> StateSnapshot {
        StateSnapshot::new(vec![StateVariable::Px(FrameId::World)], p, 0.0)
    }

    fn gps_inputs(n: usize, residual: [f64; 3], r: f64) -> CorrectionInputs {
        let mut h = DMatrix::zeros(3, n);
        for i in 0..3 {
            h[(i, i)] = 1.0;
        }
        CorrectionInputs {
            h,
            residual: DVector::from_row_slice(&residual),
            r: DMatrix::identity(3, 3) * r,
        }
    }

    #[test]
    fn scalar_update_matches_closed_form() {
        let mut snapshot = scalar_snapshot(4.0);
        let inputs = CorrectionInputs {
            h: DMatrix::from_element(1, 1, 1.0),
            residual: DVector::from_element(1, 2.0),
            r: DMatrix::from_element(1, 1, 4.0),
        };

        let result = CorrectionEngine::new(8).compute(&snapshot, &inputs).unwrap();
        assert_abs_diff_eq!(result.gain[(0, 0)], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(result.delta[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(result.updated_covariance[(0, 0)], 2.0, epsilon = 1e-12);

        result.fold_into(&mut snapshot);
        assert_abs_diff_eq!(snapshot.vector[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn ins_update_keeps_covariance_symmetric_psd() {
        let mut snapshot = StateSnapshot::new(standard_ins_state_layout(FrameHandle(7)), 1.0, 0.0);
        // Correlated prior: add some position/velocity cross terms.
        for i in 0..3 {
            snapshot.covariance[(i, i + 3)] = 0.4;
            snapshot.covariance[(i + 3, i)] = 0.4;
            snapshot.covariance[(i, i)] = 10.0;
        }
        let inputs = gps_inputs(16, [1.0, -0.5, 0.25], 0.01);

        CorrectionEngine::new(64).apply(&mut snapshot, &inputs).unwrap();

        let p = &snapshot.covariance;
        assert!(max_asymmetry(p) < 1e-12);
        let eigen = p.clone().symmetric_eigen();
        assert!(eigen.eigenvalues.iter().all(|&l| l > -1e-9));
        // Position should now be tightly constrained by the low-noise fix.
        assert!(p[(0, 0)] < 0.011);
        assert_abs_diff_eq!(snapshot.vector[0], 1.0, epsilon = 1e-2);
        // Orientation is untouched by a position fix and stays normalized.
        assert_abs_diff_eq!(snapshot.vector.rows(6, 4).norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn singular_innovation_leaves_snapshot_untouched() {
        let mut snapshot = StateSnapshot::new(position_layout(), 0.0, 0.0);
        snapshot.vector[1] = 3.0;
        let before = snapshot.clone();
        let inputs = gps_inputs(3, [1.0, 1.0, 1.0], 0.0);

        let err = CorrectionEngine::new(8).apply(&mut snapshot, &inputs).unwrap_err();
        assert_eq!(err, MeasurementError::SingularInnovation);
        assert_eq!(snapshot, before);
    }

    #[test]
    fn near_singular_innovation_is_rejected() {
        // Two rows observing the same component with almost no noise.
        let snapshot = StateSnapshot::new(position_layout(), 1.0, 0.0);
        let inputs = CorrectionInputs {
            h: DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 0.0, 1.0, 0.0, 0.0]),
            residual: DVector::from_row_slice(&[1.0, 1.0]),
            r: DMatrix::identity(2, 2) * 1e-14,
        };
        assert_eq!(
            CorrectionEngine::new(8).compute(&snapshot, &inputs).unwrap_err(),
            MeasurementError::SingularInnovation
        );
    }

    #[test]
    fn mismatched_jacobian_is_rejected_before_any_write() {
        let mut snapshot = StateSnapshot::new(position_layout(), 1.0, 0.0);
        let before = snapshot.clone();
        let inputs = gps_inputs(5, [1.0, 1.0, 1.0], 1.0);

        let err = CorrectionEngine::new(8).apply(&mut snapshot, &inputs).unwrap_err();
        assert_eq!(
            err,
            MeasurementError::DimensionMismatch {
                what: "jacobian columns",
                expected: 3,
                found: 5
            }
        );
        assert_eq!(snapshot, before);
    }

    #[test]
    fn oversized_state_hits_dimension_limit() {
        let snapshot = StateSnapshot::new(standard_ins_state_layout(FrameHandle(1)), 1.0, 0.0);
        let inputs = gps_inputs(16, [0.0; 3], 1.0);
        assert_eq!(
            CorrectionEngine::new(8).compute(&snapshot, &inputs).unwrap_err(),
            MeasurementError::DimensionLimitExceeded { dim: 16, max: 8 }
        );
    }
}
