// fusion_core/src/types.rs

use nalgebra::{DMatrix, DVector};

// --- Core Type Aliases ---
pub type State = DVector<f64>;
pub type Covariance = DMatrix<f64>;

/// Time in seconds. Every timestamp in the core shares one clock.
pub type Timestamp = f64;

// --- Core Identifier ---
// A generic, framework-agnostic identifier. On a real robot this might be a
// hardware ID, in a simulator the bits of an entity ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FrameHandle(pub u64);

/// Returns `true` if every entry of the matrix is finite.
pub(crate) fn all_finite(m: &DMatrix<f64>) -> bool {
    m.iter().all(|v| v.is_finite())
}

/// Largest absolute asymmetry `|m[i,j] - m[j,i]|` of a square matrix.
pub(crate) fn max_asymmetry(m: &DMatrix<f64>) -> f64 {
    let n = m.nrows();
    let mut worst = 0.0_f64;
    for i in 0..n {
        for j in (i + 1)..n {
            worst = worst.max((m[(i, j)] - m[(j, i)]).abs());
        }
    }
    worst
}

/// Replaces `m` with `(m + mᵀ) / 2`.
pub(crate) fn symmetrize(m: &mut DMatrix<f64>) {
    let n = m.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = 0.5 * (m[(i, j)] + m[(j, i)]);
            m[(i, j)] = avg;
            m[(j, i)] = avg;
        }
    }
}

/// Returns `true` if the symmetric matrix `m` has no eigenvalue below `-tolerance`
/// scaled by its largest eigenvalue magnitude (at least 1).
pub(crate) fn is_positive_semidefinite(m: &DMatrix<f64>, tolerance: f64) -> bool {
    let eigenvalues = m.symmetric_eigenvalues();
    let scale = eigenvalues.iter().fold(1.0_f64, |acc, e| acc.max(e.abs()));
    eigenvalues.iter().all(|&e| e >= -tolerance * scale)
}
