//! Feature-vector math: distance metric and covariance fusion.
//!
//! An entity's belief state is a mean feature vector and a symmetric
//! covariance, travelling together as a [`FeatureEstimate`]. Matching uses a
//! squared-Euclidean distance over all dimensions; fusing an observation into
//! an estimate is a classical linear (Kalman) correction with an identity
//! observation matrix:
//!
//! Gain:       K = P · (P + R)⁻¹
//! Mean:       x ← x + K·(z − x)
//! Covariance: P ← (I − K)·P
//!
//! The 128×128 inversion inside the gain is the dominant cost of the whole
//! pipeline. Implementations may special-case a diagonal covariance, but the
//! full-matrix semantics here are the contract.

use ndarray::{Array1, Array2};

use crate::error::FeatureError;

/// Length of a facial feature vector.
pub const FEATURE_DIM: usize = 128;

/// A facial feature vector.
pub type FeatureVector = Array1<f64>;

/// A symmetric covariance over a feature vector.
pub type FeatureCovariance = Array2<f64>;

// ---------------------------------------------------------------------------
// FeatureEstimate
// ---------------------------------------------------------------------------

/// A mean feature vector together with its covariance.
#[derive(Debug, Clone)]
pub struct FeatureEstimate {
    /// Mean feature vector.
    pub mean: FeatureVector,
    /// Covariance of the mean.
    pub covariance: FeatureCovariance,
}

impl FeatureEstimate {
    /// Construct an estimate from a mean and its covariance.
    pub fn new(mean: FeatureVector, covariance: FeatureCovariance) -> Self {
        Self { mean, covariance }
    }

    /// Fuse an observation into this estimate in place.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError::SingularCovariance`] if the innovation
    /// covariance `P + R` cannot be inverted, and
    /// [`FeatureError::DimensionMismatch`] on shape disagreement. The
    /// estimate is left untouched on error.
    pub fn fuse(&mut self, obs: &FeatureEstimate) -> Result<(), FeatureError> {
        let (mean, covariance) = fuse(&self.mean, &self.covariance, &obs.mean, &obs.covariance)?;
        self.mean = mean;
        self.covariance = covariance;
        Ok(())
    }

    /// Trace of the covariance: a scalar measure of estimate uncertainty.
    pub fn uncertainty(&self) -> f64 {
        self.covariance.diag().sum()
    }
}

// ---------------------------------------------------------------------------
// Distance
// ---------------------------------------------------------------------------

/// Squared Euclidean distance between two feature vectors, summed over all
/// dimensions.
///
/// A `NaN` result and an exact-zero result are flagged as errors rather than
/// silently accepted: `NaN` means a corrupt observation, and zero means a
/// duplicate or self-comparison. Callers scanning a candidate pool exclude
/// the offending pair and continue.
///
/// # Errors
///
/// - [`FeatureError::DimensionMismatch`] if the vectors differ in length.
/// - [`FeatureError::NonFiniteDistance`] if the sum is NaN or infinite.
/// - [`FeatureError::ZeroDistance`] if the sum is exactly `0.0`.
pub fn distance(a: &FeatureVector, b: &FeatureVector) -> Result<f64, FeatureError> {
    if a.len() != b.len() {
        return Err(FeatureError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let mut sum = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        let d = x - y;
        sum += d * d;
    }

    if !sum.is_finite() {
        return Err(FeatureError::NonFiniteDistance);
    }
    if sum == 0.0 {
        return Err(FeatureError::ZeroDistance);
    }
    Ok(sum)
}

// ---------------------------------------------------------------------------
// Kalman fusion
// ---------------------------------------------------------------------------

/// Kalman correction of `(mean, cov)` by an observation `(obs_mean, obs_cov)`
/// with an identity observation matrix.
///
/// Returns the corrected `(mean', cov')` pair without mutating the inputs.
///
/// # Errors
///
/// See [`FeatureEstimate::fuse`].
pub fn fuse(
    mean: &FeatureVector,
    cov: &FeatureCovariance,
    obs_mean: &FeatureVector,
    obs_cov: &FeatureCovariance,
) -> Result<(FeatureVector, FeatureCovariance), FeatureError> {
    let n = mean.len();
    if obs_mean.len() != n {
        return Err(FeatureError::DimensionMismatch {
            expected: n,
            actual: obs_mean.len(),
        });
    }
    if cov.nrows() != n || cov.ncols() != n {
        return Err(FeatureError::DimensionMismatch {
            expected: n,
            actual: cov.nrows(),
        });
    }
    if obs_cov.nrows() != n || obs_cov.ncols() != n {
        return Err(FeatureError::DimensionMismatch {
            expected: n,
            actual: obs_cov.nrows(),
        });
    }

    // K = P · (P + R)⁻¹
    let innovation_cov = cov + obs_cov;
    let gain = cov.dot(&invert(&innovation_cov)?);

    // x ← x + K·(z − x)
    let fused_mean = mean + &gain.dot(&(obs_mean - mean));

    // P ← (I − K)·P
    let fused_cov = (Array2::eye(n) - &gain).dot(cov);

    Ok((fused_mean, fused_cov))
}

/// Invert a square matrix by Gauss–Jordan elimination with partial pivoting.
///
/// Returns [`FeatureError::SingularCovariance`] when the best available pivot
/// falls below `1e-12`.
pub fn invert(m: &FeatureCovariance) -> Result<FeatureCovariance, FeatureError> {
    let n = m.nrows();
    if m.ncols() != n {
        return Err(FeatureError::DimensionMismatch {
            expected: n,
            actual: m.ncols(),
        });
    }

    let mut a = m.clone();
    let mut inv: Array2<f64> = Array2::eye(n);

    for col in 0..n {
        // Partial pivot: largest |value| in this column at or below the diagonal.
        let mut pivot_row = col;
        let mut pivot_abs = a[[col, col]].abs();
        for row in (col + 1)..n {
            let v = a[[row, col]].abs();
            if v > pivot_abs {
                pivot_abs = v;
                pivot_row = row;
            }
        }
        if pivot_abs < 1e-12 {
            return Err(FeatureError::SingularCovariance);
        }
        if pivot_row != col {
            for j in 0..n {
                a.swap([col, j], [pivot_row, j]);
                inv.swap([col, j], [pivot_row, j]);
            }
        }

        let pivot = a[[col, col]];
        for j in 0..n {
            a[[col, j]] /= pivot;
            inv[[col, j]] /= pivot;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                a[[row, j]] -= factor * a[[col, j]];
                inv[[row, j]] -= factor * inv[[col, j]];
            }
        }
    }

    Ok(inv)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    #[test]
    fn distance_is_symmetric() {
        let a = arr1(&[1.0, 2.0, 3.0, -4.0]);
        let b = arr1(&[0.5, -2.0, 3.5, 0.0]);
        let d_ab = distance(&a, &b).unwrap();
        let d_ba = distance(&b, &a).unwrap();
        assert!(
            (d_ab - d_ba).abs() < 1e-12,
            "distance must be symmetric: {} vs {}",
            d_ab,
            d_ba
        );
    }

    #[test]
    fn distance_rejects_nan() {
        let a = arr1(&[f64::NAN, 0.0]);
        let b = arr1(&[1.0, 0.0]);
        assert_eq!(distance(&a, &b), Err(FeatureError::NonFiniteDistance));
    }

    #[test]
    fn distance_rejects_exact_zero() {
        let a = arr1(&[1.0, 2.0, 3.0]);
        assert_eq!(distance(&a, &a.clone()), Err(FeatureError::ZeroDistance));
    }

    #[test]
    fn distance_rejects_dimension_mismatch() {
        let a = arr1(&[1.0, 2.0]);
        let b = arr1(&[1.0, 2.0, 3.0]);
        assert!(matches!(
            distance(&a, &b),
            Err(FeatureError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn invert_recovers_identity() {
        let m = arr2(&[[4.0, 1.0, 0.0], [1.0, 3.0, -1.0], [0.0, -1.0, 2.0]]);
        let inv = invert(&m).unwrap();
        let prod = m.dot(&inv);
        let eye: Array2<f64> = Array2::eye(3);
        for i in 0..3 {
            for j in 0..3 {
                assert!(
                    (prod[[i, j]] - eye[[i, j]]).abs() < 1e-9,
                    "M·M⁻¹ should be identity, got {} at ({}, {})",
                    prod[[i, j]],
                    i,
                    j
                );
            }
        }
    }

    #[test]
    fn invert_flags_singular_matrix() {
        let m = arr2(&[[1.0, 2.0], [2.0, 4.0]]);
        assert_eq!(invert(&m), Err(FeatureError::SingularCovariance));
    }

    /// Fusing an observation whose mean equals the estimate's own mean and
    /// whose covariance is very large (a weak observation) must leave the
    /// mean unchanged within floating-point tolerance.
    #[test]
    fn weak_identical_observation_is_idempotent_on_mean() {
        let mean = arr1(&[0.3, -0.7, 1.1]);
        let cov: Array2<f64> = Array2::eye(3) * 0.5;
        let weak_cov: Array2<f64> = Array2::eye(3) * 1e9;

        let (fused_mean, _) = fuse(&mean, &cov, &mean, &weak_cov).unwrap();
        for i in 0..3 {
            assert!(
                (fused_mean[i] - mean[i]).abs() < 1e-9,
                "mean[{}] drifted from {} to {}",
                i,
                mean[i],
                fused_mean[i]
            );
        }
    }

    /// Repeated fusion of identical observations strictly shrinks the trace
    /// of the covariance, monotonically.
    #[test]
    fn repeated_fusion_shrinks_uncertainty() {
        let obs_mean = arr1(&[1.0, 2.0, 3.0]);
        let obs_cov: Array2<f64> = Array2::eye(3) * 0.8;

        let mut estimate = FeatureEstimate::new(arr1(&[0.0, 0.0, 0.0]), Array2::eye(3) * 4.0);
        let mut prev_trace = estimate.uncertainty();

        for step in 0..5 {
            estimate
                .fuse(&FeatureEstimate::new(obs_mean.clone(), obs_cov.clone()))
                .unwrap();
            let trace = estimate.uncertainty();
            assert!(
                trace < prev_trace,
                "trace must strictly decrease at step {}: {} -> {}",
                step,
                prev_trace,
                trace
            );
            prev_trace = trace;
        }
    }

    /// After many fusions of the same observation the mean converges to it.
    #[test]
    fn fusion_converges_to_observation() {
        let obs = FeatureEstimate::new(arr1(&[5.0, -5.0]), Array2::eye(2) * 0.1);
        let mut estimate = FeatureEstimate::new(arr1(&[0.0, 0.0]), Array2::eye(2) * 10.0);

        for _ in 0..20 {
            estimate.fuse(&obs).unwrap();
        }
        assert!(
            (estimate.mean[0] - 5.0).abs() < 0.1,
            "mean should converge toward 5.0, got {}",
            estimate.mean[0]
        );
        assert!(
            (estimate.mean[1] + 5.0).abs() < 0.1,
            "mean should converge toward -5.0, got {}",
            estimate.mean[1]
        );
    }
}
