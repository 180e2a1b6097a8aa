//! Jacobian determinant of a displacement field
//!
//! A displacement field `u` maps every point `x` to `x + u(x)`. The local
//! volume change of that mapping is `det(I + du_i/dx_j)`: 1 means no change,
//! values in `(0, 1)` compression, values above 1 expansion, and values <= 0
//! a folded (non-invertible) deformation. Determinants are never clamped so
//! folding stays visible.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::{AnalysisError, Result};
use crate::grid::{Geometry, ScalarVolume, VectorField};
use crate::progress::AnalysisProgress;

/// Output of [`compute_jacobian`]
#[derive(Debug, Clone, PartialEq)]
pub struct JacobianResult {
    /// Determinant per voxel, on the field's geometry
    pub determinant: ScalarVolume,
    pub min_jacobian: f64,
    pub max_jacobian: f64,
    /// Voxels whose determinant is zero or negative
    pub folding_voxel_count: usize,
}

impl JacobianResult {
    #[must_use]
    pub fn has_folding(&self) -> bool {
        self.folding_voxel_count > 0
    }
}

/// Partial derivative of the displacement along `axis` at voxel `at`.
///
/// Central difference inside the grid, one-sided at the edges, zero along an
/// axis with a single voxel.
fn partial_derivative(field: &VectorField, at: [usize; 3], axis: usize) -> [f64; 3] {
    let geometry = field.geometry();
    let n = geometry.dims[axis];
    if n < 2 {
        return [0.0; 3];
    }

    let c = at[axis];
    let (lo, hi) = if c == 0 {
        (0, 1)
    } else if c == n - 1 {
        (n - 2, n - 1)
    } else {
        (c - 1, c + 1)
    };

    let mut lo_at = at;
    let mut hi_at = at;
    lo_at[axis] = lo;
    hi_at[axis] = hi;
    let u_lo = field.get(lo_at[0], lo_at[1], lo_at[2]);
    let u_hi = field.get(hi_at[0], hi_at[1], hi_at[2]);
    let dx = (hi - lo) as f64 * geometry.spacing[axis];

    [
        (u_hi[0] - u_lo[0]) / dx,
        (u_hi[1] - u_lo[1]) / dx,
        (u_hi[2] - u_lo[2]) / dx,
    ]
}

#[inline]
fn determinant(m: [[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Jacobian determinant of `x -> x + u(x)` at one voxel
fn voxel_jacobian(field: &VectorField, at: [usize; 3]) -> f64 {
    let columns = [
        partial_derivative(field, at, 0),
        partial_derivative(field, at, 1),
        partial_derivative(field, at, 2),
    ];
    // m[i][j] = delta_ij + du_i/dx_j
    let mut m = [[0.0; 3]; 3];
    for (i, row) in m.iter_mut().enumerate() {
        for (j, entry) in row.iter_mut().enumerate() {
            *entry = columns[j][i] + if i == j { 1.0 } else { 0.0 };
        }
    }
    determinant(m)
}

/// Extrema and folding count for one partition
#[derive(Debug, Clone, Copy)]
struct JacobianTally {
    min: f64,
    max: f64,
    folding: usize,
}

impl Default for JacobianTally {
    fn default() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            folding: 0,
        }
    }
}

impl JacobianTally {
    fn record(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        if value <= 0.0 {
            self.folding += 1;
        }
    }

    fn merge(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
            folding: self.folding + other.folding,
        }
    }
}

fn jacobian_partition(
    field: &VectorField,
    k: usize,
    out: &mut [f64],
    progress: &AnalysisProgress,
) -> Option<JacobianTally> {
    if progress.is_cancelled() {
        return None;
    }

    let nx = field.geometry().dims[0];
    let mut tally = JacobianTally::default();
    for (offset, value) in out.iter_mut().enumerate() {
        *value = voxel_jacobian(field, [offset % nx, offset / nx, k]);
        tally.record(*value);
    }

    progress.increment();
    Some(tally)
}

/// Jacobian determinant of a displacement field.
pub fn compute_jacobian(field: &VectorField) -> Result<JacobianResult> {
    compute_jacobian_with_progress(field, &AnalysisProgress::new())
}

/// [`compute_jacobian`] with progress reporting and cooperative cancellation.
pub fn compute_jacobian_with_progress(
    field: &VectorField,
    progress: &AnalysisProgress,
) -> Result<JacobianResult> {
    field.geometry().validate()?;

    let geometry: Geometry = *field.geometry();
    let slice_len = geometry.slice_len();
    let mut values = vec![0.0; geometry.voxel_count()];
    progress.begin(geometry.dims[2]);

    tracing::debug!(dims = ?geometry.dims, "starting jacobian analysis");

    #[cfg(feature = "parallel")]
    let tallies: Vec<Option<JacobianTally>> = values
        .par_chunks_mut(slice_len)
        .enumerate()
        .map(|(k, slice)| jacobian_partition(field, k, slice, progress))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let tallies: Vec<Option<JacobianTally>> = values
        .chunks_mut(slice_len)
        .enumerate()
        .map(|(k, slice)| jacobian_partition(field, k, slice, progress))
        .collect();

    let Some(tally) = tallies
        .into_iter()
        .try_fold(JacobianTally::default(), |acc, t| t.map(|t| acc.merge(t)))
    else {
        tracing::warn!("jacobian analysis cancelled");
        return Err(AnalysisError::Cancelled);
    };

    tracing::debug!(
        min = tally.min,
        max = tally.max,
        folding = tally.folding,
        "jacobian analysis finished"
    );

    Ok(JacobianResult {
        determinant: ScalarVolume::new(geometry, values)?,
        min_jacobian: tally.min,
        max_jacobian: tally.max,
        folding_voxel_count: tally.folding,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determinant_of_known_matrices() {
        let identity = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        assert_eq!(determinant(identity), 1.0);

        let scaled = [[2.0, 0.0, 0.0], [0.0, 3.0, 0.0], [0.0, 0.0, 0.5]];
        assert_eq!(determinant(scaled), 3.0);

        let shear = [[1.0, 4.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        assert_eq!(determinant(shear), 1.0);
    }

    #[test]
    fn test_one_sided_differences_at_edges() {
        let g = Geometry::new([0.0; 3], [2.0, 1.0, 1.0], [3, 1, 1]);
        // u_x = 0, 2, 8: forward (2-0)/2, central (8-0)/4, backward (8-2)/2
        let field =
            VectorField::new(g, vec![[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [8.0, 0.0, 0.0]]).unwrap();
        assert_eq!(partial_derivative(&field, [0, 0, 0], 0)[0], 1.0);
        assert_eq!(partial_derivative(&field, [1, 0, 0], 0)[0], 2.0);
        assert_eq!(partial_derivative(&field, [2, 0, 0], 0)[0], 3.0);
        assert_eq!(partial_derivative(&field, [1, 0, 0], 1), [0.0; 3]);
    }

    #[test]
    fn test_tally_tracks_extrema_and_folding() {
        let mut tally = JacobianTally::default();
        for v in [1.2, -0.3, 0.0, 0.9] {
            tally.record(v);
        }
        assert_eq!(tally.min, -0.3);
        assert_eq!(tally.max, 1.2);
        assert_eq!(tally.folding, 2);
    }
}
