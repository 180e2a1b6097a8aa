//! Trilinear sampling of scalar volumes at arbitrary world points

use crate::error::GridError;
use crate::grid::{Geometry, ScalarVolume};

/// Fractional indices closer than this to an integer are treated as exact
const SNAP_TOLERANCE: f64 = 1e-9;

#[inline]
fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Sample `volume` at `point` with trilinear interpolation.
///
/// Returns `None` when the point lies outside the bounding box of the voxel
/// centres extended by half a voxel on every side. Inside that half-voxel
/// margin the sample takes the value of the nearest edge voxels.
#[must_use]
pub fn sample_trilinear(volume: &ScalarVolume, point: [f64; 3]) -> Option<f64> {
    let geometry = volume.geometry();
    let continuous = geometry.continuous_index(point);

    let mut lower = [0usize; 3];
    let mut upper = [0usize; 3];
    let mut frac = [0.0f64; 3];

    for axis in 0..3 {
        let n = geometry.dims[axis];
        if n == 0 {
            return None;
        }
        let last = (n - 1) as f64;
        let mut ci = continuous[axis];
        // Negated comparison so NaN lands outside too
        if !(ci >= -0.5 && ci <= last + 0.5) {
            return None;
        }
        let nearest = ci.round();
        if (ci - nearest).abs() < SNAP_TOLERANCE {
            ci = nearest;
        }
        let ci = ci.clamp(0.0, last);
        let i0 = (ci.floor() as usize).min(n - 1);
        lower[axis] = i0;
        upper[axis] = (i0 + 1).min(n - 1);
        frac[axis] = ci - i0 as f64;
    }

    let at = |i: usize, j: usize, k: usize| *volume.get(i, j, k);
    let [x0, y0, z0] = lower;
    let [x1, y1, z1] = upper;
    let [fx, fy, fz] = frac;

    let c00 = lerp(at(x0, y0, z0), at(x1, y0, z0), fx);
    let c10 = lerp(at(x0, y1, z0), at(x1, y1, z0), fx);
    let c01 = lerp(at(x0, y0, z1), at(x1, y0, z1), fx);
    let c11 = lerp(at(x0, y1, z1), at(x1, y1, z1), fx);

    let c0 = lerp(c00, c10, fy);
    let c1 = lerp(c01, c11, fy);

    Some(lerp(c0, c1, fz))
}

/// Resample `volume` onto `target`, writing `fill` where the source has no data.
pub fn resample(
    volume: &ScalarVolume,
    target: &Geometry,
    fill: f64,
) -> Result<ScalarVolume, GridError> {
    volume.geometry().validate()?;
    target.validate()?;
    Ok(ScalarVolume::from_fn(*target, |position, _| {
        sample_trilinear(volume, position).unwrap_or(fill)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lerp_endpoints_are_exact() {
        assert_eq!(lerp(103.0, 103.0, 0.37), 103.0);
        assert_eq!(lerp(1.0, 5.0, 0.0), 1.0);
        assert_eq!(lerp(1.0, 5.0, 0.5), 3.0);
    }

    #[test]
    fn test_single_voxel_axis_is_constant() {
        let g = Geometry::new([0.0; 3], [1.0; 3], [1, 1, 1]);
        let volume = ScalarVolume::filled(g, 7.5);
        assert_eq!(sample_trilinear(&volume, [0.0, 0.0, 0.0]), Some(7.5));
        assert_eq!(sample_trilinear(&volume, [0.49, -0.49, 0.2]), Some(7.5));
        assert_eq!(sample_trilinear(&volume, [0.51, 0.0, 0.0]), None);
    }
}
