//! Tests for trilinear sampling and resampling

use crate::error::GridError;
use crate::grid::{Geometry, ScalarVolume};
use crate::sampling::{resample, sample_trilinear};

fn linear_volume() -> ScalarVolume {
    let geometry = Geometry::new([10.0, -5.0, 0.0], [2.0, 1.0, 3.0], [5, 4, 3]);
    ScalarVolume::from_fn(geometry, |[x, y, z], _| 1.0 + 0.5 * x - 2.0 * y + 0.25 * z)
}

#[test]
fn test_voxel_centres_are_exact() {
    let volume = linear_volume();
    let g = *volume.geometry();
    for k in 0..3 {
        for j in 0..4 {
            for i in 0..5 {
                assert_eq!(
                    sample_trilinear(&volume, g.position(i, j, k)),
                    Some(*volume.get(i, j, k))
                );
            }
        }
    }
}

/// Trilinear interpolation reproduces a linear field between voxel centres
#[test]
fn test_linear_field_is_reproduced() {
    let volume = linear_volume();
    for point in [[11.3, -4.2, 0.7], [17.9, -2.01, 5.5], [14.0, -3.5, 3.0]] {
        let expected = 1.0 + 0.5 * point[0] - 2.0 * point[1] + 0.25 * point[2];
        let sampled = sample_trilinear(&volume, point).unwrap();
        assert!((sampled - expected).abs() < 1e-12, "{point:?}: {sampled} vs {expected}");
    }
}

#[test]
fn test_midpoint_averages_neighbours() {
    let g = Geometry::new([0.0; 3], [1.0; 3], [2, 2, 2]);
    let volume = ScalarVolume::new(g, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]).unwrap();
    assert_eq!(sample_trilinear(&volume, [0.5, 0.5, 0.5]), Some(3.5));
    assert_eq!(sample_trilinear(&volume, [0.5, 0.0, 0.0]), Some(0.5));
}

/// Within half a voxel outside the edge the edge value is used; beyond that there is no data
#[test]
fn test_half_voxel_margin() {
    let volume = linear_volume();
    let edge = *volume.get(0, 0, 0);

    // x spacing is 2 mm, so the margin extends 1 mm before the origin
    assert_eq!(sample_trilinear(&volume, [9.0, -5.0, 0.0]), Some(edge));
    assert_eq!(sample_trilinear(&volume, [8.99, -5.0, 0.0]), None);
    assert_eq!(sample_trilinear(&volume, [10.0, -5.0, -1.5]), Some(edge));
    assert_eq!(sample_trilinear(&volume, [10.0, -5.0, -1.6]), None);

    // Far corner: last centre at (18, -2, 6)
    assert!(sample_trilinear(&volume, [19.0, -1.5, 7.5]).is_some());
    assert_eq!(sample_trilinear(&volume, [19.1, -1.5, 7.5]), None);
    assert_eq!(sample_trilinear(&volume, [f64::NAN, 0.0, 0.0]), None);
}

#[test]
fn test_resample_onto_finer_grid() {
    let volume = linear_volume();
    let target = Geometry::new([10.0, -5.0, 0.0], [1.0, 0.5, 1.5], [9, 7, 5]);
    let resampled = resample(&volume, &target, -1.0).unwrap();

    assert_eq!(resampled.geometry(), &target);
    for (idx, &value) in resampled.values().iter().enumerate() {
        let [i, j, k] = target.coords(idx);
        let [x, y, z] = target.position(i, j, k);
        let expected = 1.0 + 0.5 * x - 2.0 * y + 0.25 * z;
        assert!((value - expected).abs() < 1e-12);
    }
}

#[test]
fn test_resample_fills_outside() {
    let volume = linear_volume();
    let target = Geometry::new([100.0, 0.0, 0.0], [1.0; 3], [2, 2, 2]);
    let resampled = resample(&volume, &target, -1.0).unwrap();
    assert!(resampled.values().iter().all(|&v| v == -1.0));
}

#[test]
fn test_resample_rejects_invalid_target() {
    let volume = linear_volume();
    let target = Geometry::new([0.0; 3], [1.0; 3], [2, 0, 2]);
    assert!(matches!(
        resample(&volume, &target, 0.0),
        Err(GridError::ZeroDimension { .. })
    ));
}
