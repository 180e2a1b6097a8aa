//! Regularly sampled 3-D volumes
//!
//! A [`Geometry`] places voxel centres on an axis-aligned lattice:
//! voxel `(i, j, k)` sits at `origin + (i, j, k) * spacing`. Values are stored
//! row-major with x varying fastest, so the linear index of `(i, j, k)` is
//! `i + nx * (j + ny * k)`.

use serde::{Deserialize, Serialize};

use crate::error::GridError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    /// Position of voxel (0, 0, 0) in millimetres
    pub origin: [f64; 3],
    /// Distance between neighbouring voxel centres along each axis, in millimetres
    pub spacing: [f64; 3],
    /// Number of voxels along each axis
    pub dims: [usize; 3],
}

impl Geometry {
    #[must_use]
    pub fn new(origin: [f64; 3], spacing: [f64; 3], dims: [usize; 3]) -> Self {
        Self {
            origin,
            spacing,
            dims,
        }
    }

    /// Check that every axis has at least one voxel, a positive finite spacing
    /// and a finite origin
    pub fn validate(&self) -> Result<(), GridError> {
        if self.dims.contains(&0) {
            return Err(GridError::ZeroDimension { dims: self.dims });
        }
        if self.spacing.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(GridError::NonPositiveSpacing {
                spacing: self.spacing,
            });
        }
        if self.origin.iter().any(|o| !o.is_finite()) {
            return Err(GridError::NonFiniteOrigin {
                origin: self.origin,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn voxel_count(&self) -> usize {
        self.dims.iter().product()
    }

    /// Number of voxels in one z-slice
    #[must_use]
    pub fn slice_len(&self) -> usize {
        self.dims[0] * self.dims[1]
    }

    #[must_use]
    pub fn min_spacing(&self) -> f64 {
        self.spacing.iter().copied().fold(f64::INFINITY, f64::min)
    }

    #[must_use]
    #[inline]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.dims[0] * (j + self.dims[1] * k)
    }

    /// Inverse of [`Geometry::index`]
    #[must_use]
    #[inline]
    pub fn coords(&self, index: usize) -> [usize; 3] {
        let [nx, ny, _] = self.dims;
        [index % nx, (index / nx) % ny, index / (nx * ny)]
    }

    /// World position of the centre of voxel `(i, j, k)`
    #[must_use]
    #[inline]
    pub fn position(&self, i: usize, j: usize, k: usize) -> [f64; 3] {
        [
            self.origin[0] + i as f64 * self.spacing[0],
            self.origin[1] + j as f64 * self.spacing[1],
            self.origin[2] + k as f64 * self.spacing[2],
        ]
    }

    /// Fractional voxel index of a world point (no bounds check)
    #[must_use]
    #[inline]
    pub fn continuous_index(&self, point: [f64; 3]) -> [f64; 3] {
        [
            (point[0] - self.origin[0]) / self.spacing[0],
            (point[1] - self.origin[1]) / self.spacing[1],
            (point[2] - self.origin[2]) / self.spacing[2],
        ]
    }
}

/// A regularly sampled volume of `T`.
///
/// The value count always matches the geometry. Geometry validity (positive
/// spacing, non-empty axes) is not enforced here; the analysis engines check it
/// so a malformed grid is reported as a geometry mismatch at the point of use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "VolumeRecord<T>",
    bound(deserialize = "T: Deserialize<'de>")
)]
pub struct VolumeGrid<T> {
    geometry: Geometry,
    values: Vec<T>,
}

/// Scalar volume, e.g. a dose distribution in Gy
pub type ScalarVolume = VolumeGrid<f64>;

/// Displacement field, one vector in millimetres per voxel
pub type VectorField = VolumeGrid<[f64; 3]>;

#[derive(Deserialize)]
struct VolumeRecord<T> {
    geometry: Geometry,
    values: Vec<T>,
}

impl<T> TryFrom<VolumeRecord<T>> for VolumeGrid<T> {
    type Error = GridError;

    fn try_from(record: VolumeRecord<T>) -> Result<Self, Self::Error> {
        Self::new(record.geometry, record.values)
    }
}

impl<T> VolumeGrid<T> {
    pub fn new(geometry: Geometry, values: Vec<T>) -> Result<Self, GridError> {
        let expected = geometry.voxel_count();
        if values.len() != expected {
            return Err(GridError::ValueCountMismatch {
                dims: geometry.dims,
                expected,
                actual: values.len(),
            });
        }
        Ok(Self { geometry, values })
    }

    /// Build a volume by evaluating `f` at every voxel centre.
    ///
    /// `f` receives the world position and the `(i, j, k)` index.
    pub fn from_fn(geometry: Geometry, mut f: impl FnMut([f64; 3], [usize; 3]) -> T) -> Self {
        let [nx, ny, nz] = geometry.dims;
        let mut values = Vec::with_capacity(geometry.voxel_count());
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    values.push(f(geometry.position(i, j, k), [i, j, k]));
                }
            }
        }
        Self { geometry, values }
    }

    #[must_use]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[must_use]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<T> {
        self.values
    }

    #[must_use]
    #[inline]
    pub fn get(&self, i: usize, j: usize, k: usize) -> &T {
        &self.values[self.geometry.index(i, j, k)]
    }
}

impl<T: Clone> VolumeGrid<T> {
    /// A volume holding `value` at every voxel
    #[must_use]
    pub fn filled(geometry: Geometry, value: T) -> Self {
        Self {
            geometry,
            values: vec![value; geometry.voxel_count()],
        }
    }
}

impl ScalarVolume {
    /// Smallest and largest finite value, `None` for an empty or all-NaN volume
    #[must_use]
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Largest finite value, `0.0` when there is none
    #[must_use]
    pub fn max_value(&self) -> f64 {
        self.value_range().map_or(0.0, |(_, hi)| hi)
    }
}
