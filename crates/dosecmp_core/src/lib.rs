//! Dose comparison and deformation analysis library
//!
//! This crate provides the numerical kernels used in radiotherapy QA on
//! volumes that are already loaded in memory:
//! - Gamma index comparison of a reference and an evaluated dose distribution
//!   (DTA / dose-difference criteria, low-dose threshold, pass rate)
//! - Jacobian determinant analysis of a displacement field to find folding
//!   and compression after deformable registration
//! - Trilinear sampling and resampling between volume geometries
//!
//! Both engines are pure functions over borrowed volumes. With the `parallel`
//! feature (on by default) z-slices are processed on the rayon thread pool.
//!
//! ```ignore
//! use dosecmp_core::{DoseComparisonConfig, Geometry, ScalarVolume, compute_gamma};
//!
//! let geometry = Geometry::new([0.0; 3], [2.0; 3], [10, 10, 10]);
//! let reference = ScalarVolume::filled(geometry, 100.0);
//! let evaluated = ScalarVolume::filled(geometry, 103.0);
//! let config = DoseComparisonConfig::new().with_reference_dose_gy(100.0);
//!
//! let result = compute_gamma(&reference, &evaluated, &config)?;
//! assert_eq!(result.pass_rate, 1.0);
//! ```

#![warn(clippy::all)]

// ============================================================================
// Core modules
// ============================================================================

pub mod error;
pub mod gamma;
pub mod jacobian;
pub mod progress;
pub mod sampling;

// ============================================================================
// Type definition modules
// ============================================================================

pub mod config;
pub mod grid;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use config::DoseComparisonConfig;
pub use error::{AnalysisError, ConfigError, GridError};
pub use gamma::{GammaResult, compute_gamma, compute_gamma_with_progress};
pub use grid::{Geometry, ScalarVolume, VectorField, VolumeGrid};
pub use jacobian::{JacobianResult, compute_jacobian, compute_jacobian_with_progress};
pub use progress::AnalysisProgress;
pub use sampling::{resample, sample_trilinear};
