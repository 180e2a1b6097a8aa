//! Integration tests for the analysis engines
//!
//! Tests are organized by topic:
//! - `gamma` - Gamma index comparison, statistics and tolerances
//! - `jacobian` - Jacobian determinant of synthetic displacement fields
//! - `sampling` - Trilinear sampling and resampling between geometries

mod sampling;
