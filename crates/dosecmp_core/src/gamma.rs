//! Gamma index comparison of two dose distributions
//!
//! For every reference voxel the evaluated distribution is searched inside a
//! sphere of radius DTA. Each candidate point combines a normalized dose
//! difference and a normalized distance:
//!
//! ```text
//! gamma = sqrt( ((d_e - d_r) / (DD% * D_norm / 100))^2 + (|p_e - p_r| / DTA)^2 )
//! ```
//!
//! The voxel's gamma is the minimum over all candidates. Normalization is
//! global: `D_norm` is the configured reference dose or, when unset, the
//! reference maximum.
//!
//! The evaluated volume is sampled trilinearly, so the two distributions do
//! not need to share a grid. Candidate offsets form a cubic lattice whose step
//! is half the evaluated grid's finest spacing.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::DoseComparisonConfig;
use crate::error::{AnalysisError, Result};
use crate::grid::{Geometry, ScalarVolume};
use crate::progress::AnalysisProgress;
use crate::sampling::sample_trilinear;

/// Output of [`compute_gamma`]
#[derive(Debug, Clone, PartialEq)]
pub struct GammaResult {
    /// Gamma per reference voxel, clamped to `[0, maximum_gamma]`; excluded voxels hold 0
    pub gamma: ScalarVolume,
    /// `true` for voxels that took no part in the pass/fail statistics
    pub excluded: Vec<bool>,
    /// `true` for evaluated voxels whose unclamped gamma is at most 1
    pub pass_mask: Vec<bool>,
    /// Fraction of evaluated voxels with unclamped gamma <= 1 (0 when none were evaluated)
    pub pass_rate: f64,
    pub evaluated_voxel_count: usize,
    pub excluded_voxel_count: usize,
    pub passed_voxel_count: usize,
    /// Mean of the unclamped gamma over evaluated voxels
    pub mean_gamma: f64,
    /// Dose the dose-difference and threshold percentages were applied to
    pub normalization_dose_gy: f64,
}

impl GammaResult {
    /// Pass/fail outcome of one voxel, `None` if it was excluded
    #[must_use]
    pub fn passed(&self, index: usize) -> Option<bool> {
        (!self.excluded[index]).then(|| self.pass_mask[index])
    }
}

/// One lattice point of the search sphere
#[derive(Debug, Clone, Copy)]
struct SearchOffset {
    offset: [f64; 3],
    /// `(|offset| / DTA)^2`
    distance_term: f64,
}

/// Candidate offsets inside the DTA sphere, nearest first
#[derive(Debug, Clone)]
struct SearchKernel {
    offsets: Vec<SearchOffset>,
}

impl SearchKernel {
    /// Lattice offsets within `dta_mm`, limited per axis to `bounds_mm`.
    ///
    /// Offsets outside the bounds along any axis can never land inside the
    /// evaluated volume, so leaving them out does not change any gamma value.
    fn new(dta_mm: f64, step_mm: f64, bounds_mm: [(f64, f64); 3]) -> Self {
        let ball_reach = (dta_mm / step_mm).floor();
        let [(i0, i1), (j0, j1), (k0, k1)] = bounds_mm.map(|(lo, hi)| {
            let first = (lo / step_mm).floor().max(-ball_reach);
            let last = (hi / step_mm).ceil().min(ball_reach);
            (first as i64, last as i64)
        });
        let limit = (dta_mm / step_mm).powi(2) * (1.0 + 1e-12);
        let mut offsets = Vec::new();

        for k in k0..=k1 {
            for j in j0..=j1 {
                for i in i0..=i1 {
                    let (fi, fj, fk) = (i as f64, j as f64, k as f64);
                    let steps_sq = fi * fi + fj * fj + fk * fk;
                    if steps_sq > limit {
                        continue;
                    }
                    offsets.push(SearchOffset {
                        offset: [fi * step_mm, fj * step_mm, fk * step_mm],
                        distance_term: steps_sq * step_mm * step_mm / (dta_mm * dta_mm),
                    });
                }
            }
        }

        // Stable sort keeps lattice order among equidistant points
        offsets.sort_by(|a, b| a.distance_term.total_cmp(&b.distance_term));
        Self { offsets }
    }

    fn len(&self) -> usize {
        self.offsets.len()
    }
}

/// Per-axis range of offsets that can move a reference voxel centre into
/// the evaluated volume's sampling box (voxel centres plus half a voxel).
fn search_bounds(reference: &Geometry, evaluated: &Geometry) -> [(f64, f64); 3] {
    std::array::from_fn(|axis| {
        let ref_lo = reference.origin[axis];
        let ref_hi = ref_lo + (reference.dims[axis] - 1) as f64 * reference.spacing[axis];
        let half = evaluated.spacing[axis] / 2.0;
        let eval_lo = evaluated.origin[axis] - half;
        let eval_hi =
            evaluated.origin[axis] + (evaluated.dims[axis] - 1) as f64 * evaluated.spacing[axis] + half;
        (eval_lo - ref_hi, eval_hi - ref_lo)
    })
}

/// Pass/fail counters for one partition
#[derive(Debug, Clone, Copy, Default)]
struct GammaTally {
    evaluated: usize,
    passed: usize,
    excluded: usize,
    gamma_sum: f64,
}

impl GammaTally {
    fn record(&mut self, gamma: f64) {
        self.evaluated += 1;
        if gamma <= 1.0 {
            self.passed += 1;
        }
        self.gamma_sum += gamma;
    }

    fn merge(self, other: Self) -> Self {
        Self {
            evaluated: self.evaluated + other.evaluated,
            passed: self.passed + other.passed,
            excluded: self.excluded + other.excluded,
            gamma_sum: self.gamma_sum + other.gamma_sum,
        }
    }
}

/// One z-slice of each per-voxel output
struct SliceOutput<'a> {
    gamma: &'a mut [f64],
    excluded: &'a mut [bool],
    passed: &'a mut [bool],
}

/// Everything a partition needs, borrowed for the duration of one run
struct GammaContext<'a> {
    reference: &'a ScalarVolume,
    evaluated: &'a ScalarVolume,
    kernel: SearchKernel,
    dose_tolerance_gy: f64,
    threshold_gy: f64,
    maximum_gamma: f64,
    progress: &'a AnalysisProgress,
}

impl GammaContext<'_> {
    /// Unclamped gamma of one reference voxel, `None` when it is excluded
    fn voxel_gamma(&self, position: [f64; 3], dose: f64) -> Option<f64> {
        if dose < self.threshold_gy {
            return None;
        }

        let mut best_sq = f64::INFINITY;
        for candidate in &self.kernel.offsets {
            // Offsets are sorted, so no later candidate can beat the current best
            if candidate.distance_term >= best_sq {
                break;
            }
            let point = [
                position[0] + candidate.offset[0],
                position[1] + candidate.offset[1],
                position[2] + candidate.offset[2],
            ];
            let Some(evaluated_dose) = sample_trilinear(self.evaluated, point) else {
                continue;
            };
            let dose_term = (evaluated_dose - dose) / self.dose_tolerance_gy;
            let gamma_sq = dose_term * dose_term + candidate.distance_term;
            if gamma_sq < best_sq {
                best_sq = gamma_sq;
            }
        }

        best_sq.is_finite().then(|| best_sq.sqrt())
    }

    /// Process one z-slice, writing only into its own output slices
    fn partition(&self, k: usize, out: SliceOutput<'_>) -> Option<GammaTally> {
        if self.progress.is_cancelled() {
            return None;
        }

        let geometry = self.reference.geometry();
        let nx = geometry.dims[0];
        let base = k * geometry.slice_len();
        let mut tally = GammaTally::default();

        let SliceOutput {
            gamma,
            excluded,
            passed,
        } = out;
        let voxels = gamma.iter_mut().zip(excluded.iter_mut()).zip(passed.iter_mut());

        for (offset, ((stored, skip), pass)) in voxels.enumerate() {
            let (i, j) = (offset % nx, offset / nx);
            let dose = self.reference.values()[base + offset];
            match self.voxel_gamma(geometry.position(i, j, k), dose) {
                Some(value) => {
                    tally.record(value);
                    *pass = value <= 1.0;
                    *stored = value.min(self.maximum_gamma).max(0.0);
                }
                None => {
                    tally.excluded += 1;
                    *skip = true;
                }
            }
        }

        self.progress.increment();
        Some(tally)
    }
}

/// Compare `evaluated` against `reference` with the gamma index.
pub fn compute_gamma(
    reference: &ScalarVolume,
    evaluated: &ScalarVolume,
    config: &DoseComparisonConfig,
) -> Result<GammaResult> {
    compute_gamma_with_progress(reference, evaluated, config, &AnalysisProgress::new())
}

/// [`compute_gamma`] with progress reporting and cooperative cancellation.
///
/// Returns [`AnalysisError::Cancelled`] and no partial result when `progress`
/// is cancelled before the last partition starts.
pub fn compute_gamma_with_progress(
    reference: &ScalarVolume,
    evaluated: &ScalarVolume,
    config: &DoseComparisonConfig,
    progress: &AnalysisProgress,
) -> Result<GammaResult> {
    config.validate()?;
    reference.geometry().validate()?;
    evaluated.geometry().validate()?;

    let normalization_dose_gy = config.normalization_dose_gy(reference.max_value())?;
    let geometry: Geometry = *reference.geometry();
    let step_mm = evaluated.geometry().min_spacing() / 2.0;

    let ctx = GammaContext {
        reference,
        evaluated,
        kernel: SearchKernel::new(
            config.dta_tolerance_mm,
            step_mm,
            search_bounds(reference.geometry(), evaluated.geometry()),
        ),
        dose_tolerance_gy: config.dose_difference_tolerance_percent * normalization_dose_gy / 100.0,
        threshold_gy: config.analysis_threshold_percent * normalization_dose_gy / 100.0,
        maximum_gamma: config.maximum_gamma,
        progress,
    };

    tracing::debug!(
        dims = ?geometry.dims,
        normalization_dose_gy,
        search_points = ctx.kernel.len(),
        step_mm,
        "starting gamma analysis"
    );

    let voxel_count = geometry.voxel_count();
    let slice_len = geometry.slice_len();
    let mut gamma = vec![0.0; voxel_count];
    let mut excluded = vec![false; voxel_count];
    let mut pass_mask = vec![false; voxel_count];
    progress.begin(geometry.dims[2]);

    #[cfg(feature = "parallel")]
    let tallies: Vec<Option<GammaTally>> = gamma
        .par_chunks_mut(slice_len)
        .zip(excluded.par_chunks_mut(slice_len))
        .zip(pass_mask.par_chunks_mut(slice_len))
        .enumerate()
        .map(|(k, ((gamma, excluded), passed))| {
            ctx.partition(k, SliceOutput { gamma, excluded, passed })
        })
        .collect();

    #[cfg(not(feature = "parallel"))]
    let tallies: Vec<Option<GammaTally>> = gamma
        .chunks_mut(slice_len)
        .zip(excluded.chunks_mut(slice_len))
        .zip(pass_mask.chunks_mut(slice_len))
        .enumerate()
        .map(|(k, ((gamma, excluded), passed))| {
            ctx.partition(k, SliceOutput { gamma, excluded, passed })
        })
        .collect();

    let Some(tally) = tallies
        .into_iter()
        .try_fold(GammaTally::default(), |acc, t| t.map(|t| acc.merge(t)))
    else {
        tracing::warn!("gamma analysis cancelled");
        return Err(AnalysisError::Cancelled);
    };

    let pass_rate = if tally.evaluated == 0 {
        0.0
    } else {
        tally.passed as f64 / tally.evaluated as f64
    };
    let mean_gamma = if tally.evaluated == 0 {
        0.0
    } else {
        tally.gamma_sum / tally.evaluated as f64
    };

    tracing::debug!(
        evaluated = tally.evaluated,
        excluded = tally.excluded,
        pass_rate,
        "gamma analysis finished"
    );

    Ok(GammaResult {
        gamma: ScalarVolume::new(geometry, gamma)?,
        excluded,
        pass_mask,
        pass_rate,
        evaluated_voxel_count: tally.evaluated,
        excluded_voxel_count: tally.excluded,
        passed_voxel_count: tally.passed,
        mean_gamma,
        normalization_dose_gy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNBOUNDED: [(f64, f64); 3] = [(f64::NEG_INFINITY, f64::INFINITY); 3];

    #[test]
    fn test_kernel_starts_at_origin_and_is_sorted() {
        let kernel = SearchKernel::new(3.0, 1.0, UNBOUNDED);
        assert_eq!(kernel.offsets[0].offset, [0.0, 0.0, 0.0]);
        assert_eq!(kernel.offsets[0].distance_term, 0.0);
        assert!(
            kernel
                .offsets
                .windows(2)
                .all(|w| w[0].distance_term <= w[1].distance_term)
        );
    }

    #[test]
    fn test_kernel_includes_sphere_boundary() {
        let kernel = SearchKernel::new(2.0, 1.0, UNBOUNDED);
        assert!(
            kernel
                .offsets
                .iter()
                .any(|o| o.offset == [2.0, 0.0, 0.0] && o.distance_term == 1.0)
        );
        assert!(kernel.offsets.iter().all(|o| o.distance_term <= 1.0));
        // Lattice points of a radius-2 ball: 33
        assert_eq!(kernel.len(), 33);
    }

    #[test]
    fn test_kernel_smaller_than_step_is_origin_only() {
        let kernel = SearchKernel::new(0.4, 1.0, UNBOUNDED);
        assert_eq!(kernel.len(), 1);
    }

    #[test]
    fn test_kernel_is_limited_to_bounds() {
        // Radius far beyond the volume: only the bounds decide the size
        let kernel = SearchKernel::new(1e9, 0.5, [(-1.5, 1.5), (-1.5, 1.5), (-0.5, 0.5)]);
        assert_eq!(kernel.len(), 7 * 7 * 3);
        assert_eq!(kernel.offsets[0].offset, [0.0, 0.0, 0.0]);

        let widest = SearchKernel::new(f64::MAX, 1.0, [(-2.0, 2.0), (0.0, 0.0), (0.0, 0.0)]);
        assert_eq!(widest.len(), 5);
    }

    #[test]
    fn test_kernel_for_distant_volume_stays_small() {
        let kernel = SearchKernel::new(1e9, 1.0, [(1e6, 1e6 + 3.0), (0.0, 0.0), (0.0, 0.0)]);
        assert_eq!(kernel.len(), 4);
        assert_eq!(kernel.offsets[0].offset, [1e6, 0.0, 0.0]);
    }

    #[test]
    fn test_search_bounds_cover_sampling_box() {
        let reference = Geometry::new([0.0; 3], [1.0; 3], [2, 2, 1]);
        assert_eq!(
            search_bounds(&reference, &reference),
            [(-1.5, 1.5), (-1.5, 1.5), (-0.5, 0.5)]
        );

        let shifted = Geometry::new([10.0, 0.0, 0.0], [2.0; 3], [1, 1, 1]);
        assert_eq!(search_bounds(&reference, &shifted)[0], (8.0, 11.0));
    }

    #[test]
    fn test_tally_merge_is_additive() {
        let mut a = GammaTally::default();
        a.record(0.5);
        a.record(1.5);
        let mut b = GammaTally::default();
        b.record(1.0);
        b.excluded = 2;

        let merged = a.merge(b);
        assert_eq!(merged.evaluated, 3);
        assert_eq!(merged.passed, 2);
        assert_eq!(merged.excluded, 2);
        assert_eq!(merged.gamma_sum, 3.0);
    }
}
