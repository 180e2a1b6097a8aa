//! Subcommand handlers.
//!
//! Each handler loads its inputs, runs the analysis on an [`AnalysisWorker`]
//! while the calling thread logs progress, writes results back into the scene
//! and returns a summary for the caller to print.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::Args;
use color_eyre::eyre::{WrapErr, bail, eyre};
use dosecmp_core::{GammaResult, JacobianResult, ScalarVolume};

use crate::data::{DoseComparisonNode, Scene, SceneError, SceneVolume, storage};
use crate::worker::{AnalysisRequest, AnalysisResponse, AnalysisWorker};

/// How often the waiting thread reports progress
const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Args, Debug, Clone, Default)]
pub struct GammaArgs {
    /// Scene document holding the dose volumes (.yaml or .json)
    #[arg(short, long)]
    pub scene: PathBuf,

    /// Dose comparison node with volume ids and tolerances
    #[arg(short, long)]
    pub node: Option<PathBuf>,

    /// Reference dose volume id (overrides the node)
    #[arg(long)]
    pub reference: Option<String>,

    /// Compared dose volume id (overrides the node)
    #[arg(long)]
    pub compare: Option<String>,

    /// Distance-to-agreement tolerance in mm
    #[arg(long)]
    pub dta: Option<f64>,

    /// Dose difference tolerance in percent of the normalization dose
    #[arg(long)]
    pub dd: Option<f64>,

    /// Normalization dose in Gy; 0 uses the reference maximum
    #[arg(long)]
    pub reference_dose: Option<f64>,

    /// Low-dose threshold in percent of the normalization dose
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Upper clamp for stored gamma values
    #[arg(long)]
    pub max_gamma: Option<f64>,

    /// Id for the gamma volume (overrides GammaDoseVolumeNodeId)
    #[arg(long)]
    pub output_id: Option<String>,

    /// Write the updated scene here instead of in place
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Cancel the analysis after this many seconds
    #[arg(long)]
    pub time_limit: Option<f64>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct JacobianArgs {
    /// Scene document holding the displacement field (.yaml or .json)
    #[arg(short, long)]
    pub scene: PathBuf,

    /// Displacement field volume id
    #[arg(short, long)]
    pub field: String,

    /// Id for the determinant volume
    #[arg(long)]
    pub output_id: String,

    /// Write the updated scene here instead of in place
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Cancel the analysis after this many seconds
    #[arg(long)]
    pub time_limit: Option<f64>,
}

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    /// Scene document to list
    #[arg(short, long)]
    pub scene: PathBuf,
}

// ============================================================================
// Summaries
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct GammaSummary {
    pub output_id: String,
    pub saved_to: PathBuf,
    pub normalization_dose_gy: f64,
    pub pass_rate: f64,
    pub evaluated_voxel_count: usize,
    pub passed_voxel_count: usize,
    pub excluded_voxel_count: usize,
    pub mean_gamma: f64,
}

impl GammaSummary {
    fn new(result: &GammaResult, output_id: String, saved_to: PathBuf) -> Self {
        Self {
            output_id,
            saved_to,
            normalization_dose_gy: result.normalization_dose_gy,
            pass_rate: result.pass_rate,
            evaluated_voxel_count: result.evaluated_voxel_count,
            passed_voxel_count: result.passed_voxel_count,
            excluded_voxel_count: result.excluded_voxel_count,
            mean_gamma: result.mean_gamma,
        }
    }
}

impl fmt::Display for GammaSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Gamma volume '{}' written to {}", self.output_id, self.saved_to.display())?;
        writeln!(f, "  Normalization dose: {:.3} Gy", self.normalization_dose_gy)?;
        writeln!(
            f,
            "  Pass rate:          {:.2}% ({} of {} voxels)",
            self.pass_rate * 100.0,
            self.passed_voxel_count,
            self.evaluated_voxel_count
        )?;
        writeln!(f, "  Excluded voxels:    {}", self.excluded_voxel_count)?;
        write!(f, "  Mean gamma:         {:.4}", self.mean_gamma)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JacobianSummary {
    pub output_id: String,
    pub saved_to: PathBuf,
    pub min_jacobian: f64,
    pub max_jacobian: f64,
    pub folding_voxel_count: usize,
}

impl fmt::Display for JacobianSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Jacobian volume '{}' written to {}",
            self.output_id,
            self.saved_to.display()
        )?;
        writeln!(f, "  Min determinant: {:.4}", self.min_jacobian)?;
        writeln!(f, "  Max determinant: {:.4}", self.max_jacobian)?;
        write!(f, "  Folding voxels:  {}", self.folding_voxel_count)
    }
}

/// One line of `inspect` output
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeSummary {
    pub id: String,
    pub kind: &'static str,
    pub dims: [usize; 3],
    pub spacing: [f64; 3],
    pub value_range: Option<(f64, f64)>,
}

impl fmt::Display for VolumeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [nx, ny, nz] = self.dims;
        let [sx, sy, sz] = self.spacing;
        write!(
            f,
            "{:<24} {:<6} {nx}x{ny}x{nz}  spacing {sx}x{sy}x{sz} mm",
            self.id, self.kind
        )?;
        if let Some((min, max)) = self.value_range {
            write!(f, "  range [{min:.4}, {max:.4}]")?;
        }
        Ok(())
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Run the gamma comparison described by `args`
pub fn run_gamma(args: &GammaArgs) -> color_eyre::Result<GammaSummary> {
    let mut scene: Scene = storage::load(&args.scene)?;
    let node: DoseComparisonNode = match &args.node {
        Some(path) => storage::load(path)?,
        None => DoseComparisonNode::default(),
    };

    let mut config = node.to_config();
    if let Some(value) = args.dta {
        config = config.with_dta_tolerance_mm(value);
    }
    if let Some(value) = args.dd {
        config = config.with_dose_difference_tolerance_percent(value);
    }
    if let Some(value) = args.reference_dose {
        config = config.with_reference_dose_gy(value);
    }
    if let Some(value) = args.threshold {
        config = config.with_analysis_threshold_percent(value);
    }
    if let Some(value) = args.max_gamma {
        config = config.with_maximum_gamma(value);
    }

    let reference_id = resolve_id(
        &args.reference,
        &node.reference_dose_volume_node_id,
        "ReferenceDoseVolumeNodeId",
    )?;
    let compare_id = resolve_id(
        &args.compare,
        &node.compare_dose_volume_node_id,
        "CompareDoseVolumeNodeId",
    )?;
    let output_id = resolve_id(
        &args.output_id,
        &node.gamma_dose_volume_node_id,
        "GammaDoseVolumeNodeId",
    )?;

    let request = AnalysisRequest::Gamma {
        reference: scene.scalar(&reference_id)?.clone(),
        evaluated: scene.scalar(&compare_id)?.clone(),
        config,
    };

    tracing::info!(
        reference = %reference_id,
        compare = %compare_id,
        dta_mm = config.dta_tolerance_mm,
        dd_percent = config.dose_difference_tolerance_percent,
        threshold_percent = config.analysis_threshold_percent,
        "Running gamma comparison"
    );

    let result = match run_on_worker(request, time_limit(args.time_limit)?)? {
        AnalysisResponse::GammaComplete(result) => result,
        other => return Err(unexpected(other)).wrap_err("gamma analysis failed"),
    };

    let saved_to = args.out.clone().unwrap_or_else(|| args.scene.clone());
    let summary = GammaSummary::new(&result, output_id.clone(), saved_to.clone());
    store_and_save(&mut scene, output_id, result.gamma, &saved_to)?;
    Ok(summary)
}

/// Run the Jacobian analysis described by `args`
pub fn run_jacobian(args: &JacobianArgs) -> color_eyre::Result<JacobianSummary> {
    let mut scene: Scene = storage::load(&args.scene)?;
    let request = AnalysisRequest::Jacobian {
        field: scene.vector(&args.field)?.clone(),
    };

    tracing::info!(field = %args.field, "Running jacobian analysis");

    let result: Box<JacobianResult> = match run_on_worker(request, time_limit(args.time_limit)?)? {
        AnalysisResponse::JacobianComplete(result) => result,
        other => return Err(unexpected(other)).wrap_err("jacobian analysis failed"),
    };

    if result.has_folding() {
        tracing::warn!(
            voxels = result.folding_voxel_count,
            "Displacement field folds (non-positive determinant)"
        );
    }

    let saved_to = args.out.clone().unwrap_or_else(|| args.scene.clone());
    let summary = JacobianSummary {
        output_id: args.output_id.clone(),
        saved_to: saved_to.clone(),
        min_jacobian: result.min_jacobian,
        max_jacobian: result.max_jacobian,
        folding_voxel_count: result.folding_voxel_count,
    };
    store_and_save(&mut scene, args.output_id.clone(), result.determinant, &saved_to)?;
    Ok(summary)
}

/// List the volumes in a scene
pub fn run_inspect(args: &InspectArgs) -> color_eyre::Result<Vec<VolumeSummary>> {
    let scene: Scene = storage::load(&args.scene)?;

    Ok(scene
        .volumes
        .iter()
        .map(|(id, volume)| {
            let (geometry, value_range) = match volume {
                SceneVolume::Scalar(v) => (*v.geometry(), v.value_range()),
                SceneVolume::Vector(v) => (*v.geometry(), None),
            };
            VolumeSummary {
                id: id.clone(),
                kind: volume.kind(),
                dims: geometry.dims,
                spacing: geometry.spacing,
                value_range,
            }
        })
        .collect())
}

// ============================================================================
// Helpers
// ============================================================================

fn resolve_id(
    flag: &Option<String>,
    attribute: &Option<String>,
    name: &'static str,
) -> Result<String, SceneError> {
    let set = |id: &&String| !id.is_empty();
    flag.as_ref()
        .filter(set)
        .or(attribute.as_ref().filter(set))
        .cloned()
        .ok_or(SceneError::MissingReference(name))
}

fn time_limit(seconds: Option<f64>) -> color_eyre::Result<Option<Duration>> {
    seconds
        .map(|s| Duration::try_from_secs_f64(s).map_err(|e| eyre!("invalid time limit {s}: {e}")))
        .transpose()
}

fn unexpected(response: AnalysisResponse) -> color_eyre::Report {
    match response {
        AnalysisResponse::Error(e) => e.into(),
        AnalysisResponse::Cancelled => eyre!("analysis was cancelled"),
        other => eyre!("unexpected worker response: {other:?}"),
    }
}

/// Send `request` to a fresh worker and wait for its response, logging
/// progress. Past `limit` the run is cancelled and the wait continues until
/// the engine acknowledges.
fn run_on_worker(
    request: AnalysisRequest,
    limit: Option<Duration>,
) -> color_eyre::Result<AnalysisResponse> {
    let worker = AnalysisWorker::new();
    if !worker.send(request) {
        bail!("analysis worker is not running");
    }

    let started = Instant::now();
    let mut last_completed = 0;
    loop {
        if let Some(response) = worker.recv_timeout(PROGRESS_INTERVAL).map_err(|e| eyre!(e))? {
            tracing::debug!(elapsed_ms = started.elapsed().as_millis(), "Analysis finished");
            return Ok(response);
        }

        let progress = worker.progress();
        let completed = progress.completed();
        if completed != last_completed {
            last_completed = completed;
            tracing::info!(
                completed,
                total = progress.total(),
                "Progress: {:.0}%",
                progress.fraction() * 100.0
            );
        }

        if let Some(limit) = limit
            && !worker.is_cancelled()
            && started.elapsed() >= limit
        {
            tracing::warn!(limit_secs = limit.as_secs_f64(), "Time limit reached, cancelling");
            worker.cancel();
        }
    }
}

fn store_and_save(
    scene: &mut Scene,
    id: String,
    volume: ScalarVolume,
    path: &Path,
) -> color_eyre::Result<()> {
    if scene.insert_scalar(id.clone(), volume) {
        tracing::info!(id = %id, "Replaced existing volume");
    }
    storage::save(path, scene)?;
    tracing::info!(path = %path.display(), "Scene saved");
    Ok(())
}
