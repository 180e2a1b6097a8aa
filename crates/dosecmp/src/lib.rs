//! Command-line front end for the dose comparison engines
//!
//! Volumes are exchanged through scene documents (YAML or JSON files mapping
//! volume ids to sampled volumes) and gamma tolerances through comparison
//! nodes. Analyses run on a background worker thread so the caller can log
//! progress and cancel long runs.

pub mod commands;
pub mod data;
pub mod logging;
pub mod util;
pub mod worker;

pub use commands::{GammaArgs, InspectArgs, JacobianArgs, run_gamma, run_inspect, run_jacobian};
pub use logging::init_logging;
pub use worker::{AnalysisRequest, AnalysisResponse, AnalysisWorker};
