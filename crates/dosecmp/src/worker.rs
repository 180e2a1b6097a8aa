//! Background worker for running analyses off the calling thread.
//!
//! The command layer sends a request, then polls for the response while
//! logging progress. Cancellation is cooperative: the engines check the shared
//! flag between z-slices.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use dosecmp_core::{
    AnalysisError, AnalysisProgress, DoseComparisonConfig, GammaResult, JacobianResult,
    ScalarVolume, VectorField, compute_gamma_with_progress, compute_jacobian_with_progress,
};

/// Request sent to the background worker
#[derive(Debug)]
pub enum AnalysisRequest {
    Gamma {
        reference: ScalarVolume,
        evaluated: ScalarVolume,
        config: DoseComparisonConfig,
    },
    Jacobian {
        field: VectorField,
    },
    /// Graceful shutdown
    Shutdown,
}

/// Response from the background worker
#[derive(Debug)]
pub enum AnalysisResponse {
    /// Gamma analysis completed (boxed to reduce enum size)
    GammaComplete(Box<GammaResult>),
    JacobianComplete(Box<JacobianResult>),
    Cancelled,
    /// Invalid input reported by the engine
    Error(AnalysisError),
}

impl From<Result<GammaResult, AnalysisError>> for AnalysisResponse {
    fn from(result: Result<GammaResult, AnalysisError>) -> Self {
        match result {
            Ok(result) => AnalysisResponse::GammaComplete(Box::new(result)),
            Err(AnalysisError::Cancelled) => AnalysisResponse::Cancelled,
            Err(e) => AnalysisResponse::Error(e),
        }
    }
}

impl From<Result<JacobianResult, AnalysisError>> for AnalysisResponse {
    fn from(result: Result<JacobianResult, AnalysisError>) -> Self {
        match result {
            Ok(result) => AnalysisResponse::JacobianComplete(Box::new(result)),
            Err(AnalysisError::Cancelled) => AnalysisResponse::Cancelled,
            Err(e) => AnalysisResponse::Error(e),
        }
    }
}

/// Background worker that runs analyses on a separate thread
pub struct AnalysisWorker {
    request_tx: Sender<AnalysisRequest>,
    response_rx: Receiver<AnalysisResponse>,
    cancel_flag: Arc<AtomicBool>,
    progress: AnalysisProgress,
    thread: Option<JoinHandle<()>>,
}

impl AnalysisWorker {
    /// Create a new analysis worker with a background thread
    pub fn new() -> Self {
        let (request_tx, request_rx) = channel();
        let (response_tx, response_rx) = channel();
        let cancel_flag = Arc::new(AtomicBool::new(false));
        let progress = AnalysisProgress::from_atomics(
            Arc::new(AtomicUsize::new(0)),
            Arc::new(AtomicUsize::new(0)),
            cancel_flag.clone(),
        );

        let ctx = WorkerContext {
            response_tx,
            progress: progress.clone(),
        };

        let thread = thread::spawn(move || {
            ctx.run(request_rx);
        });

        Self {
            request_tx,
            response_rx,
            cancel_flag,
            progress,
            thread: Some(thread),
        }
    }

    /// Send an analysis request to the worker
    pub fn send(&self, request: AnalysisRequest) -> bool {
        // Clear cancel flag for new work
        self.cancel_flag.store(false, Ordering::SeqCst);
        self.request_tx.send(request).is_ok()
    }

    /// Try to receive a response (non-blocking)
    pub fn try_recv(&self) -> Option<AnalysisResponse> {
        self.response_rx.try_recv().ok()
    }

    /// Wait up to `timeout` for a response.
    ///
    /// Returns `Err` when the worker thread has gone away.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<AnalysisResponse>, String> {
        match self.response_rx.recv_timeout(timeout) {
            Ok(response) => Ok(Some(response)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err("analysis worker stopped".to_string()),
        }
    }

    /// Progress of the running analysis
    pub fn progress(&self) -> &AnalysisProgress {
        &self.progress
    }

    /// Request cancellation of the current operation
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }

    /// Shutdown the worker thread
    pub fn shutdown(&self) {
        let _ = self.request_tx.send(AnalysisRequest::Shutdown);
    }
}

impl Default for AnalysisWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AnalysisWorker {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Shared state for the background worker thread.
struct WorkerContext {
    response_tx: Sender<AnalysisResponse>,
    progress: AnalysisProgress,
}

impl WorkerContext {
    fn run(&self, request_rx: Receiver<AnalysisRequest>) {
        while let Ok(request) = request_rx.recv() {
            let response = match request {
                AnalysisRequest::Shutdown => break,

                AnalysisRequest::Gamma {
                    reference,
                    evaluated,
                    config,
                } => {
                    tracing::info!(
                        reference_dims = ?reference.geometry().dims,
                        evaluated_dims = ?evaluated.geometry().dims,
                        "Starting gamma analysis"
                    );
                    compute_gamma_with_progress(&reference, &evaluated, &config, &self.progress)
                        .into()
                }

                AnalysisRequest::Jacobian { field } => {
                    tracing::info!(dims = ?field.geometry().dims, "Starting jacobian analysis");
                    compute_jacobian_with_progress(&field, &self.progress).into()
                }
            };

            if self.response_tx.send(response).is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dosecmp_core::Geometry;

    fn wait(worker: &AnalysisWorker) -> AnalysisResponse {
        loop {
            if let Some(response) = worker.recv_timeout(Duration::from_millis(50)).unwrap() {
                return response;
            }
        }
    }

    #[test]
    fn test_gamma_request_completes() {
        let worker = AnalysisWorker::new();
        let g = Geometry::new([0.0; 3], [2.0; 3], [4, 4, 3]);
        assert!(worker.send(AnalysisRequest::Gamma {
            reference: ScalarVolume::filled(g, 100.0),
            evaluated: ScalarVolume::filled(g, 103.0),
            config: DoseComparisonConfig::default(),
        }));

        match wait(&worker) {
            AnalysisResponse::GammaComplete(result) => assert_eq!(result.pass_rate, 1.0),
            other => panic!("unexpected response: {other:?}"),
        }
        assert_eq!(worker.progress().completed(), 3);
    }

    #[test]
    fn test_engine_errors_are_forwarded() {
        let worker = AnalysisWorker::new();
        let g = Geometry::new([0.0; 3], [0.0, 1.0, 1.0], [2, 2, 2]);
        worker.send(AnalysisRequest::Jacobian {
            field: VectorField::filled(g, [0.0; 3]),
        });

        assert!(matches!(
            wait(&worker),
            AnalysisResponse::Error(AnalysisError::GeometryMismatch(_))
        ));
    }

    #[test]
    fn test_cancelled_result_maps_to_cancelled_response() {
        let response: AnalysisResponse =
            Err::<JacobianResult, _>(AnalysisError::Cancelled).into();
        assert!(matches!(response, AnalysisResponse::Cancelled));
    }
}
