//! Progress reporting and cooperative cancellation for long analyses

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Shared progress handle for one analysis run.
///
/// Engines count finished partitions (z-slices) and poll the cancellation flag
/// before starting each partition. Clones share the same counters, so a clone
/// can be handed to another thread to observe or cancel the run.
#[derive(Debug, Clone, Default)]
pub struct AnalysisProgress {
    completed: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
    cancelled: Arc<AtomicBool>,
}

impl AnalysisProgress {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from existing atomics (for sharing with a caller-owned worker)
    pub fn from_atomics(
        completed: Arc<AtomicUsize>,
        total: Arc<AtomicUsize>,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            completed,
            total,
            cancelled,
        }
    }

    /// Number of finished partitions
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Number of partitions in the current run, 0 before the run starts
    #[must_use]
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    /// Completed fraction in `[0, 1]`
    #[must_use]
    pub fn fraction(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            (self.completed() as f64 / total as f64).min(1.0)
        }
    }

    /// Request cancellation; the engine stops before its next partition
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub(crate) fn begin(&self, total: usize) {
        self.completed.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    pub(crate) fn increment(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let progress = AnalysisProgress::new();
        let observer = progress.clone();

        progress.begin(4);
        progress.increment();
        assert_eq!(observer.completed(), 1);
        assert_eq!(observer.total(), 4);
        assert_eq!(observer.fraction(), 0.25);

        observer.cancel();
        assert!(progress.is_cancelled());
    }

    #[test]
    fn test_fraction_before_start() {
        assert_eq!(AnalysisProgress::new().fraction(), 0.0);
    }
}
