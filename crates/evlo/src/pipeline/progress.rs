use crate::progress::ProgressTracker;

/// Receives running counts after every flushed batch.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, written: usize, total: usize);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _written: usize, _total: usize) {}
}

/// Forwards batch progress of one log file into the tracker.
pub struct TrackerProgress {
    tracker: ProgressTracker,
    log_file_id: i64,
}

impl TrackerProgress {
    pub fn new(tracker: ProgressTracker, log_file_id: i64) -> Self {
        Self {
            tracker,
            log_file_id,
        }
    }
}

impl ProgressReporter for TrackerProgress {
    fn report(&self, written: usize, total: usize) {
        self.tracker
            .record_progress(self.log_file_id, written as u64, total as u64);
    }
}
