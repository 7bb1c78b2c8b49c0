/// Receives progress updates from long-running operations.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, current: usize, total: usize, status: &str);
}

/// Discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _current: usize, _total: usize, _status: &str) {}
}

/// Forwards updates to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, current: usize, total: usize, status: &str) {
        tracing::info!(current, total, "{status}");
    }
}
