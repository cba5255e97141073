//! Counters kept by a running sink.

use std::sync::{Mutex, MutexGuard};

/// Metrics snapshot for a [`TextOutput`](crate::sink::TextOutput).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkMetrics {
    /// Frames accepted into the queue
    pub frames_submitted: u64,
    /// Frames decoded, formatted, written and flushed
    pub frames_written: u64,
    /// Formatted bytes written, trailer included
    pub bytes_written: u64,
    /// Submits discarded because the sink was closed or halted
    pub frames_dropped: u64,
    pub fatal_errors: u64,
}

#[derive(Debug, Default)]
pub(crate) struct MetricsCell(Mutex<SinkMetrics>);

impl MetricsCell {
    pub(crate) fn update(&self, f: impl FnOnce(&mut SinkMetrics)) {
        f(&mut self.lock());
    }

    pub(crate) fn snapshot(&self) -> SinkMetrics {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, SinkMetrics> {
        // Counters stay usable even if a panicking thread held the lock.
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
