use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Point-in-time copy of the pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Entries whose submit returned success.
    pub accepted: u64,
    /// Entries written to the backend.
    pub delivered: u64,
    /// Submits rejected because the queue stayed full.
    pub saturated: u64,
    /// Backend writes that failed (dead-lettered in async mode).
    pub write_failures: u64,
    /// Entries accepted but not yet taken by the consumer.
    pub queue_depth: usize,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCollector {
    accepted: AtomicU64,
    delivered: AtomicU64,
    saturated: AtomicU64,
    write_failures: AtomicU64,
    queue_depth: AtomicUsize,
}

impl StatsCollector {
    pub(crate) fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            saturated: self.saturated.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Must run before the entry is sent.
    pub(crate) fn enter_queue(&self) {
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn leave_queue(&self) {
        // Saturating so a racing snapshot never sees a wrapped value
        let _ = self
            .queue_depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |depth| {
                Some(depth.saturating_sub(1))
            });
    }

    pub(crate) fn record_saturated(&self) {
        self.saturated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }
}
