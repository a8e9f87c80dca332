//! Process-wide job counters shared by every worker.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters for queue depth and job outcomes.
///
/// One instance is created per [`TaskForge`](crate::core::TaskForge) and
/// shared through an `Arc`; every mutator is a single atomic operation, so
/// concurrent updates are never lost.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    queue_depth: AtomicU64,
    jobs_done: AtomicU64,
    jobs_failed: AtomicU64,
}

impl MetricsAggregator {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one successful attempt.
    pub fn record_success(&self) {
        self.jobs_done.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one failed attempt.
    pub fn record_failure(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Overwrite the last observed queue depth.
    pub fn set_queue_depth(&self, depth: u64) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    /// Point-in-time read of all counters.
    ///
    /// Each field is read atomically; the three reads are not taken under a
    /// common lock.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            jobs_done: self.jobs_done.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
        }
    }
}

/// Serialized body of the metrics endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Last observed length of the work queue
    #[serde(rename = "total_jobs_in_queue")]
    pub queue_depth: u64,
    /// Successful attempts since start
    pub jobs_done: u64,
    /// Failed attempts since start, retries included
    pub jobs_failed: u64,
}
