//! Atomic counters for one ingestion pipeline.
//!
//! Counters are bumped silently at the call site. Call
//! [`IngestionMetrics::flush`] to emit the current values as a single
//! `tracing::info!` event, e.g. after a batch.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Lightweight atomic counters, no allocation and no locking.
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    accepted: AtomicU64,
    rejected_structural: AtomicU64,
    rejected_quality: AtomicU64,
    pool_evictions: AtomicU64,
    archive_evictions: AtomicU64,
    trim_failures: AtomicU64,
}

/// Plain copy of the counters for export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub accepted: u64,
    pub rejected_structural: u64,
    pub rejected_quality: u64,
    pub pool_evictions: u64,
    pub archive_evictions: u64,
    pub trim_failures: u64,
}

impl IngestionMetrics {
    pub const fn new() -> Self {
        Self {
            accepted: AtomicU64::new(0),
            rejected_structural: AtomicU64::new(0),
            rejected_quality: AtomicU64::new(0),
            pool_evictions: AtomicU64::new(0),
            archive_evictions: AtomicU64::new(0),
            trim_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "accepted", "counter incremented");
    }

    pub fn inc_rejected_structural(&self) {
        self.rejected_structural.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "rejected_structural", "counter incremented");
    }

    pub fn inc_rejected_quality(&self) {
        self.rejected_quality.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "rejected_quality", "counter incremented");
    }

    pub fn inc_pool_evictions(&self) {
        self.pool_evictions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "pool_evictions", "counter incremented");
    }

    pub fn add_archive_evictions(&self, n: u64) {
        self.archive_evictions.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "archive_evictions", n = n, "counter incremented");
    }

    pub fn inc_trim_failures(&self) {
        self.trim_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "trim_failures", "counter incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected_structural: self.rejected_structural.load(Ordering::Relaxed),
            rejected_quality: self.rejected_quality.load(Ordering::Relaxed),
            pool_evictions: self.pool_evictions.load(Ordering::Relaxed),
            archive_evictions: self.archive_evictions.load(Ordering::Relaxed),
            trim_failures: self.trim_failures.load(Ordering::Relaxed),
        }
    }

    /// Emit all current counter values as one `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            accepted = s.accepted,
            rejected_structural = s.rejected_structural,
            rejected_quality = s.rejected_quality,
            pool_evictions = s.pool_evictions,
            archive_evictions = s.archive_evictions,
            trim_failures = s.trim_failures,
        );
    }
}
