//! Block cache counters
//!
//! Counters are updated with relaxed atomics from any thread; a snapshot is
//! a consistent-enough view for logging and tests, not an exact cut.

#![allow(clippy::cast_precision_loss)] // Ratios intentionally accept precision loss

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters owned by a cache
#[derive(Debug, Default)]
pub struct CacheMetrics {
    block_hits: AtomicU64,
    block_misses: AtomicU64,
    list_hits: AtomicU64,
    list_misses: AtomicU64,
    corrupt_entries: AtomicU64,
    write_failures: AtomicU64,
    sweeps: AtomicU64,
    evictions: AtomicU64,
}

impl CacheMetrics {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_block(&self, hit: bool) {
        if hit {
            self.block_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.block_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub(crate) fn record_list(&self, hit: bool) {
        if hit {
            self.list_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.list_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_corrupt_entry(&self) {
        self.corrupt_entries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sweep(&self, evicted: u64) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        self.evictions.fetch_add(evicted, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of all counters
    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            block_hits: self.block_hits.load(Ordering::Relaxed),
            block_misses: self.block_misses.load(Ordering::Relaxed),
            list_hits: self.list_hits.load(Ordering::Relaxed),
            list_misses: self.list_misses.load(Ordering::Relaxed),
            corrupt_entries: self.corrupt_entries.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Copy of the cache counters at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMetricsSnapshot {
    /// Block reads served from a verified local file
    pub block_hits: u64,
    /// Block reads that went to the backend
    pub block_misses: u64,
    /// Listings served from a fresh local snapshot
    pub list_hits: u64,
    /// Listings that went to the backend
    pub list_misses: u64,
    /// Local files discarded because they failed verification or decoding
    pub corrupt_entries: u64,
    /// Best-effort cache writes that failed
    pub write_failures: u64,
    /// Completed directory sweeps
    pub sweeps: u64,
    /// Files removed by sweeps
    pub evictions: u64,
}

impl CacheMetricsSnapshot {
    /// Fraction of block reads served locally
    pub fn block_hit_rate(&self) -> f64 {
        let total = self.block_hits + self.block_misses;
        if total == 0 {
            0.0
        } else {
            self.block_hits as f64 / total as f64
        }
    }
}
