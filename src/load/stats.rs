//! Round-trip counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counts statements issued on behalf of fetches.
///
/// Lazy refetches are counted apart from relation cache hits so a
/// regression to per-record queries shows up as a growing `refetches`.
#[derive(Debug, Default)]
pub struct LoadStats {
    primary: AtomicU64,
    secondary: AtomicU64,
    writes: AtomicU64,
    cache_hits: AtomicU64,
    refetches: AtomicU64,
}

/// A point-in-time copy of [`LoadStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStatsSnapshot {
    pub primary: u64,
    pub secondary: u64,
    pub writes: u64,
    pub cache_hits: u64,
    pub refetches: u64,
}

impl LoadStatsSnapshot {
    /// Statements sent to storage, reads and writes.
    pub fn statements(&self) -> u64 {
        self.primary + self.secondary + self.writes + self.refetches
    }
}

impl LoadStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_primary(&self) {
        self.primary.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_secondary(&self) {
        self.secondary.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_refetch(&self) {
        self.refetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LoadStatsSnapshot {
        LoadStatsSnapshot {
            primary: self.primary.load(Ordering::Relaxed),
            secondary: self.secondary.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            refetches: self.refetches.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.primary,
            &self.secondary,
            &self.writes,
            &self.cache_hits,
            &self.refetches,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
