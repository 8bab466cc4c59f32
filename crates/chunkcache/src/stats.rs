//! Cache statistics
//!
//! Monotonic counters plus a resident-chunk gauge, all updated with relaxed
//! atomics; the host scrapes them through `ChunkCache::stats`.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub(crate) struct CacheStats {
    /// `get` calls against an enabled cache
    pub(crate) lookups: AtomicU64,
    /// Chunks served from cache (excludes copies from a self-populated fetch)
    pub(crate) hits: AtomicU64,
    /// Chunks fetched and published
    pub(crate) chunks_admitted: AtomicU64,
    /// Chunks freed by the evictor
    pub(crate) chunks_evicted: AtomicU64,
    /// Admissions refused because the cache was full
    pub(crate) exceeded_capacity: AtomicU64,
    /// Lookups that gave up waiting on an in-flight fetch
    pub(crate) retries: AtomicU64,
    /// Valid chunks currently resident
    pub(crate) chunks: AtomicU64,
}

impl CacheStats {
    pub(crate) fn snapshot(&self, bytes: u64) -> StatsSnapshot {
        StatsSnapshot {
            lookups: self.lookups.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            chunks_admitted: self.chunks_admitted.load(Ordering::Relaxed),
            chunks_evicted: self.chunks_evicted.load(Ordering::Relaxed),
            exceeded_capacity: self.exceeded_capacity.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            chunks: self.chunks.load(Ordering::Relaxed),
            bytes,
        }
    }
}

/// Point-in-time view of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub lookups: u64,
    pub hits: u64,
    pub chunks_admitted: u64,
    pub chunks_evicted: u64,
    pub exceeded_capacity: u64,
    pub retries: u64,
    /// Valid chunks currently resident (gauge)
    pub chunks: u64,
    /// Payload bytes currently allocated, including in-flight reservations (gauge)
    pub bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = CacheStats::default();
        stats.lookups.fetch_add(3, Ordering::Relaxed);
        stats.hits.fetch_add(2, Ordering::Relaxed);
        stats.chunks.fetch_add(1, Ordering::Relaxed);

        let snap = stats.snapshot(65536);
        assert_eq!(snap.lookups, 3);
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.chunks, 1);
        assert_eq!(snap.bytes, 65536);
        assert_eq!(snap.chunks_evicted, 0);
    }
}
