//! Cache counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Required tiles that were already cached.
    pub hits: u64,
    /// Fetches started by the cache.
    pub fetches: u64,
    /// Required tiles that joined a fetch already in flight.
    pub coalesced: u64,
    /// Fetches (led or joined) that produced no tile.
    pub failures: u64,
    /// Entries removed to respect the capacity.
    pub evictions: u64,
    /// Entries currently held.
    pub entry_count: usize,
}

impl CacheStats {
    /// Fraction of required tiles served straight from cache.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.fetches + self.coalesced;
        if lookups == 0 {
            return 0.0;
        }
        self.hits as f64 / lookups as f64
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entries, {} hits, {} fetches, {} coalesced, {} failures, {} evictions",
            self.entry_count, self.hits, self.fetches, self.coalesced, self.failures, self.evictions
        )
    }
}

/// Lock-free counters updated by the cache.
#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    hits: AtomicU64,
    fetches: AtomicU64,
    coalesced: AtomicU64,
    failures: AtomicU64,
    evictions: AtomicU64,
}

impl CacheCounters {
    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fetch(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn coalesce(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn evicted(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self, entry_count: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entry_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_snapshot() {
        let counters = CacheCounters::default();
        counters.hit();
        counters.hit();
        counters.fetch();
        counters.coalesce();
        counters.failure();
        counters.evicted(3);

        let stats = counters.snapshot(7);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.fetches, 1);
        assert_eq!(stats.coalesced, 1);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.evictions, 3);
        assert_eq!(stats.entry_count, 7);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_hit_rate_empty() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_display() {
        let stats = CacheStats {
            entry_count: 4,
            evictions: 2,
            ..CacheStats::default()
        };
        let text = stats.to_string();
        assert!(text.contains("4 entries"));
        assert!(text.contains("2 evictions"));
    }
}
