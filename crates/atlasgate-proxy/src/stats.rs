use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for [`CacheProxy`](crate::CacheProxy).
#[derive(Debug, Default)]
pub struct ProxyStats {
    pub disk_hits: AtomicU64,
    pub disk_misses: AtomicU64,
    /// Cache files that existed but could not be used.
    pub corrupt_reads: AtomicU64,
    /// Requests that joined an in-flight fetch instead of starting one.
    pub dedup_joins: AtomicU64,
    pub network_fetches: AtomicU64,
    pub attempts: AtomicU64,
    pub cache_writes: AtomicU64,
    pub cache_write_failures: AtomicU64,
}

macro_rules! recorder {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            #[inline]
            pub fn $name(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl ProxyStats {
    pub fn new() -> Self {
        Self::default()
    }

    recorder! {
        record_disk_hit => disk_hits,
        record_disk_miss => disk_misses,
        record_corrupt_read => corrupt_reads,
        record_dedup_join => dedup_joins,
        record_network_fetch => network_fetches,
        record_attempt => attempts,
        record_cache_write => cache_writes,
        record_cache_write_failure => cache_write_failures,
    }

    pub fn attempt_count(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn fetch_count(&self) -> u64 {
        self.network_fetches.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ProxyStatsSnapshot {
        ProxyStatsSnapshot {
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            disk_misses: self.disk_misses.load(Ordering::Relaxed),
            corrupt_reads: self.corrupt_reads.load(Ordering::Relaxed),
            dedup_joins: self.dedup_joins.load(Ordering::Relaxed),
            network_fetches: self.network_fetches.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            cache_writes: self.cache_writes.load(Ordering::Relaxed),
            cache_write_failures: self.cache_write_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProxyStatsSnapshot {
    pub disk_hits: u64,
    pub disk_misses: u64,
    pub corrupt_reads: u64,
    pub dedup_joins: u64,
    pub network_fetches: u64,
    pub attempts: u64,
    pub cache_writes: u64,
    pub cache_write_failures: u64,
}

impl ProxyStatsSnapshot {
    /// Fraction of requests answered from disk.
    pub fn disk_hit_rate(&self) -> f64 {
        let total = self.disk_hits + self.disk_misses;
        if total == 0 {
            0.0
        } else {
            self.disk_hits as f64 / total as f64
        }
    }
}
