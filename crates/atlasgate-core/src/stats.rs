//! Lock-free counters for the sprite cache tiers.
//!
//! All counters use `Ordering::Relaxed`; they are diagnostics, not
//! synchronization.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Hit/miss accounting for one cache tier.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub inserts: AtomicU64,
    /// Entries removed explicitly or by capacity pressure.
    pub evictions: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Returns 0.0 if no lookups have been performed.
    pub fn hit_rate(&self) -> f64 {
        self.snapshot().hit_rate()
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
}

impl CacheStatsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Work counters for [`SpriteCache`](crate::SpriteCache).
#[derive(Debug, Default)]
pub struct SpriteStats {
    pub atlas: CacheStats,
    pub frames: CacheStats,
    /// Containers decrypted and decoded into an atlas.
    pub atlas_decodes: AtomicU64,
    pub frame_crops: AtomicU64,
    pub prefetch_sweeps: AtomicU64,
    /// Animations evicted after their last frame was served.
    pub animation_evictions: AtomicU64,
}

impl SpriteStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_decode(&self) {
        self.atlas_decodes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_crop(&self) {
        self.frame_crops.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sweep(&self) {
        self.prefetch_sweeps.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_animation_eviction(&self) {
        self.animation_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_count(&self) -> u64 {
        self.atlas_decodes.load(Ordering::Relaxed)
    }

    pub fn crop_count(&self) -> u64 {
        self.frame_crops.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> SpriteStatsSnapshot {
        SpriteStatsSnapshot {
            atlas: self.atlas.snapshot(),
            frames: self.frames.snapshot(),
            atlas_decodes: self.atlas_decodes.load(Ordering::Relaxed),
            frame_crops: self.frame_crops.load(Ordering::Relaxed),
            prefetch_sweeps: self.prefetch_sweeps.load(Ordering::Relaxed),
            animation_evictions: self.animation_evictions.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SpriteStatsSnapshot {
    pub atlas: CacheStatsSnapshot,
    pub frames: CacheStatsSnapshot,
    pub atlas_decodes: u64,
    pub frame_crops: u64,
    pub prefetch_sweeps: u64,
    pub animation_evictions: u64,
}
