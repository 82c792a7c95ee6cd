//! Two-tier sprite frame cache.
//!
//! Tier one holds decoded atlases keyed `"<entity>/<action>"`; tier two holds
//! cropped PNG frames keyed `"<entity>/<action>/<frame file>"`. Both tiers are
//! filled through moka's get-or-create entry API, so concurrent requests for the
//! same key decode or crop at most once.
//!
//! Decoding an atlas spawns a background sweep that crops every frame of the
//! action. Serving the frame whose index equals `frame_count - 1` evicts the
//! atlas together with every frame listed for its action.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use bytes::Bytes;
use moka::future::Cache;
use thiserror::Error;
use tracing::{debug, info, instrument, trace, warn};

use crate::{
    container::{self, ContainerError, ContainerKey, DEFAULT_EXTENSION},
    frame::{Atlas, FrameDescriptor, FrameError},
    metadata::{ActionFrames, AnimationMetadata, DEFAULT_META_FILE, MetadataError},
    stats::SpriteStats,
};

const FRAME_MARKER: &str = "Frame_";
const FRAME_SUFFIX: &str = ".png";

/// Tuning knobs for [`SpriteCache`].
#[derive(Debug, Clone)]
pub struct SpriteCacheConfig {
    /// Container file extension, dot included.
    pub extension: String,
    pub meta_file: String,
    /// Upper bound on cached frames.
    pub frame_capacity: u64,
    /// Upper bound on decoded atlases held at once.
    pub atlas_capacity: u64,
}

impl Default for SpriteCacheConfig {
    fn default() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.to_string(),
            meta_file: DEFAULT_META_FILE.to_string(),
            frame_capacity: 4096,
            atlas_capacity: 64,
        }
    }
}

#[derive(Error, Debug)]
pub enum SpriteError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("No frames in action '{action}'")]
    NoFrames { action: String },

    #[error("Frame '{frame}' not in metadata for action '{action}'")]
    FrameNotFound { action: String, frame: String },

    #[error("Atlas file not found: {}", path.display())]
    AtlasNotFound { path: PathBuf },

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("Image task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// An error produced by another caller's initialization of the same key.
    #[error(transparent)]
    Shared(Arc<SpriteError>),
}

impl SpriteError {
    /// True for missing metadata, actions, frames and atlases.
    pub fn is_not_found(&self) -> bool {
        match self {
            SpriteError::Metadata(e) => e.is_not_found(),
            SpriteError::NoFrames { .. }
            | SpriteError::FrameNotFound { .. }
            | SpriteError::AtlasNotFound { .. } => true,
            SpriteError::Shared(inner) => inner.is_not_found(),
            _ => false,
        }
    }

    /// HTTP status this error maps to.
    pub fn status_code(&self) -> u16 {
        if self.is_not_found() { 404 } else { 500 }
    }

    /// Strip [`SpriteError::Shared`] wrappers.
    pub fn root(&self) -> &SpriteError {
        match self {
            SpriteError::Shared(inner) => inner.root(),
            other => other,
        }
    }
}

/// One frame of one entity's action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameRequest {
    pub entity_id: String,
    pub action: String,
    pub frame_file: String,
}

impl FrameRequest {
    pub fn new(
        entity_id: impl Into<String>,
        action: impl Into<String>,
        frame_file: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            action: action.into(),
            frame_file: frame_file.into(),
        }
    }

    /// Atlas tier key.
    pub fn cache_key(&self) -> String {
        atlas_key(&self.entity_id, &self.action)
    }

    /// Frame tier key.
    pub fn frame_key(&self) -> String {
        frame_key(&self.cache_key(), &self.frame_file)
    }
}

fn atlas_key(entity_id: &str, action: &str) -> String {
    format!("{entity_id}/{action}")
}

fn frame_key(cache_key: &str, frame_file: &str) -> String {
    format!("{cache_key}/{frame_file}")
}

/// Index encoded in a frame file name as `Frame_<digits>.png`.
///
/// Returns 1 when the name carries no parseable index.
pub fn frame_index(frame_file: &str) -> usize {
    frame_file
        .match_indices(FRAME_MARKER)
        .find_map(|(start, _)| {
            let rest = &frame_file[start + FRAME_MARKER.len()..];
            let end = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            let (digits, tail) = rest.split_at(end);
            if digits.is_empty() || !tail.starts_with(FRAME_SUFFIX) {
                return None;
            }
            digits.parse().ok()
        })
        .unwrap_or(1)
}

/// A decoded atlas with the frame list it was decoded for.
#[derive(Debug)]
pub struct AtlasEntry {
    pub atlas: Atlas,
    pub frames: ActionFrames,
}

struct Inner {
    key: ContainerKey,
    config: SpriteCacheConfig,
    atlases: Cache<String, Arc<AtlasEntry>>,
    frames: Cache<String, Bytes>,
    stats: SpriteStats,
}

/// Shared sprite cache service. Cloning is cheap and shares the tiers.
#[derive(Clone)]
pub struct SpriteCache {
    inner: Arc<Inner>,
}

impl SpriteCache {
    pub fn new(key: ContainerKey, config: SpriteCacheConfig) -> Self {
        let atlases = Cache::builder()
            .name("sprite-atlases")
            .max_capacity(config.atlas_capacity)
            .build();
        let frames = Cache::builder()
            .name("sprite-frames")
            .max_capacity(config.frame_capacity)
            .build();
        Self {
            inner: Arc::new(Inner {
                key,
                config,
                atlases,
                frames,
                stats: SpriteStats::new(),
            }),
        }
    }

    pub fn config(&self) -> &SpriteCacheConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> &SpriteStats {
        &self.inner.stats
    }

    pub fn contains_atlas(&self, entity_id: &str, action: &str) -> bool {
        self.inner.atlases.contains_key(&atlas_key(entity_id, action))
    }

    pub fn contains_frame(&self, request: &FrameRequest) -> bool {
        self.inner.frames.contains_key(&request.frame_key())
    }

    /// Load the metadata beside the containers, then serve the frame.
    #[instrument(level = "info", skip(self), fields(
        entity = %request.entity_id,
        action = %request.action,
        frame = %request.frame_file,
    ))]
    pub async fn serve_frame(
        &self,
        request: &FrameRequest,
        actions_dir: &Path,
    ) -> Result<Bytes, SpriteError> {
        let metadata = AnimationMetadata::load(actions_dir, &self.inner.config.meta_file).await?;
        self.get_frame(request, actions_dir, &metadata).await
    }

    /// Serve one frame as PNG bytes using already-loaded metadata.
    pub async fn get_frame(
        &self,
        request: &FrameRequest,
        actions_dir: &Path,
        metadata: &AnimationMetadata,
    ) -> Result<Bytes, SpriteError> {
        let frames = metadata
            .action(&request.action)
            .filter(|frames| !frames.is_empty())
            .ok_or_else(|| SpriteError::NoFrames {
                action: request.action.clone(),
            })?;
        let frame_length = frames.len();
        let frame = *frames
            .get(&request.frame_file)
            .ok_or_else(|| SpriteError::FrameNotFound {
                action: request.action.clone(),
                frame: request.frame_file.clone(),
            })?;

        let cache_key = request.cache_key();
        let entry = self
            .atlas_entry(&cache_key, actions_dir, &request.action, frames)
            .await?;

        self.frame_from_entry(request, &entry, frame, frame_length).await
    }

    /// Decode the atlas for `action` so its frames are swept into the cache.
    pub async fn warm(
        &self,
        entity_id: &str,
        action: &str,
        actions_dir: &Path,
    ) -> Result<(), SpriteError> {
        let metadata = AnimationMetadata::load(actions_dir, &self.inner.config.meta_file).await?;
        let frames = metadata
            .action(action)
            .filter(|frames| !frames.is_empty())
            .ok_or_else(|| SpriteError::NoFrames {
                action: action.to_string(),
            })?;
        self.atlas_entry(&atlas_key(entity_id, action), actions_dir, action, frames)
            .await?;
        Ok(())
    }

    /// Drop every cached atlas and frame.
    pub fn clear(&self) {
        self.inner.atlases.invalidate_all();
        self.inner.frames.invalidate_all();
        debug!("Sprite cache cleared");
    }

    async fn atlas_entry(
        &self,
        cache_key: &str,
        actions_dir: &Path,
        action: &str,
        frames: &ActionFrames,
    ) -> Result<Arc<AtlasEntry>, SpriteError> {
        let stats = &self.inner.stats;
        if let Some(entry) = self.inner.atlases.get(cache_key).await {
            stats.atlas.record_hit();
            trace!(cache_key, "Atlas cache hit");
            return Ok(entry);
        }
        stats.atlas.record_miss();

        let path = actions_dir.join(format!("{action}{}", self.inner.config.extension));
        let init = load_atlas(&self.inner, path, frames.clone());
        let entry = self
            .inner
            .atlases
            .entry(cache_key.to_string())
            .or_try_insert_with(init)
            .await
            .map_err(SpriteError::Shared)?;

        if entry.is_fresh() {
            stats.atlas.record_insert();
            let entry = entry.into_value();
            self.spawn_prefetch(cache_key.to_string(), Arc::clone(&entry));
            Ok(entry)
        } else {
            Ok(entry.into_value())
        }
    }

    async fn frame_png(
        &self,
        key: &str,
        entry: &Arc<AtlasEntry>,
        frame: FrameDescriptor,
    ) -> Result<Bytes, SpriteError> {
        let stats = &self.inner.stats;
        if let Some(png) = self.inner.frames.get(key).await {
            stats.frames.record_hit();
            debug!(key, "Frame cache hit");
            return Ok(png);
        }
        stats.frames.record_miss();
        debug!(key, "Frame cache miss, cropping on demand");

        let init = crop_frame(&self.inner, entry.atlas.clone(), frame);
        let png = self
            .inner
            .frames
            .entry(key.to_string())
            .or_try_insert_with(init)
            .await
            .map_err(SpriteError::Shared)?;
        if png.is_fresh() {
            stats.frames.record_insert();
        }
        Ok(png.into_value())
    }

    /// Serve one frame of `entry`, evicting the animation on its final frame.
    async fn frame_from_entry(
        &self,
        request: &FrameRequest,
        entry: &Arc<AtlasEntry>,
        frame: FrameDescriptor,
        frame_length: usize,
    ) -> Result<Bytes, SpriteError> {
        let cache_key = request.cache_key();
        let key = frame_key(&cache_key, &request.frame_file);
        let png = self.frame_png(&key, entry, frame).await?;

        if frame_index(&request.frame_file) == frame_length - 1 {
            self.evict(&cache_key, entry).await;
        } else if !self.is_live(&cache_key, entry).await {
            // The final frame was served while this crop ran.
            self.inner.frames.invalidate(&key).await;
            debug!(key, "Dropped frame cropped from an evicted atlas");
        }
        Ok(png)
    }

    fn spawn_prefetch(&self, cache_key: String, entry: Arc<AtlasEntry>) {
        let cache = self.clone();
        tokio::spawn(async move { cache.prefetch(&cache_key, &entry).await });
    }

    /// Crop every frame of `entry` not yet cached. Stops once the entry is
    /// no longer the live atlas for `cache_key`.
    async fn prefetch(&self, cache_key: &str, entry: &Arc<AtlasEntry>) {
        let stats = &self.inner.stats;
        stats.record_sweep();
        let mut cropped = 0usize;

        for (name, frame) in &entry.frames {
            if !self.is_live(cache_key, entry).await {
                debug!(cache_key, cropped, "Prefetch sweep stopped, atlas evicted");
                return;
            }
            let key = frame_key(cache_key, name);
            if self.inner.frames.contains_key(&key) {
                continue;
            }

            let init = crop_frame(&self.inner, entry.atlas.clone(), *frame);
            match self
                .inner
                .frames
                .entry(key.clone())
                .or_try_insert_with(init)
                .await
            {
                Ok(png) if png.is_fresh() => {
                    stats.frames.record_insert();
                    cropped += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(cache_key, frame = %name, error = %e, "Prefetch crop failed");
                    continue;
                }
            }

            // The final frame may have been served while this crop ran.
            if !self.is_live(cache_key, entry).await {
                self.inner.frames.invalidate(&key).await;
                debug!(cache_key, cropped, "Prefetch sweep stopped, atlas evicted");
                return;
            }
        }
        debug!(cache_key, cropped, "Prefetch sweep complete");
    }

    async fn is_live(&self, cache_key: &str, entry: &Arc<AtlasEntry>) -> bool {
        self.inner
            .atlases
            .get(cache_key)
            .await
            .is_some_and(|current| Arc::ptr_eq(&current, entry))
    }

    async fn evict(&self, cache_key: &str, entry: &AtlasEntry) {
        self.inner.atlases.invalidate(cache_key).await;
        for name in entry.frames.keys() {
            self.inner.frames.invalidate(&frame_key(cache_key, name)).await;
        }
        let stats = &self.inner.stats;
        stats.atlas.record_evictions(1);
        stats.frames.record_evictions(entry.frames.len() as u64);
        stats.record_animation_eviction();
        info!(cache_key, frames = entry.frames.len(), "Evicted animation after final frame");
    }
}

impl std::fmt::Debug for SpriteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpriteCache")
            .field("config", &self.inner.config)
            .field("atlases", &self.inner.atlases.entry_count())
            .field("frames", &self.inner.frames.entry_count())
            .finish_non_exhaustive()
    }
}

async fn load_atlas(
    inner: &Inner,
    path: PathBuf,
    frames: ActionFrames,
) -> Result<Arc<AtlasEntry>, SpriteError> {
    let plaintext = match container::decrypt_container_file(&path, &inner.key).await {
        Ok(plaintext) => plaintext,
        Err(e) if e.is_not_found() => return Err(SpriteError::AtlasNotFound { path }),
        Err(e) => return Err(e.into()),
    };
    let atlas = tokio::task::spawn_blocking(move || Atlas::decode(&plaintext)).await??;
    inner.stats.record_decode();
    info!(
        path = %path.display(),
        width = atlas.width(),
        height = atlas.height(),
        frames = frames.len(),
        "Decoded atlas"
    );
    Ok(Arc::new(AtlasEntry { atlas, frames }))
}

async fn crop_frame(
    inner: &Inner,
    atlas: Atlas,
    frame: FrameDescriptor,
) -> Result<Bytes, SpriteError> {
    let png = tokio::task::spawn_blocking(move || atlas.crop(&frame)).await??;
    inner.stats.record_crop();
    Ok(Bytes::from(png))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_index() {
        assert_eq!(frame_index("Frame_0.png"), 0);
        assert_eq!(frame_index("Frame_12.png"), 12);
        assert_eq!(frame_index("walk_Frame_3.png"), 3);
        assert_eq!(frame_index("Frame_x Frame_4.png"), 4);
    }

    #[test]
    fn test_frame_index_defaults_to_one() {
        assert_eq!(frame_index("idle.png"), 1);
        assert_eq!(frame_index("Frame_.png"), 1);
        assert_eq!(frame_index("Frame_7.jpg"), 1);
        assert_eq!(frame_index("Frame_99999999999999999999999.png"), 1);
    }

    #[test]
    fn test_keys() {
        let request = FrameRequest::new("1", "run", "Frame_0.png");
        assert_eq!(request.cache_key(), "1/run");
        assert_eq!(request.frame_key(), "1/run/Frame_0.png");
    }

    fn strip_entry(count: u32) -> Arc<AtlasEntry> {
        use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

        let image = RgbaImage::from_pixel(count * 8, 8, Rgba([0, 0, 255, 255]));
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(image)
            .write_to(&mut std::io::Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        let mut metadata = AnimationMetadata::new();
        for i in 0..count {
            let frame = FrameDescriptor::new(i * 8, 0, 8, 8);
            metadata.insert_frame("run", format!("Frame_{i}.png"), frame);
        }
        Arc::new(AtlasEntry {
            atlas: Atlas::decode(&png).unwrap(),
            frames: metadata.action("run").unwrap().clone(),
        })
    }

    #[tokio::test]
    async fn test_frame_cropped_after_eviction_is_dropped() {
        let cache = SpriteCache::new(ContainerKey::builtin(), SpriteCacheConfig::default());
        let entry = strip_entry(3);
        let request = FrameRequest::new("1", "run", "Frame_0.png");
        let frame = entry.frames["Frame_0.png"];

        // Another request already served the final frame and evicted this atlas.
        cache.inner.atlases.insert(request.cache_key(), Arc::clone(&entry)).await;
        cache.evict(&request.cache_key(), &entry).await;

        let png = cache.frame_from_entry(&request, &entry, frame, 3).await.unwrap();
        assert!(!png.is_empty());
        assert!(!cache.contains_frame(&request));
    }

    #[tokio::test]
    async fn test_frame_of_live_atlas_stays_cached() {
        let cache = SpriteCache::new(ContainerKey::builtin(), SpriteCacheConfig::default());
        let entry = strip_entry(3);
        let request = FrameRequest::new("1", "run", "Frame_1.png");
        let frame = entry.frames["Frame_1.png"];
        cache.inner.atlases.insert(request.cache_key(), Arc::clone(&entry)).await;

        cache.frame_from_entry(&request, &entry, frame, 3).await.unwrap();
        assert!(cache.contains_frame(&request));
        assert!(cache.contains_atlas("1", "run"));
    }

    #[test]
    fn test_error_classification() {
        let not_found = SpriteError::FrameNotFound {
            action: "run".into(),
            frame: "Frame_9.png".into(),
        };
        assert!(not_found.is_not_found());
        assert_eq!(not_found.status_code(), 404);

        let shared = SpriteError::Shared(Arc::new(SpriteError::AtlasNotFound {
            path: PathBuf::from("/x/run.techybuddy"),
        }));
        assert_eq!(shared.status_code(), 404);
        assert!(matches!(shared.root(), SpriteError::AtlasNotFound { .. }));

        let integrity = SpriteError::Container(ContainerError::Authentication {
            context: container::ContainerContext::new(),
        });
        assert_eq!(integrity.status_code(), 500);
    }
}
