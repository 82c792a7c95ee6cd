pub mod container;
pub mod error;
pub mod frame;
pub mod metadata;
pub mod sprite;
pub mod stats;

pub use container::{
    ContainerKey, DEFAULT_EXTENSION, decrypt_container, decrypt_container_file, has_magic,
    seal_container, seal_container_file,
};
pub use frame::{Atlas, FrameDescriptor, crop};
pub use metadata::{AnimationMetadata, DEFAULT_META_FILE};
pub use sprite::{FrameRequest, SpriteCache, SpriteCacheConfig, frame_index};
pub use stats::{CacheStats, CacheStatsSnapshot, SpriteStats, SpriteStatsSnapshot};
