//! Animation metadata (`tb-meta.json`).
//!
//! The file sits beside the action containers and maps each action to its
//! frames:
//!
//! ```json
//! { "meta": { "run": { "Frame_0.png": { "x": 0, "y": 0, "width": 32, "height": 32 } } } }
//! ```

use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::frame::FrameDescriptor;

/// Default metadata file name inside an actions directory.
pub const DEFAULT_META_FILE: &str = "tb-meta.json";

/// Frame file name to rectangle, for one action.
pub type ActionFrames = BTreeMap<String, FrameDescriptor>;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Metadata file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read metadata {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid metadata {}: {source}", path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl MetadataError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, MetadataError::NotFound { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationMetadata {
    #[serde(default)]
    meta: BTreeMap<String, ActionFrames>,
}

impl AnimationMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `<actions_dir>/<meta_file>`.
    #[instrument(level = "debug", skip(actions_dir), fields(dir = %actions_dir.as_ref().display()))]
    pub async fn load(
        actions_dir: impl AsRef<Path>,
        meta_file: &str,
    ) -> Result<Self, MetadataError> {
        let path = actions_dir.as_ref().join(meta_file);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(MetadataError::NotFound { path });
            }
            Err(source) => return Err(MetadataError::Io { path, source }),
        };
        let metadata = Self::from_slice(&bytes, &path)?;
        debug!(actions = metadata.meta.len(), "Loaded animation metadata");
        Ok(metadata)
    }

    /// Parse metadata bytes; `origin` is only used for error context.
    pub fn from_slice(bytes: &[u8], origin: &Path) -> Result<Self, MetadataError> {
        serde_json::from_slice(bytes).map_err(|source| MetadataError::Invalid {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn action(&self, action: &str) -> Option<&ActionFrames> {
        self.meta.get(action)
    }

    pub fn frame(&self, action: &str, frame_file: &str) -> Option<&FrameDescriptor> {
        self.meta.get(action)?.get(frame_file)
    }

    /// Number of frames in `action`, zero when the action is unknown.
    pub fn frame_count(&self, action: &str) -> usize {
        self.meta.get(action).map_or(0, BTreeMap::len)
    }

    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.meta.keys().map(String::as_str)
    }

    pub fn insert_frame(
        &mut self,
        action: impl Into<String>,
        frame_file: impl Into<String>,
        frame: FrameDescriptor,
    ) {
        self.meta
            .entry(action.into())
            .or_default()
            .insert(frame_file.into(), frame);
    }

    pub fn to_json_pretty(&self) -> String {
        // A map of plain structs always serializes.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
