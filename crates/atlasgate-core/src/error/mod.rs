//! Error types for the core crate
//!
//! Re-exported here so callers can match on any core failure from one place.

pub use crate::container::{ContainerContext, ContainerError};
pub use crate::frame::FrameError;
pub use crate::metadata::MetadataError;
pub use crate::sprite::SpriteError;
