//! Frame extraction from decoded sprite atlases.
//!
//! An atlas is decoded once into an RGBA raster and then cropped many times.
//! Every crop is re-encoded as a standalone lossless PNG of exactly the frame's
//! size.

use std::{fmt, io::Cursor, sync::Arc};

use image::{DynamicImage, ImageFormat, RgbaImage, imageops};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{instrument, trace};

/// A pixel rectangle inside an atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDescriptor {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Untrimmed width of the original frame, when the packer trimmed it.
    #[serde(
        default,
        rename = "sourceW",
        alias = "sourceWidth",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_width: Option<u32>,
    #[serde(
        default,
        rename = "sourceH",
        alias = "sourceHeight",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_height: Option<u32>,
}

impl FrameDescriptor {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            source_width: None,
            source_height: None,
        }
    }

    /// Right edge, or `None` if it overflows `u32`.
    fn right(&self) -> Option<u32> {
        self.x.checked_add(self.width)
    }

    fn bottom(&self) -> Option<u32> {
        self.y.checked_add(self.height)
    }
}

impl fmt::Display for FrameDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} at ({}, {})",
            self.width, self.height, self.x, self.y
        )
    }
}

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Failed to decode atlas image: {0}")]
    Decode(#[source] image::ImageError),

    /// The rectangle reaches outside the atlas.
    #[error("Frame {frame} exceeds atlas bounds {atlas_width}x{atlas_height}")]
    Bounds {
        frame: FrameDescriptor,
        atlas_width: u32,
        atlas_height: u32,
    },

    #[error("Frame {frame} has zero area")]
    Empty { frame: FrameDescriptor },

    #[error("Failed to encode frame as PNG: {0}")]
    Encode(#[source] image::ImageError),
}

/// A decoded atlas raster, cheap to clone.
#[derive(Clone)]
pub struct Atlas {
    image: Arc<RgbaImage>,
}

impl Atlas {
    /// Decode an atlas from encoded image bytes (PNG in practice).
    #[instrument(level = "debug", skip(bytes), fields(size = bytes.len()))]
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let image = image::load_from_memory(bytes)
            .map_err(FrameError::Decode)?
            .to_rgba8();
        trace!(
            width = image.width(),
            height = image.height(),
            "Decoded atlas"
        );
        Ok(Self {
            image: Arc::new(image),
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn check_bounds(&self, frame: &FrameDescriptor) -> Result<(), FrameError> {
        if frame.width == 0 || frame.height == 0 {
            return Err(FrameError::Empty { frame: *frame });
        }
        let fits = frame.right().is_some_and(|r| r <= self.width())
            && frame.bottom().is_some_and(|b| b <= self.height());
        if fits {
            Ok(())
        } else {
            Err(FrameError::Bounds {
                frame: *frame,
                atlas_width: self.width(),
                atlas_height: self.height(),
            })
        }
    }

    /// Crop `frame` out of the atlas and encode it as PNG.
    pub fn crop(&self, frame: &FrameDescriptor) -> Result<Vec<u8>, FrameError> {
        self.check_bounds(frame)?;

        let region =
            imageops::crop_imm(&*self.image, frame.x, frame.y, frame.width, frame.height)
                .to_image();

        let mut png = Vec::new();
        DynamicImage::ImageRgba8(region)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(FrameError::Encode)?;
        trace!(%frame, png_size = png.len(), "Cropped frame");
        Ok(png)
    }
}

impl fmt::Debug for Atlas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Atlas")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Decode `atlas_bytes` and crop a single frame from it.
///
/// Prefer [`Atlas::decode`] plus [`Atlas::crop`] when cropping several frames.
pub fn crop(atlas_bytes: &[u8], frame: &FrameDescriptor) -> Result<Vec<u8>, FrameError> {
    Atlas::decode(atlas_bytes)?.crop(frame)
}
