//! Shared fixtures for core integration tests.
#![allow(dead_code)]

use std::{
    io::Cursor,
    path::Path,
    time::Duration,
};

use atlasgate_core::{
    AnimationMetadata, ContainerKey, DEFAULT_EXTENSION, DEFAULT_META_FILE, FrameDescriptor,
    seal_container,
};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

/// Encode an RGBA raster as PNG.
pub fn encode_png(image: RgbaImage) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

/// A horizontal strip of `count` square frames; frame `i` is filled with red `i * 40`.
pub fn strip_atlas(count: u32, size: u32) -> Vec<u8> {
    let image = RgbaImage::from_fn(count * size, size, |x, _| {
        Rgba([((x / size) * 40) as u8, 0, 255, 255])
    });
    encode_png(image)
}

/// Frame descriptors matching [`strip_atlas`], named `Frame_<i>.png`.
pub fn strip_frames(count: u32, size: u32) -> Vec<(String, FrameDescriptor)> {
    (0..count)
        .map(|i| {
            (
                format!("Frame_{i}.png"),
                FrameDescriptor::new(i * size, 0, size, size),
            )
        })
        .collect()
}

/// Write sealed strip atlases plus a shared `tb-meta.json` into `dir`.
///
/// Each entry is `(action, frame count)`; frames are 32x32.
pub fn write_actions(dir: &Path, actions: &[(&str, u32)]) -> AnimationMetadata {
    let key = ContainerKey::builtin();
    let mut metadata = AnimationMetadata::new();
    for (action, count) in actions {
        let sealed = seal_container(&strip_atlas(*count, 32), &key).unwrap();
        std::fs::write(dir.join(format!("{action}{DEFAULT_EXTENSION}")), sealed).unwrap();
        for (name, frame) in strip_frames(*count, 32) {
            metadata.insert_frame(*action, name, frame);
        }
    }
    std::fs::write(dir.join(DEFAULT_META_FILE), metadata.to_json_pretty()).unwrap();
    metadata
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub fn png_dimensions(png: &[u8]) -> (u32, u32) {
    let image = image::load_from_memory(png).unwrap();
    (image.width(), image.height())
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
