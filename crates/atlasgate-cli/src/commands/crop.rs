use std::path::PathBuf;

use anyhow::{Context, Result};
use atlasgate_core::{AnimationMetadata, ContainerKey, crop, error::SpriteError};
use clap::Args as ClapArgs;
use tracing::{info, instrument};

use super::open_container;

#[derive(ClapArgs)]
pub struct Args {
    /// Atlas container
    pub container: PathBuf,

    /// Animation metadata file (tb-meta.json)
    #[arg(long)]
    pub meta: PathBuf,

    /// Action name within the metadata
    #[arg(long)]
    pub action: String,

    /// Frame file name, e.g. Frame_0.png
    #[arg(long)]
    pub frame: String,

    /// Where to write the cropped PNG
    #[arg(short, long)]
    pub output: PathBuf,
}

#[instrument(level = "info", name = "cmd::crop", skip_all, fields(action = %args.action, frame = %args.frame))]
pub fn execute(args: &Args, key: &ContainerKey) -> Result<()> {
    let raw = std::fs::read(&args.meta)
        .with_context(|| format!("Failed to read metadata: {}", args.meta.display()))?;
    let metadata = AnimationMetadata::from_slice(&raw, &args.meta)?;

    if metadata.frame_count(&args.action) == 0 {
        return Err(SpriteError::NoFrames {
            action: args.action.clone(),
        }
        .into());
    }
    let frame = *metadata
        .frame(&args.action, &args.frame)
        .ok_or_else(|| SpriteError::FrameNotFound {
            action: args.action.clone(),
            frame: args.frame.clone(),
        })?;

    let atlas = open_container(&args.container, key)?;
    let png = crop(&atlas, &frame)?;
    std::fs::write(&args.output, &png)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    info!(output = %args.output.display(), %frame, bytes = png.len(), "Cropped frame");
    Ok(())
}
