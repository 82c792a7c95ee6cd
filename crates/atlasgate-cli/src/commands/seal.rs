use std::path::PathBuf;

use anyhow::{Context, Result};
use atlasgate_core::{ContainerKey, seal_container};
use clap::Args as ClapArgs;
use tracing::{info, instrument};

#[derive(ClapArgs)]
pub struct Args {
    /// Plaintext file to wrap
    pub input: PathBuf,

    /// Where to write the container
    pub output: PathBuf,
}

#[instrument(level = "info", name = "cmd::seal", skip_all, fields(input = %args.input.display()))]
pub fn execute(args: &Args, key: &ContainerKey) -> Result<()> {
    let plaintext = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let sealed = seal_container(&plaintext, key)?;
    std::fs::write(&args.output, &sealed)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    info!(
        output = %args.output.display(),
        plaintext = plaintext.len(),
        sealed = sealed.len(),
        "Sealed container"
    );
    Ok(())
}
