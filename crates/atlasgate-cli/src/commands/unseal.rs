use std::{
    io::{self, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use atlasgate_core::ContainerKey;
use clap::Args as ClapArgs;
use tracing::instrument;

use super::open_container;

#[derive(ClapArgs)]
pub struct Args {
    /// Container file to decrypt
    pub input: PathBuf,

    /// Output file (stdout if omitted)
    pub output: Option<PathBuf>,
}

#[instrument(level = "info", name = "cmd::unseal", skip_all, fields(input = %args.input.display()))]
pub fn execute(args: &Args, key: &ContainerKey) -> Result<()> {
    let plaintext = open_container(&args.input, key)?;
    match &args.output {
        Some(path) => std::fs::write(path, &plaintext)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => io::stdout().write_all(&plaintext)?,
    }
    Ok(())
}
