pub mod cache;
pub mod crop;
pub mod seal;
pub mod serve;
pub mod unseal;

use std::path::Path;

use anyhow::{Context, Result};
use atlasgate_core::{ContainerKey, container::decrypt_container_with_context, error::ContainerContext};

/// Read and decrypt a container file, keeping its path in any error.
pub fn open_container(path: &Path, key: &ContainerKey) -> Result<Vec<u8>> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read container: {}", path.display()))?;
    let plaintext =
        decrypt_container_with_context(&data, key, &ContainerContext::new().with_path(path))?;
    Ok(plaintext)
}

/// Current-thread runtime for commands that touch async APIs briefly.
pub fn small_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}
