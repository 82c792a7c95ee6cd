use std::{io, path::PathBuf};

use anyhow::Result;
use atlasgate_proxy::DiskCache;
use clap::{Args as ClapArgs, Subcommand};
use tracing::instrument;

use super::small_runtime;
use crate::config::Config;

#[derive(ClapArgs)]
pub struct Args {
    /// Cache directory (overrides the config file)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Subcommand)]
pub enum CacheCommand {
    /// Remove every cached file
    Clear,

    /// Remove one cached file by its URL path
    Rm {
        /// URL path of the cached asset, e.g. img/logo.png
        name: String,
    },

    /// Print where a URL path is cached
    Path {
        name: String,
    },
}

#[instrument(level = "info", name = "cmd::cache", skip_all)]
pub fn execute(args: &Args, config: &Config) -> Result<()> {
    let root = match &args.cache_dir {
        Some(dir) => dir.clone(),
        None => config.cache_dir()?,
    };
    let cache = DiskCache::new(root);

    match &args.command {
        CacheCommand::Path { name } => {
            println!("{}", cache.path_for(name)?.display());
        }
        CacheCommand::Clear => {
            small_runtime()?.block_on(cache.clear())?;
            println!("Cleared {}", cache.root().display());
        }
        CacheCommand::Rm { name } => {
            if small_runtime()?.block_on(cache.remove(name))? {
                println!("Removed {name}");
            } else {
                return Err(io::Error::new(io::ErrorKind::NotFound, format!("Not cached: {name}")).into());
            }
        }
    }
    Ok(())
}
