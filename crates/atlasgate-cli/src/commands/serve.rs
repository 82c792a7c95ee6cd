use std::{net::IpAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use atlasgate_core::SpriteCache;
use atlasgate_proxy::{CacheProxy, DiskCache, HttpOrigin};
use atlasgate_server::{Gateway, GatewayConfig, GatewayServer, ServerConfig};
use clap::Args as ClapArgs;
use tracing::{info, instrument, warn};

use crate::config::Config;

#[derive(ClapArgs)]
pub struct Args {
    /// Resource root holding sprites and static assets
    #[arg(long, value_name = "DIR")]
    pub resources: Option<PathBuf>,

    /// Disk cache for proxied remote assets
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Port to bind (0 picks a free port)
    #[arg(long)]
    pub port: Option<u16>,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.resources {
            config.resources_dir.clone_from(dir);
        }
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = Some(dir.clone());
        }
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
    }
}

pub fn execute(args: &Args, mut config: Config) -> Result<()> {
    args.apply(&mut config);

    if !config.resources_dir.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!(
                "Resource directory does not exist: {}",
                config.resources_dir.display()
            ),
        )
        .into());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(run(config))
}

#[instrument(level = "info", name = "cmd::serve", skip_all, fields(resources = %config.resources_dir.display()))]
async fn run(config: Config) -> Result<()> {
    let key = config.key()?;
    let cache_dir = config.cache_dir()?;
    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("Failed to create cache directory: {}", cache_dir.display()))?;

    let sprites = SpriteCache::new(key.clone(), config.sprite_config());
    let proxy = CacheProxy::new(
        HttpOrigin::new(),
        DiskCache::new(&cache_dir),
        config.retry_policy(),
    );
    let gateway = Arc::new(Gateway::new(
        GatewayConfig {
            resources_dir: config.resources_dir.clone(),
        },
        key,
        sprites,
        proxy,
    ));

    let server = GatewayServer::start(
        Arc::clone(&gateway),
        ServerConfig {
            port: config.port,
            bind_address: config.bind,
        },
    )
    .await
    .context("Failed to start gateway server")?;

    println!("Serving {} at {}", config.resources_dir.display(), server.url());
    info!(url = %server.url(), cache = %cache_dir.display(), "Gateway ready");

    if let Some(entity) = &config.sprite.preload_entity {
        gateway.preload(entity, &config.sprite.preload_actions).await;
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C, shutting down");
    }
    info!("Shutting down");
    server.stop().await;
    Ok(())
}
