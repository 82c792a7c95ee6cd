//! Configuration file support.
//!
//! Loaded from `--config`, `$ATLASGATE_CONFIG`, or the platform config dir
//! (`~/.config/atlasgate/config.toml` on Linux). Every field is optional.

use std::{
    net::{IpAddr, Ipv4Addr},
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use atlasgate_core::{ContainerKey, DEFAULT_EXTENSION, DEFAULT_META_FILE, SpriteCacheConfig};
use atlasgate_proxy::RetryPolicy;
use atlasgate_server::DEFAULT_PRELOAD_ACTIONS;
use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub resources_dir: PathBuf,
    /// `None` means the platform cache dir.
    pub cache_dir: Option<PathBuf>,
    pub bind: IpAddr,
    pub port: u16,
    pub container: ContainerSection,
    pub sprite: SpriteSection,
    pub retry: RetrySection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resources_dir: PathBuf::from("resources"),
            cache_dir: None,
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            container: ContainerSection::default(),
            sprite: SpriteSection::default(),
            retry: RetrySection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContainerSection {
    pub extension: String,
    /// Hex-encoded 32-byte key replacing the built-in one.
    pub key_hex: Option<String>,
}

impl Default for ContainerSection {
    fn default() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.to_string(),
            key_hex: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpriteSection {
    pub meta_file: String,
    pub frame_capacity: u64,
    pub atlas_capacity: u64,
    pub preload_entity: Option<String>,
    pub preload_actions: Vec<String>,
}

impl Default for SpriteSection {
    fn default() -> Self {
        let defaults = SpriteCacheConfig::default();
        Self {
            meta_file: DEFAULT_META_FILE.to_string(),
            frame_capacity: defaults.frame_capacity,
            atlas_capacity: defaults.atlas_capacity,
            preload_entity: None,
            preload_actions: DEFAULT_PRELOAD_ACTIONS
                .iter()
                .map(|a| (*a).to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub total_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub jitter: Duration,
}

impl Default for RetrySection {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            request_timeout: policy.request_timeout,
            total_timeout: policy.total_timeout,
            base_delay: policy.base_delay,
            max_delay: policy.max_delay,
            jitter: policy.jitter,
        }
    }
}

impl From<&RetrySection> for RetryPolicy {
    fn from(section: &RetrySection) -> Self {
        RetryPolicy {
            max_retries: section.max_retries,
            request_timeout: section.request_timeout,
            total_timeout: section.total_timeout,
            base_delay: section.base_delay,
            max_delay: section.max_delay,
            jitter: section.jitter,
        }
    }
}

impl Config {
    /// Load `explicit` if given (it must exist), else the default file if
    /// present, else built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match default_config_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(contents)?;
        config.resources_dir = expand_home(&config.resources_dir);
        config.cache_dir = config.cache_dir.as_deref().map(expand_home);
        Ok(config)
    }

    pub fn key(&self) -> Result<ContainerKey> {
        match &self.container.key_hex {
            Some(hex_key) => ContainerKey::from_hex(hex_key).context("Invalid container.key_hex"),
            None => Ok(ContainerKey::builtin()),
        }
    }

    pub fn sprite_config(&self) -> SpriteCacheConfig {
        SpriteCacheConfig {
            extension: self.container.extension.clone(),
            meta_file: self.sprite.meta_file.clone(),
            frame_capacity: self.sprite.frame_capacity,
            atlas_capacity: self.sprite.atlas_capacity,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        project_dirs()
            .map(|dirs| dirs.cache_dir().to_path_buf())
            .context("Could not determine a cache directory; set cache_dir or --cache-dir")
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "atlasgate")
}

pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// Expand a leading `~/` to the home directory.
fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(rest),
        None => path.to_path_buf(),
    }
}
