//! Virtual-protocol dispatch.
//!
//! | scheme     | handler                                   |
//! |------------|-------------------------------------------|
//! | `pet`      | sprite frames through [`SpriteCache`]      |
//! | `audio`    | static files, directories rejected        |
//! | `zj-file`  | static files, directories listed as JSON  |
//! | `renderer` | remote assets through [`CacheProxy`]      |

use std::path::{Path, PathBuf};

use atlasgate_core::{ContainerKey, FrameRequest, SpriteCache, SpriteStatsSnapshot};
use atlasgate_proxy::{CacheProxy, HttpOrigin, Origin, ProxyStatsSnapshot};
use bytes::Bytes;
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::{
    error::GatewayError,
    response,
    static_files::{StaticFiles, decode_path, resolve_under},
};

/// High-frequency actions warmed at startup.
pub const DEFAULT_PRELOAD_ACTIONS: &[&str] = &[
    "power-on",
    "standby",
    "dragging-start",
    "dragging-end",
    "dragging",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Pet,
    Audio,
    ZjFile,
    Renderer,
}

impl Scheme {
    pub fn parse(scheme: &str) -> Option<Self> {
        match scheme {
            "pet" => Some(Scheme::Pet),
            "audio" => Some(Scheme::Audio),
            "zj-file" => Some(Scheme::ZjFile),
            "renderer" => Some(Scheme::Renderer),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Pet => "pet",
            Scheme::Audio => "audio",
            Scheme::ZjFile => "zj-file",
            Scheme::Renderer => "renderer",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Root for sprite actions and static assets.
    pub resources_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct GatewayStats {
    pub sprite: SpriteStatsSnapshot,
    pub proxy: ProxyStatsSnapshot,
}

pub struct Gateway<O = HttpOrigin> {
    config: GatewayConfig,
    sprites: SpriteCache,
    statics: StaticFiles,
    proxy: CacheProxy<O>,
}

impl<O: Origin> Gateway<O> {
    pub fn new(
        config: GatewayConfig,
        key: ContainerKey,
        sprites: SpriteCache,
        proxy: CacheProxy<O>,
    ) -> Self {
        let statics = StaticFiles::new(
            config.resources_dir.clone(),
            &sprites.config().extension,
            key,
        );
        Self {
            config,
            sprites,
            statics,
            proxy,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn sprites(&self) -> &SpriteCache {
        &self.sprites
    }

    pub fn proxy(&self) -> &CacheProxy<O> {
        &self.proxy
    }

    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            sprite: self.sprites.stats().snapshot(),
            proxy: self.proxy.stats().snapshot(),
        }
    }

    /// Answer one virtual-protocol request. Never fails: errors become
    /// error responses.
    #[instrument(level = "info", skip(self))]
    pub async fn handle(&self, virtual_url: &str) -> Response<Bytes> {
        match self.dispatch(virtual_url).await {
            Ok(response) => response,
            Err(e) => response::error(&e),
        }
    }

    async fn dispatch(&self, virtual_url: &str) -> Result<Response<Bytes>, GatewayError> {
        let url = Url::parse(virtual_url).map_err(|e| GatewayError::BadUrl {
            url: virtual_url.to_string(),
            reason: e.to_string(),
        })?;
        let scheme = Scheme::parse(url.scheme()).ok_or_else(|| GatewayError::UnsupportedScheme {
            scheme: url.scheme().to_string(),
        })?;
        debug!(scheme = scheme.as_str(), path = url.path(), "Dispatching");

        match scheme {
            Scheme::Pet => self.serve_sprite(&url).await,
            Scheme::Audio => self.statics.serve(url.path(), false).await,
            Scheme::ZjFile => self.statics.serve(url.path(), true).await,
            Scheme::Renderer => self.serve_proxied(virtual_url).await,
        }
    }

    async fn serve_sprite(&self, url: &Url) -> Result<Response<Bytes>, GatewayError> {
        let mut entity_id = String::new();
        let mut action = String::new();
        let mut frame = String::new();
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "petId" => entity_id = value.into_owned(),
                "action" => action = value.into_owned(),
                "frame" => frame = value.into_owned(),
                _ => {}
            }
        }
        if !frame.ends_with(".png") {
            return Err(GatewayError::BadFrame { frame });
        }

        let actions_dir = resolve_under(&self.config.resources_dir, &decode_path(url.path())?)?;
        let request = FrameRequest::new(entity_id, action, frame);
        let png = self.sprites.serve_frame(&request, &actions_dir).await?;
        Ok(response::ok("image/png", png))
    }

    async fn serve_proxied(&self, virtual_url: &str) -> Result<Response<Bytes>, GatewayError> {
        let proxied = self.proxy.handle(virtual_url).await?;
        let status = StatusCode::from_u16(proxied.status).unwrap_or(StatusCode::BAD_GATEWAY);
        Ok(response::bytes(status, &proxied.content_type, proxied.body))
    }

    /// Directory holding an entity's action, as addressed by
    /// `pet://local/<entity>/actions/<action>`.
    pub fn actions_dir(&self, entity_id: &str, action: &str) -> PathBuf {
        self.config
            .resources_dir
            .join(entity_id)
            .join("actions")
            .join(action)
    }

    /// Decode the atlases of `actions` for `entity_id` ahead of use.
    /// Failures are logged and skipped.
    pub async fn preload<S: AsRef<str>>(&self, entity_id: &str, actions: &[S]) -> usize {
        let mut warmed = 0;
        for action in actions {
            let action = action.as_ref();
            let dir = self.actions_dir(entity_id, action);
            match self.sprites.warm(entity_id, action, &dir).await {
                Ok(()) => warmed += 1,
                Err(e) => warn!(entity = entity_id, action, error = %e, "Preload skipped"),
            }
        }
        info!(entity = entity_id, warmed, requested = actions.len(), "Preload finished");
        warmed
    }

    pub fn resources_dir(&self) -> &Path {
        &self.config.resources_dir
    }
}
