//! Test server harness for gateway integration tests.
//!
//! Provides a `TestServer` owning a temporary resource root, a temporary
//! proxy cache and a scripted origin, plus HTTP convenience methods.
#![allow(dead_code)]

use std::{
    io::Cursor,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use atlasgate_core::{
    AnimationMetadata, ContainerKey, DEFAULT_EXTENSION, DEFAULT_META_FILE, FrameDescriptor,
    SpriteCache, SpriteCacheConfig, seal_container,
};
use atlasgate_proxy::{
    CacheProxy, DiskCache, FetchError, Origin, OriginResponse, RetryPolicy,
};
use atlasgate_server::{Gateway, GatewayConfig, GatewayServer, ServerConfig};
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use reqwest::{Client, Method, Response};
use tempfile::TempDir;

/// Origin answering every URL with the same body, or a fixed status.
#[derive(Debug, Clone)]
pub struct StubOrigin {
    status: u16,
    body: Bytes,
    calls: Arc<AtomicU32>,
}

impl StubOrigin {
    pub fn ok(body: &'static [u8]) -> Self {
        Self {
            status: 200,
            body: Bytes::from_static(body),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Bytes::new(),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

impl Origin for StubOrigin {
    async fn fetch(&self, _url: &str) -> Result<OriginResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.status == 200 {
            Ok(OriginResponse::ok(self.body.clone(), None))
        } else {
            Ok(OriginResponse::status(self.status))
        }
    }
}

pub fn test_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 1,
        request_timeout: Duration::from_millis(500),
        total_timeout: Duration::from_secs(2),
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(10),
        jitter: Duration::ZERO,
    }
}

/// Running gateway server with its temporary directories.
pub struct TestServer {
    server: GatewayServer,
    client: Client,
    pub base_url: String,
    pub gateway: Arc<Gateway<StubOrigin>>,
    pub origin_calls: Arc<AtomicU32>,
    resources: TempDir,
    cache: TempDir,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::with_origin(StubOrigin::ok(b"remote asset")).await
    }

    pub async fn with_origin(origin: StubOrigin) -> Self {
        let resources = TempDir::new().expect("Failed to create resource dir");
        let cache = TempDir::new().expect("Failed to create cache dir");
        let origin_calls = origin.calls();

        let key = ContainerKey::builtin();
        let sprites = SpriteCache::new(key.clone(), SpriteCacheConfig::default());
        let proxy = CacheProxy::new(origin, DiskCache::new(cache.path()), test_policy());
        let gateway = Arc::new(Gateway::new(
            GatewayConfig {
                resources_dir: resources.path().to_path_buf(),
            },
            key,
            sprites,
            proxy,
        ));

        let server = GatewayServer::start(Arc::clone(&gateway), ServerConfig::default())
            .await
            .expect("Failed to start gateway server");
        let base_url = server.url();

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            server,
            client,
            base_url,
            gateway,
            origin_calls,
            resources,
            cache,
        }
    }

    pub fn resources(&self) -> &Path {
        self.resources.path()
    }

    pub fn cache_dir(&self) -> &Path {
        self.cache.path()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET failed")
    }

    pub async fn request(&self, method: Method, path: &str) -> Response {
        self.client
            .request(method, self.url(path))
            .send()
            .await
            .expect("request failed")
    }

    /// GET `pet://local/<entity>/actions/<action>?...` through the server.
    pub async fn get_frame(&self, entity: &str, action: &str, frame: &str) -> Response {
        self.get(&format!(
            "/pet/local/{entity}/actions/{action}?petId={entity}&action={action}&frame={frame}"
        ))
        .await
    }

    /// Write a sealed strip atlas of `count` 16x16 frames for `entity`/`action`.
    pub fn write_sprite(&self, entity: &str, action: &str, count: u32) -> PathBuf {
        let dir = self.resources().join(entity).join("actions").join(action);
        std::fs::create_dir_all(&dir).unwrap();

        let atlas = RgbaImage::from_fn(count * 16, 16, |x, _| {
            Rgba([((x / 16) * 30) as u8, 128, 0, 255])
        });
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(atlas)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        let sealed = seal_container(&png, &ContainerKey::builtin()).unwrap();
        std::fs::write(dir.join(format!("{action}{DEFAULT_EXTENSION}")), sealed).unwrap();

        let mut metadata = AnimationMetadata::new();
        for i in 0..count {
            metadata.insert_frame(
                action,
                format!("Frame_{i}.png"),
                FrameDescriptor::new(i * 16, 0, 16, 16),
            );
        }
        std::fs::write(dir.join(DEFAULT_META_FILE), metadata.to_json_pretty()).unwrap();
        dir
    }

    /// Write `data` sealed under the built-in key at `relative`.
    pub fn write_sealed(&self, relative: &str, data: &[u8]) -> PathBuf {
        let sealed = seal_container(data, &ContainerKey::builtin()).unwrap();
        self.write_plain(relative, &sealed)
    }

    pub fn write_plain(&self, relative: &str, data: &[u8]) -> PathBuf {
        let path = self.resources().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, data).unwrap();
        path
    }

    pub async fn stop(self) {
        self.server.stop().await;
    }
}

pub fn png_dimensions(png: &[u8]) -> (u32, u32) {
    let image = image::load_from_memory(png).unwrap();
    (image.width(), image.height())
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
