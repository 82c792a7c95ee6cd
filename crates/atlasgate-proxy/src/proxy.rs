//! Cache-first proxy for remote assets.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bytes::Bytes;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::{
    disk_cache::DiskCache,
    error::{DiskCacheError, ProxyError},
    origin::{HttpOrigin, Origin},
    pending::{Attach, FetchResult, FlightGuard, PendingRequests},
    retry::{RetryPolicy, fetch_with_retry},
    stats::ProxyStats,
};

const OCTET_STREAM: &str = "application/octet-stream";
const ORIGIN_FAILED_BODY: &str = "Origin fetch failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Disk,
    Network,
}

#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl ProxyResponse {
    pub fn ok(body: Bytes, content_type: String) -> Self {
        Self {
            status: 200,
            content_type,
            body,
            source: ResponseSource::Network,
        }
    }

    fn origin_failure(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8".to_string(),
            body: Bytes::from_static(ORIGIN_FAILED_BODY.as_bytes()),
            source: ResponseSource::Network,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

struct ProxyInner<O> {
    origin: O,
    disk: DiskCache,
    policy: RetryPolicy,
    pending: PendingRequests,
    stats: ProxyStats,
}

/// Serves `<scheme>://host/path` from the disk cache, falling back to
/// `https://host/path` on the network. Cheap to clone.
pub struct CacheProxy<O = HttpOrigin> {
    inner: Arc<ProxyInner<O>>,
}

impl<O> Clone for CacheProxy<O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<O: Origin> CacheProxy<O> {
    pub fn new(origin: O, disk: DiskCache, policy: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(ProxyInner {
                origin,
                disk,
                policy,
                pending: PendingRequests::default(),
                stats: ProxyStats::new(),
            }),
        }
    }

    pub fn disk(&self) -> &DiskCache {
        &self.inner.disk
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.inner.policy
    }

    pub fn stats(&self) -> &ProxyStats {
        &self.inner.stats
    }

    /// Number of URLs with a fetch currently in flight.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Empty the disk cache. Fetches already in flight still complete and
    /// write their results.
    pub async fn clear(&self) -> Result<(), DiskCacheError> {
        self.inner.disk.clear().await
    }

    #[instrument(level = "info", skip(self))]
    pub async fn handle(&self, virtual_url: &str) -> Result<ProxyResponse, ProxyError> {
        let parsed = url::Url::parse(virtual_url).map_err(|e| ProxyError::BadRequest {
            url: virtual_url.to_string(),
            reason: e.to_string(),
        })?;
        let file_name = urlencoding::decode(parsed.path())
            .map_err(|e| ProxyError::BadRequest {
                url: virtual_url.to_string(),
                reason: e.to_string(),
            })?
            .into_owned();
        let cache_path = self
            .inner
            .disk
            .path_for(&file_name)
            .map_err(|_| ProxyError::InvalidPath {
                name: file_name.clone(),
            })?;

        if let Some(hit) = self.read_cached(&cache_path, &file_name).await {
            return Ok(hit);
        }

        let origin_url = origin_url(virtual_url);
        let mut receiver = match self.inner.pending.attach(virtual_url) {
            Attach::Waiter(receiver) => {
                self.inner.stats.record_dedup_join();
                debug!(url = virtual_url, "Joining pending request");
                receiver
            }
            Attach::Leader(receiver) => {
                self.spawn_fetch(virtual_url.to_string(), origin_url, cache_path);
                receiver
            }
        };

        match receiver.recv().await {
            Ok(result) => result,
            Err(broadcast::error::RecvError::Closed | broadcast::error::RecvError::Lagged(_)) => {
                Err(ProxyError::Abandoned {
                    url: virtual_url.to_string(),
                })
            }
        }
    }

    /// Cached bytes for a non-empty, readable cache file.
    async fn read_cached(&self, path: &Path, file_name: &str) -> Option<ProxyResponse> {
        let stats = &self.inner.stats;
        match self.inner.disk.read(path).await {
            Ok(body) if !body.is_empty() => {
                stats.record_disk_hit();
                debug!(file = file_name, size = body.len(), "Disk cache hit");
                Some(ProxyResponse {
                    status: 200,
                    content_type: guess_content_type(path),
                    body,
                    source: ResponseSource::Disk,
                })
            }
            Ok(_) => {
                stats.record_corrupt_read();
                warn!(file = file_name, "Cache file is empty, falling back to network");
                None
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                stats.record_disk_miss();
                debug!(file = file_name, "Disk cache miss");
                None
            }
            Err(e) => {
                stats.record_corrupt_read();
                warn!(file = file_name, error = %e, "Cache file unreadable, falling back to network");
                None
            }
        }
    }

    /// The fetch runs detached so the pending entry settles even if every
    /// caller is cancelled.
    fn spawn_fetch(&self, key: String, origin_url: String, cache_path: PathBuf) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let guard = FlightGuard::new(&inner.pending, key);
            let result = fetch_and_store(&inner, &origin_url, cache_path).await;
            guard.complete(result);
        });
    }
}

impl CacheProxy<HttpOrigin> {
    /// Proxy over HTTPS with the default retry policy.
    pub fn http(disk: DiskCache) -> Self {
        Self::new(HttpOrigin::new(), disk, RetryPolicy::default())
    }
}

async fn fetch_and_store<O: Origin>(
    inner: &Arc<ProxyInner<O>>,
    origin_url: &str,
    cache_path: PathBuf,
) -> FetchResult {
    info!(url = origin_url, "Fetching from origin");
    inner.stats.record_network_fetch();
    let response = fetch_with_retry(&inner.origin, origin_url, &inner.policy, &inner.stats).await?;

    if response.status != 200 {
        warn!(url = origin_url, status = response.status, "Origin returned non-200 status");
        return Ok(ProxyResponse::origin_failure(response.status));
    }
    info!(url = origin_url, size = response.body.len(), "Origin fetched");

    let content_type = response
        .content_type
        .unwrap_or_else(|| guess_content_type(&cache_path));

    let writer = Arc::clone(inner);
    let body = response.body.clone();
    tokio::spawn(async move {
        match writer.disk.write(&cache_path, &body).await {
            Ok(()) => {
                writer.stats.record_cache_write();
                info!(path = %cache_path.display(), "Cache write");
            }
            Err(e) => {
                writer.stats.record_cache_write_failure();
                warn!(path = %cache_path.display(), error = %e, "Cache write failed");
            }
        }
    });

    Ok(ProxyResponse::ok(response.body, content_type))
}

/// `renderer://host/path?q` becomes `https://host/path?q`.
pub fn origin_url(virtual_url: &str) -> String {
    match virtual_url.split_once("://") {
        Some((_, rest)) => format!("https://{rest}"),
        None => format!("https://{virtual_url}"),
    }
}

fn guess_content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(OCTET_STREAM)
        .to_string()
}
