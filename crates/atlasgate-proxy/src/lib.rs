//! Disk-backed caching proxy for remote assets.
//!
//! [`CacheProxy`] answers from the on-disk cache when it can, collapses
//! concurrent misses for one URL into a single origin fetch, and retries that
//! fetch with jittered exponential backoff inside a total time budget.

pub mod disk_cache;
pub mod error;
pub mod origin;
mod pending;
pub mod proxy;
pub mod retry;
pub mod stats;

pub use disk_cache::DiskCache;
pub use error::{DiskCacheError, FetchError, ProxyError};
pub use origin::{HttpOrigin, Origin, OriginResponse};
pub use proxy::{CacheProxy, ProxyResponse, ResponseSource, origin_url};
pub use retry::{RetryPolicy, fetch_with_retry};
pub use stats::{ProxyStats, ProxyStatsSnapshot};
