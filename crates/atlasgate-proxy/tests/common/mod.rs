//! Scripted origins for proxy tests.
#![allow(dead_code)]

use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use atlasgate_proxy::{FetchError, Origin, OriginResponse, RetryPolicy};
use bytes::Bytes;

#[derive(Debug, Clone)]
pub enum Behavior {
    Ok {
        body: Bytes,
        content_type: Option<&'static str>,
    },
    /// Like `Ok`, after sleeping.
    Slow { delay: Duration, body: Bytes },
    Status(u16),
    /// Never responds; only the attempt timeout ends it.
    Hang,
    /// Transport error on every call.
    Fail,
    /// Transport error for the first `n` calls, then `body`.
    FailTimes { n: u32, body: Bytes },
    /// Invalid URL on every call.
    Fatal,
}

#[derive(Debug, Clone)]
pub struct MockOrigin {
    behavior: Behavior,
    calls: Arc<AtomicU32>,
}

impl MockOrigin {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn ok(body: &'static [u8]) -> Self {
        Self::new(Behavior::Ok {
            body: Bytes::from_static(body),
            content_type: None,
        })
    }

    /// Shared call counter, usable after the origin moves into a proxy.
    pub fn calls(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

impl Origin for MockOrigin {
    async fn fetch(&self, url: &str) -> Result<OriginResponse, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let transport = || FetchError::Transport {
            url: url.to_string(),
            reason: "connection reset".to_string(),
        };
        match &self.behavior {
            Behavior::Ok { body, content_type } => {
                Ok(OriginResponse::ok(body.clone(), *content_type))
            }
            Behavior::Slow { delay, body } => {
                tokio::time::sleep(*delay).await;
                Ok(OriginResponse::ok(body.clone(), None))
            }
            Behavior::Status(status) => Ok(OriginResponse::status(*status)),
            Behavior::Hang => std::future::pending().await,
            Behavior::Fail => Err(transport()),
            Behavior::FailTimes { n, body } => {
                if call < *n {
                    Err(transport())
                } else {
                    Ok(OriginResponse::ok(body.clone(), None))
                }
            }
            Behavior::Fatal => Err(FetchError::InvalidUrl {
                url: url.to_string(),
                reason: "empty host".to_string(),
            }),
        }
    }
}

/// Retry policy with no jitter and short delays, for real-time tests.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        request_timeout: Duration::from_millis(500),
        total_timeout: Duration::from_secs(5),
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        jitter: Duration::ZERO,
    }
}

/// Poll until `path` exists or five seconds pass.
pub async fn wait_for_file(path: &Path) -> bool {
    for _ in 0..500 {
        if path.is_file() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
