//! Network origins.

use std::future::Future;

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use tracing::trace;

use crate::error::FetchError;

/// A response from the origin. Bodies are only read for status 200.
#[derive(Debug, Clone)]
pub struct OriginResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl OriginResponse {
    pub fn ok(body: impl Into<Bytes>, content_type: Option<&str>) -> Self {
        Self {
            status: 200,
            content_type: content_type.map(str::to_owned),
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            body: Bytes::new(),
        }
    }
}

/// Performs one fetch attempt. Retries and timeouts are applied by the caller.
pub trait Origin: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<OriginResponse, FetchError>> + Send;
}

/// HTTP(S) origin backed by a shared `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct HttpOrigin {
    client: reqwest::Client,
}

impl HttpOrigin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Origin for HttpOrigin {
    async fn fetch(&self, url: &str) -> Result<OriginResponse, FetchError> {
        let parsed = url::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::UnsupportedProtocol {
                url: url.to_string(),
            });
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| classify(url, &e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        trace!(url, status, "Origin responded");

        if status != 200 {
            return Ok(OriginResponse {
                status,
                content_type,
                body: Bytes::new(),
            });
        }

        let body = response.bytes().await.map_err(|e| classify(url, &e))?;
        Ok(OriginResponse {
            status,
            content_type,
            body,
        })
    }
}

fn classify(url: &str, e: &reqwest::Error) -> FetchError {
    if e.is_builder() {
        FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}
