use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

/// Failure of a single origin attempt.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unsupported protocol in '{url}'")]
    UnsupportedProtocol { url: String },

    #[error("Request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("Request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
}

impl FetchError {
    /// Errors that no amount of retrying can fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FetchError::InvalidUrl { .. } | FetchError::UnsupportedProtocol { .. }
        )
    }
}

/// Failure of a whole proxied request. Cloned to every deduplicated waiter.
#[derive(Error, Debug, Clone)]
pub enum ProxyError {
    #[error("Malformed request URL '{url}': {reason}")]
    BadRequest { url: String, reason: String },

    #[error("Cache path '{name}' escapes the cache root")]
    InvalidPath { name: String },

    #[error("Fetch of {url} failed: {source}")]
    Fatal {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("All {attempts} attempts for {url} failed, last error: {last}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        #[source]
        last: FetchError,
    },

    #[error("Total timeout of {budget:?} exceeded for {url} after {attempts} attempts")]
    TotalTimeout {
        url: String,
        budget: Duration,
        attempts: u32,
    },

    /// The fetch task ended without reporting a result.
    #[error("Fetch of {url} was abandoned")]
    Abandoned { url: String },
}

impl ProxyError {
    /// HTTP status this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::BadRequest { .. } | ProxyError::InvalidPath { .. } => 400,
            _ => 502,
        }
    }
}

#[derive(Error, Debug)]
pub enum DiskCacheError {
    #[error("Cache path '{name}' escapes the cache root")]
    InvalidPath { name: String },

    #[error("Cache IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DiskCacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        DiskCacheError::Io {
            path: path.into(),
            source,
        }
    }
}
