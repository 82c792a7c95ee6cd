use std::{io, path::PathBuf};

use atlasgate_core::error::{ContainerError, SpriteError};
use atlasgate_proxy::ProxyError;
use hyper::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Malformed URL '{url}': {reason}")]
    BadUrl { url: String, reason: String },

    #[error("Unsupported scheme '{scheme}'")]
    UnsupportedScheme { scheme: String },

    /// The `frame` query parameter is missing or not a `.png` name.
    #[error("Bad frame parameter '{frame}'")]
    BadFrame { frame: String },

    #[error("Path '{path}' escapes the resource root")]
    PathEscapesRoot { path: String },

    #[error("Not a file: {}", path.display())]
    NotAFile { path: PathBuf },

    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to decrypt {}: {source}", path.display())]
    Decrypt {
        path: PathBuf,
        #[source]
        source: ContainerError,
    },

    #[error(transparent)]
    Sprite(#[from] SpriteError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadUrl { .. }
            | GatewayError::UnsupportedScheme { .. }
            | GatewayError::BadFrame { .. }
            | GatewayError::PathEscapesRoot { .. }
            | GatewayError::NotAFile { .. } => StatusCode::BAD_REQUEST,
            GatewayError::NotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::Io { .. } | GatewayError::Decrypt { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::Sprite(e) => status_from_u16(e.status_code()),
            GatewayError::Proxy(e) => status_from_u16(e.status_code()),
        }
    }

    /// Response body text. Client-visible messages stay short and fixed.
    pub fn body(&self) -> String {
        match self {
            GatewayError::BadFrame { .. } => "Bad path".to_string(),
            GatewayError::NotAFile { .. } => "Not a file".to_string(),
            GatewayError::NotFound { .. } => "Not found".to_string(),
            GatewayError::Decrypt { .. } => "Audio decryption error".to_string(),
            GatewayError::Io { .. } => "Read error".to_string(),
            GatewayError::Sprite(e) => match e.root() {
                SpriteError::NoFrames { .. } => "No frames in action".to_string(),
                SpriteError::FrameNotFound { .. } => "Frame not in meta".to_string(),
                SpriteError::AtlasNotFound { .. } => "Atlas file not found".to_string(),
                SpriteError::Metadata(m) if m.is_not_found() => "Metadata not found".to_string(),
                SpriteError::Metadata(_) => "Invalid metadata".to_string(),
                _ => "Sprite decode error".to_string(),
            },
            other => other.to_string(),
        }
    }
}

fn status_from_u16(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
