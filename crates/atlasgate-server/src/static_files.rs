//! Static resources under the resource root, decrypting containers on the fly.

use std::{
    io,
    path::{Component, Path, PathBuf},
};

use atlasgate_core::{ContainerKey, decrypt_container_file};
use bytes::Bytes;
use hyper::Response;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::{error::GatewayError, response};

/// Path fragment marking encrypted audio regardless of extension.
const AUDIO_MARKER: &str = "/audios/";

/// Join a percent-decoded URL path onto `root`, rejecting `..` components.
pub fn resolve_under(root: &Path, relative: &str) -> Result<PathBuf, GatewayError> {
    let mut resolved = root.to_path_buf();
    for segment in relative.split('/') {
        for component in Path::new(segment).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(GatewayError::PathEscapesRoot {
                        path: relative.to_string(),
                    });
                }
            }
        }
    }
    Ok(resolved)
}

/// Percent-decode a URL path.
pub fn decode_path(raw: &str) -> Result<String, GatewayError> {
    urlencoding::decode(raw)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| GatewayError::BadUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryListing {
    path: String,
    is_directory: bool,
    files: Vec<ListingEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListingEntry {
    name: String,
    is_directory: bool,
}

/// Serves files under one root.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
    container_extension: String,
    key: ContainerKey,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>, container_extension: &str, key: ContainerKey) -> Self {
        Self {
            root: root.into(),
            container_extension: container_extension.trim_start_matches('.').to_string(),
            key,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Serve `url_path` (still percent-encoded). Directories are listed
    /// when `allow_dir` is set and rejected otherwise.
    #[instrument(level = "info", skip(self))]
    pub async fn serve(
        &self,
        url_path: &str,
        allow_dir: bool,
    ) -> Result<Response<Bytes>, GatewayError> {
        let relative = decode_path(url_path)?;
        let full_path = resolve_under(&self.root, &relative)?;
        info!(path = %full_path.display(), "Static request");

        let metadata = tokio::fs::metadata(&full_path)
            .await
            .map_err(|e| io_error(&full_path, e))?;

        if metadata.is_dir() {
            if !allow_dir {
                return Err(GatewayError::NotAFile { path: full_path });
            }
            return self.list(&full_path).await;
        }

        if self.is_container(&full_path, &relative) {
            info!(path = %full_path.display(), "Decrypting container");
            let plaintext = decrypt_container_file(&full_path, &self.key)
                .await
                .map_err(|source| GatewayError::Decrypt {
                    path: full_path.clone(),
                    source,
                })?;
            let content_type = self.content_type(&full_path);
            return Ok(response::ok(&content_type, plaintext));
        }

        debug!(path = %full_path.display(), "Serving plain file");
        let data = tokio::fs::read(&full_path)
            .await
            .map_err(|e| io_error(&full_path, e))?;
        Ok(response::ok(&self.content_type(&full_path), data))
    }

    fn is_container(&self, path: &Path, relative: &str) -> bool {
        let by_extension = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.container_extension));
        by_extension || relative.contains(AUDIO_MARKER)
    }

    /// MIME type by extension. For `name.mp3.techybuddy` the inner
    /// extension decides.
    fn content_type(&self, path: &Path) -> String {
        let has_container_ext = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.container_extension));
        let name = if has_container_ext {
            path.file_stem()
        } else {
            path.file_name()
        };
        response::mime_for(&name.map(|n| n.to_string_lossy()).unwrap_or_default())
    }

    async fn list(&self, dir: &Path) -> Result<Response<Bytes>, GatewayError> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| io_error(dir, e))?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(dir, e))? {
            let is_directory = tokio::fs::metadata(entry.path())
                .await
                .is_ok_and(|m| m.is_dir());
            files.push(ListingEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_directory,
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(dir = %dir.display(), entries = files.len(), "Listed directory");

        Ok(response::json(&DirectoryListing {
            path: dir.display().to_string(),
            is_directory: true,
            files,
        }))
    }
}

fn io_error(path: &Path, source: io::Error) -> GatewayError {
    if source.kind() == io::ErrorKind::NotFound {
        GatewayError::NotFound {
            path: path.to_path_buf(),
        }
    } else {
        GatewayError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
