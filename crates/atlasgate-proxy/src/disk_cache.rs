//! On-disk mirror of origin URL paths.
//!
//! A cached response for `renderer://host/a/b.png` lives at `<root>/a/b.png`;
//! a path ending in `/` maps to `index.html` inside that directory.

use std::{
    io,
    path::{Component, Path, PathBuf},
};

use bytes::Bytes;
use tracing::{debug, instrument};

use crate::error::DiskCacheError;

const INDEX_FILE: &str = "index.html";

#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a decoded URL path to its file under the cache root.
    ///
    /// Rejects any name with a `..` component or a root/prefix component in
    /// the middle of the path.
    pub fn path_for(&self, file_name: &str) -> Result<PathBuf, DiskCacheError> {
        let invalid = || DiskCacheError::InvalidPath {
            name: file_name.to_string(),
        };

        let mut relative = PathBuf::new();
        for segment in file_name.split('/') {
            for component in Path::new(segment).components() {
                match component {
                    Component::Normal(part) => relative.push(part),
                    Component::CurDir => {}
                    Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                        return Err(invalid());
                    }
                }
            }
        }

        if file_name.ends_with('/') || relative.as_os_str().is_empty() {
            relative.push(INDEX_FILE);
        }
        Ok(self.root.join(relative))
    }

    pub async fn read(&self, path: &Path) -> io::Result<Bytes> {
        tokio::fs::read(path).await.map(Bytes::from)
    }

    /// Write `data` to `path`, creating parent directories.
    ///
    /// Data lands in a sibling temp file first and is renamed into place, so
    /// a reader never sees a partial file.
    #[instrument(level = "debug", skip(self, data), fields(path = %path.display(), size = data.len()))]
    pub async fn write(&self, path: &Path, data: &[u8]) -> Result<(), DiskCacheError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DiskCacheError::io(parent, e))?;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = path.with_file_name(format!(".{file_name}.{:016x}.part", rand::random::<u64>()));

        tokio::fs::write(&temp, data)
            .await
            .map_err(|e| DiskCacheError::io(&temp, e))?;
        if let Err(e) = tokio::fs::rename(&temp, path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(DiskCacheError::io(path, e));
        }
        Ok(())
    }

    pub async fn exists(&self, file_name: &str) -> Result<bool, DiskCacheError> {
        let path = self.path_for(file_name)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| DiskCacheError::io(path, e))
    }

    /// Delete one cached file. Returns false if it was not cached.
    pub async fn remove(&self, file_name: &str) -> Result<bool, DiskCacheError> {
        let path = self.path_for(file_name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed cache file");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(DiskCacheError::io(path, e)),
        }
    }

    /// Remove every cached file and recreate an empty root.
    #[instrument(level = "info", skip(self), fields(root = %self.root.display()))]
    pub async fn clear(&self) -> Result<(), DiskCacheError> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(DiskCacheError::io(&self.root, e)),
        }
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| DiskCacheError::io(&self.root, e))
    }
}
