//! Encrypted asset containers.
//!
//! A container wraps one plaintext asset (usually a PNG sprite atlas, sometimes
//! audio) in AES-256-GCM:
//!
//! ```text
//! MAGIC (9 bytes, "ZJATLASv2") | IV (12 bytes) | TAG (16 bytes) | CIPHERTEXT
//! ```
//!
//! The key is fixed at build time, so this is obfuscation against casual
//! tampering rather than a confidentiality boundary. Decryption is all or
//! nothing: a bad tag never yields partial plaintext.

use std::{fmt, io, path::Path, path::PathBuf};

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};
use zeroize::Zeroizing;

/// Magic prefix identifying a container.
pub const MAGIC: &[u8; 9] = b"ZJATLASv2";
/// AES-GCM nonce length.
pub const IV_SIZE: usize = 12;
/// AES-GCM authentication tag length.
pub const TAG_SIZE: usize = 16;
/// AES-256 key length.
pub const KEY_SIZE: usize = 32;
/// Bytes preceding the ciphertext.
pub const HEADER_SIZE: usize = MAGIC.len() + IV_SIZE + TAG_SIZE;
/// File extension used for containers on disk, including the dot.
pub const DEFAULT_EXTENSION: &str = ".techybuddy";

const KEY_PARTS: [&str; 4] = ["7x9Lp2qR", "mK4nV8sT", "aB3cD5eF", "gH6jJ7kL"];

/// Symmetric key used to open and seal containers.
///
/// The `Debug` implementation redacts the key material, and the bytes are
/// zeroized when the key is dropped.
#[derive(Clone)]
pub struct ContainerKey(Zeroizing<[u8; KEY_SIZE]>);

impl ContainerKey {
    /// The key baked into every shipped build.
    pub fn builtin() -> Self {
        let joined = KEY_PARTS.concat();
        let mut key = [b'X'; KEY_SIZE];
        let len = joined.len().min(KEY_SIZE);
        key[..len].copy_from_slice(&joined.as_bytes()[..len]);
        Self(Zeroizing::new(key))
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(hex_key: &str) -> Result<Self, ContainerError> {
        let decoded = Zeroizing::new(hex::decode(hex_key.trim()).map_err(|e| {
            ContainerError::InvalidKey {
                reason: e.to_string(),
            }
        })?);
        let bytes: [u8; KEY_SIZE] =
            decoded
                .as_slice()
                .try_into()
                .map_err(|_| ContainerError::InvalidKey {
                    reason: format!("expected {KEY_SIZE} bytes, got {}", decoded.len()),
                })?;
        Ok(Self::from_bytes(bytes))
    }

    fn cipher(&self) -> Aes256Gcm {
        let key: &Key<Aes256Gcm> = self.0.as_slice().into();
        Aes256Gcm::new(key)
    }
}

impl Default for ContainerKey {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for ContainerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContainerKey").field(&"[REDACTED]").finish()
    }
}

/// Where a container came from, for error messages.
#[derive(Debug, Clone, Default)]
pub struct ContainerContext {
    pub path: Option<PathBuf>,
}

impl ContainerContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for ContainerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.path {
            Some(ref path) => write!(f, "container at {:?}", path.display()),
            None => write!(f, "in-memory container"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ContainerError {
    /// Magic prefix mismatch or truncated header.
    #[error("Invalid container format for {context}: {reason}")]
    Format {
        reason: String,
        context: ContainerContext,
    },

    /// **[INTEGRITY VIOLATION]** The tag did not verify: tampered data or wrong key.
    #[error(
        "Failed to decrypt {context}: invalid authentication tag - possible tampering or wrong key"
    )]
    Authentication { context: ContainerContext },

    #[error("Failed to seal container: {reason}")]
    Seal { reason: String },

    #[error("Invalid container key: {reason}")]
    InvalidKey { reason: String },

    #[error("IO error reading {context}: {source}")]
    Io {
        #[source]
        source: io::Error,
        context: ContainerContext,
    },
}

impl ContainerError {
    #[must_use]
    pub fn io_with_context(source: io::Error, context: ContainerContext) -> Self {
        ContainerError::Io { source, context }
    }

    /// True when the container file itself does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContainerError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }

    /// True for magic/layout and tag failures, the two ways a present file can be bad.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            ContainerError::Format { .. } | ContainerError::Authentication { .. }
        )
    }

    #[must_use]
    pub fn with_context(self, context: ContainerContext) -> Self {
        match self {
            ContainerError::Format { reason, .. } => ContainerError::Format { reason, context },
            ContainerError::Authentication { .. } => ContainerError::Authentication { context },
            ContainerError::Io { source, .. } => ContainerError::Io { source, context },
            other => other,
        }
    }
}

/// Returns true if `data` starts with the container magic.
pub fn has_magic(data: &[u8]) -> bool {
    data.starts_with(MAGIC)
}

/// Decrypt an in-memory container.
pub fn decrypt_container(data: &[u8], key: &ContainerKey) -> Result<Vec<u8>, ContainerError> {
    decrypt_container_with_context(data, key, &ContainerContext::new())
}

#[instrument(level = "debug", skip(data, key), fields(size = data.len()))]
pub fn decrypt_container_with_context(
    data: &[u8],
    key: &ContainerKey,
    context: &ContainerContext,
) -> Result<Vec<u8>, ContainerError> {
    if !has_magic(data) {
        warn!("Container magic mismatch");
        return Err(ContainerError::Format {
            reason: "magic prefix does not match".to_string(),
            context: context.clone(),
        });
    }
    if data.len() < HEADER_SIZE {
        warn!(actual_size = data.len(), "Container header truncated");
        return Err(ContainerError::Format {
            reason: format!(
                "expected at least {HEADER_SIZE} bytes, got {}",
                data.len()
            ),
            context: context.clone(),
        });
    }

    let iv = &data[MAGIC.len()..MAGIC.len() + IV_SIZE];
    let tag = &data[MAGIC.len() + IV_SIZE..HEADER_SIZE];
    let ciphertext = &data[HEADER_SIZE..];

    // aes-gcm expects ciphertext || tag
    let mut ciphertext_with_tag = Vec::with_capacity(ciphertext.len() + TAG_SIZE);
    ciphertext_with_tag.extend_from_slice(ciphertext);
    ciphertext_with_tag.extend_from_slice(tag);

    let plaintext = key
        .cipher()
        .decrypt(Nonce::from_slice(iv), ciphertext_with_tag.as_slice())
        .map_err(|_| {
            warn!("Container decryption failed - authentication tag mismatch");
            ContainerError::Authentication {
                context: context.clone(),
            }
        })?;

    trace!(plaintext_size = plaintext.len(), "Container decrypted");
    Ok(plaintext)
}

/// Read and decrypt a container file.
#[instrument(level = "info", skip(key), fields(path = %path.as_ref().display()))]
pub async fn decrypt_container_file(
    path: impl AsRef<Path>,
    key: &ContainerKey,
) -> Result<Vec<u8>, ContainerError> {
    let path = path.as_ref();
    let context = ContainerContext::new().with_path(path);

    debug!("Reading container");
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| ContainerError::io_with_context(e, context.clone()))?;
    trace!(encrypted_size = data.len(), "Read container");

    // Decrypts inline; only image work goes to the blocking pool.
    decrypt_container_with_context(&data, key, &context)
}

/// Wrap `plaintext` in a new container with a random IV.
pub fn seal_container(plaintext: &[u8], key: &ContainerKey) -> Result<Vec<u8>, ContainerError> {
    let mut iv = [0u8; IV_SIZE];
    rand::rng().fill_bytes(&mut iv);
    seal_container_with_iv(plaintext, key, iv)
}

fn seal_container_with_iv(
    plaintext: &[u8],
    key: &ContainerKey,
    iv: [u8; IV_SIZE],
) -> Result<Vec<u8>, ContainerError> {
    let sealed = key
        .cipher()
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|e| ContainerError::Seal {
            reason: e.to_string(),
        })?;
    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_SIZE);

    let mut out = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&iv);
    out.extend_from_slice(tag);
    out.extend_from_slice(ciphertext);
    Ok(out)
}

/// Seal the file at `src` into a container written to `dst`.
#[instrument(level = "info", skip(key), fields(src = %src.as_ref().display(), dst = %dst.as_ref().display()))]
pub async fn seal_container_file(
    src: impl AsRef<Path>,
    dst: impl AsRef<Path>,
    key: &ContainerKey,
) -> Result<u64, ContainerError> {
    let src = src.as_ref();
    let dst = dst.as_ref();
    let plaintext = tokio::fs::read(src)
        .await
        .map_err(|e| ContainerError::io_with_context(e, ContainerContext::new().with_path(src)))?;
    let sealed = seal_container(&plaintext, key)?;
    if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ContainerError::io_with_context(e, ContainerContext::new().with_path(dst)))?;
    }
    tokio::fs::write(dst, &sealed)
        .await
        .map_err(|e| ContainerError::io_with_context(e, ContainerContext::new().with_path(dst)))?;
    Ok(sealed.len() as u64)
}
