mod local;

pub use local::LocalBlobStore;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Suffix carried by every compressed artifact on disk.
pub const COMPRESSION_SUFFIX: &str = ".zst";

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Blob not found: {0}")]
    NotFound(String),
    #[error("Blob already exists: {0}")]
    AlreadyExists(String),
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Blob operation cancelled")]
    Cancelled,
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Content returned by [`BlobStore::read`].
#[derive(Debug, Clone)]
pub struct ReadBlob {
    /// Original (decompressed) bytes.
    pub content: Bytes,
    /// File name with the compression suffix stripped.
    pub file_name: String,
    pub decompressed: bool,
}

/// Physical byte storage. Paths passed in are physical filesystem paths;
/// callers resolve logical paths first.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Compress `source` into `destination + COMPRESSION_SUFFIX`, picking a
    /// numbered name when that artifact already exists. Returns the physical
    /// path actually written. Never overwrites.
    async fn store(
        &self,
        source: &Path,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, BlobStoreError>;

    /// Read an artifact, decompressing when the path carries the compression
    /// suffix. The suffix wins over `compressed_hint`.
    async fn read(
        &self,
        physical: &Path,
        compressed_hint: bool,
        cancel: &CancellationToken,
    ) -> Result<ReadBlob, BlobStoreError>;

    /// Remove an artifact. Returns `false` when nothing was there.
    async fn delete(&self, physical: &Path, send_to_recycle_bin: bool)
        -> Result<bool, BlobStoreError>;

    /// Move an artifact to a new physical path. Fails if the target exists.
    async fn relocate(&self, from: &Path, to: &Path) -> Result<(), BlobStoreError>;

    async fn exists(&self, physical: &Path) -> Result<bool, BlobStoreError>;
}

/// True when the path ends with the compression suffix.
pub fn is_compressed(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.len() > COMPRESSION_SUFFIX.len() && n.ends_with(COMPRESSION_SUFFIX))
}

/// Append the compression suffix unless already present.
pub fn with_suffix(path: &Path) -> PathBuf {
    if is_compressed(path) {
        return path.to_path_buf();
    }
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(COMPRESSION_SUFFIX);
    PathBuf::from(raw)
}

/// Logical path of an artifact: the physical path without the suffix.
pub fn logical_path(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) if is_compressed(path) => PathBuf::from(&s[..s.len() - COMPRESSION_SUFFIX.len()]),
        _ => path.to_path_buf(),
    }
}
