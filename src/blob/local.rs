use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use super::{is_compressed, logical_path, with_suffix, BlobStore, BlobStoreError, ReadBlob};

const CHUNK_SIZE: usize = 64 * 1024;
const MAX_NAME_ATTEMPTS: u32 = 10_000;
const TRASH_DIR: &str = crate::paths::RECYCLE_BIN_DIR;

/// Local filesystem blob store. Artifacts are zstd-compressed on write.
pub struct LocalBlobStore {
    root: PathBuf,
    level: i32,
}

impl LocalBlobStore {
    pub fn new<P: AsRef<Path>>(root: P, level: i32) -> Result<Self, std::io::Error> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root, level })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory receiving artifacts deleted with the recycle-bin flag.
    pub fn trash_dir(&self) -> PathBuf {
        self.root.join(TRASH_DIR)
    }

    async fn move_to_trash(&self, physical: &Path) -> Result<(), BlobStoreError> {
        let trash = self.trash_dir();
        tokio::fs::create_dir_all(&trash).await?;

        let name = physical
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let target = trash.join(format!("{}-{name}", uuid::Uuid::new_v4()));

        if tokio::fs::rename(physical, &target).await.is_err() {
            // Different filesystem: copy then unlink.
            tokio::fs::copy(physical, &target).await?;
            tokio::fs::remove_file(physical).await?;
        }
        tracing::debug!(from = %physical.display(), to = %target.display(), "Moved blob to recycle bin");
        Ok(())
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn store(
        &self,
        source: &Path,
        destination: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, BlobStoreError> {
        if !tokio::fs::try_exists(source).await? {
            return Err(BlobStoreError::NotFound(source.display().to_string()));
        }
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let source = source.to_path_buf();
        let destination = destination.to_path_buf();
        let level = self.level;
        let cancel = cancel.clone();

        let written = tokio::task::spawn_blocking(move || {
            compress_to_free_name(&source, &destination, level, &cancel)
        })
        .await
        .map_err(|e| BlobStoreError::Backend(e.to_string()))??;

        tracing::debug!(path = %written.display(), "Stored compressed blob");
        Ok(written)
    }

    async fn read(
        &self,
        physical: &Path,
        compressed_hint: bool,
        cancel: &CancellationToken,
    ) -> Result<ReadBlob, BlobStoreError> {
        if !tokio::fs::try_exists(physical).await? {
            return Err(BlobStoreError::NotFound(physical.display().to_string()));
        }

        let compressed = is_compressed(physical);
        if compressed != compressed_hint {
            tracing::debug!(
                path = %physical.display(),
                compressed_hint,
                "Compression hint disagrees with artifact suffix, using suffix"
            );
        }

        let content = if compressed {
            let path = physical.to_path_buf();
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || decompress(&path, &cancel))
                .await
                .map_err(|e| BlobStoreError::Backend(e.to_string()))??
        } else {
            tokio::fs::read(physical).await?
        };

        let file_name = logical_path(physical)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Ok(ReadBlob {
            content: Bytes::from(content),
            file_name,
            decompressed: compressed,
        })
    }

    async fn delete(
        &self,
        physical: &Path,
        send_to_recycle_bin: bool,
    ) -> Result<bool, BlobStoreError> {
        if !tokio::fs::try_exists(physical).await? {
            return Ok(false);
        }

        if send_to_recycle_bin {
            self.move_to_trash(physical).await?;
            return Ok(true);
        }

        match tokio::fs::remove_file(physical).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn relocate(&self, from: &Path, to: &Path) -> Result<(), BlobStoreError> {
        if !tokio::fs::try_exists(from).await? {
            return Err(BlobStoreError::NotFound(from.display().to_string()));
        }
        if tokio::fs::try_exists(to).await? {
            return Err(BlobStoreError::AlreadyExists(to.display().to_string()));
        }
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(from, to).await?;
        Ok(())
    }

    async fn exists(&self, physical: &Path) -> Result<bool, BlobStoreError> {
        Ok(tokio::fs::try_exists(physical).await?)
    }
}

/// `report.pdf` -> `report_2.pdf` for counter 2; counter 0 keeps the name.
fn numbered(path: &Path, counter: u32) -> PathBuf {
    if counter == 0 {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_{counter}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{counter}"),
    };
    path.with_file_name(name)
}

/// Create the first free artifact for `logical` with create-exclusive
/// semantics. A name is taken if either the compressed artifact or a plain
/// (historical) file already exists.
fn create_exclusive(logical: &Path) -> Result<(File, PathBuf), BlobStoreError> {
    for counter in 0..MAX_NAME_ATTEMPTS {
        let candidate = numbered(logical, counter);
        if candidate.exists() {
            continue;
        }
        let physical = with_suffix(&candidate);
        match OpenOptions::new().write(true).create_new(true).open(&physical) {
            Ok(file) => return Ok((file, physical)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(BlobStoreError::AlreadyExists(logical.display().to_string()))
}

fn compress_to_free_name(
    source: &Path,
    logical: &Path,
    level: i32,
    cancel: &CancellationToken,
) -> Result<PathBuf, BlobStoreError> {
    let (mut output, physical) = create_exclusive(logical)?;

    match compress_into(source, &mut output, level, cancel) {
        Ok(()) => Ok(physical),
        Err(e) => {
            drop(output);
            if let Err(remove_err) = std::fs::remove_file(&physical) {
                tracing::warn!(
                    path = %physical.display(),
                    error = %remove_err,
                    "Failed to remove partial blob"
                );
            }
            Err(e)
        }
    }
}

fn compress_into(
    source: &Path,
    output: &mut File,
    level: i32,
    cancel: &CancellationToken,
) -> Result<(), BlobStoreError> {
    let mut input = File::open(source)?;
    let mut encoder = zstd::stream::write::Encoder::new(&mut *output, level)
        .map_err(|e| BlobStoreError::Compression(e.to_string()))?;
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        if cancel.is_cancelled() {
            return Err(BlobStoreError::Cancelled);
        }
        let n = input.read(&mut buf)?;
        if n == 0 {
            break;
        }
        encoder.write_all(&buf[..n])?;
    }

    encoder
        .finish()
        .map_err(|e| BlobStoreError::Compression(e.to_string()))?;
    output.sync_all()?;
    Ok(())
}

fn decompress(path: &Path, cancel: &CancellationToken) -> Result<Vec<u8>, BlobStoreError> {
    let input = File::open(path)?;
    let mut decoder = zstd::stream::read::Decoder::new(input)
        .map_err(|e| BlobStoreError::Compression(e.to_string()))?;
    let mut content = Vec::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        if cancel.is_cancelled() {
            return Err(BlobStoreError::Cancelled);
        }
        let n = decoder
            .read(&mut buf)
            .map_err(|e| BlobStoreError::Compression(e.to_string()))?;
        if n == 0 {
            break;
        }
        content.extend_from_slice(&buf[..n]);
    }
    Ok(content)
}
