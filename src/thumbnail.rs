//! Disk-cached thumbnails keyed by content hash and requested bounds.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::imageops::FilterType;
use image::{GenericImageView, ImageFormat};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::blob::{BlobStore, BlobStoreError};
use crate::hasher::{self, HashError};

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("Hash error: {0}")]
    Hash(#[from] HashError),
    #[error("Blob store error: {0}")]
    Blob(#[from] BlobStoreError),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Thumbnail task failed: {0}")]
    Task(String),
    #[error("Invalid thumbnail bounds {0}x{1}")]
    InvalidBounds(u32, u32),
}

/// Turns original image bytes into encoded thumbnail bytes.
pub trait ThumbnailGenerator: Send + Sync {
    fn generate(&self, bytes: &[u8], max_width: u32, max_height: u32) -> Result<Vec<u8>, ThumbnailError>;
}

/// PNG thumbnails via the `image` crate. Images already inside the bounds
/// are re-encoded at their original size.
#[derive(Debug, Default, Clone)]
pub struct ImageThumbnailer;

impl ThumbnailGenerator for ImageThumbnailer {
    fn generate(&self, bytes: &[u8], max_width: u32, max_height: u32) -> Result<Vec<u8>, ThumbnailError> {
        let decoded = image::load_from_memory(bytes)?;
        let (width, height) = decoded.dimensions();

        let resized = if width <= max_width && height <= max_height {
            decoded
        } else {
            decoded.resize(max_width, max_height, FilterType::Triangle)
        };

        let mut out = Vec::new();
        resized.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
        Ok(out)
    }
}

pub struct ThumbnailCache {
    cache_dir: PathBuf,
    blobs: Arc<dyn BlobStore>,
    generator: Arc<dyn ThumbnailGenerator>,
}

impl ThumbnailCache {
    pub fn new<P: AsRef<Path>>(
        cache_dir: P,
        blobs: Arc<dyn BlobStore>,
        generator: Arc<dyn ThumbnailGenerator>,
    ) -> Result<Self, std::io::Error> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            cache_dir,
            blobs,
            generator,
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Thumbnail for the artifact at `physical`, generated on first request.
    /// The key is the hash of the artifact's bytes plus the bounds, so a
    /// replaced artifact never serves a stale thumbnail.
    pub async fn get_or_create(
        &self,
        physical: &Path,
        max_width: u32,
        max_height: u32,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, ThumbnailError> {
        if max_width == 0 || max_height == 0 {
            return Err(ThumbnailError::InvalidBounds(max_width, max_height));
        }

        let hash = hasher::hash_file(physical, cancel).await?;
        let target = self
            .cache_dir
            .join(format!("{hash}_{max_width}x{max_height}.png"));

        if tokio::fs::try_exists(&target).await? {
            tracing::debug!(path = %target.display(), "Thumbnail cache hit");
            return Ok(target);
        }

        let blob = self.blobs.read(physical, false, cancel).await?;
        let generator = Arc::clone(&self.generator);
        let encoded = tokio::task::spawn_blocking(move || {
            generator.generate(&blob.content, max_width, max_height)
        })
        .await
        .map_err(|e| ThumbnailError::Task(e.to_string()))??;

        // Write-then-rename so concurrent readers never see a partial file.
        let tmp = self
            .cache_dir
            .join(format!(".{hash}_{max_width}x{max_height}.{}.tmp", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, &encoded).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        tracing::info!(
            source = %physical.display(),
            path = %target.display(),
            max_width,
            max_height,
            "Generated thumbnail"
        );
        Ok(target)
    }
}
