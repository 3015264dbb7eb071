//! Photo metadata extraction collaborator.
//!
//! EXIF parsing lives outside this crate. The upload pipeline only needs the
//! port below; [`MimeMetadataExtractor`] is the built-in implementation that
//! recognizes photos by MIME type and reports no embedded fields.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::storage::models::{FileType, PhotoMetadata};

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported file: {0}")]
    Unsupported(String),
}

#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    fn is_photo_file(&self, path: &Path) -> bool;

    async fn extract_photo_metadata(&self, path: &Path) -> Result<PhotoMetadata, MetadataError>;
}

#[derive(Debug, Default, Clone)]
pub struct MimeMetadataExtractor;

#[async_trait]
impl MetadataExtractor for MimeMetadataExtractor {
    fn is_photo_file(&self, path: &Path) -> bool {
        let name = path.to_string_lossy();
        FileType::guess(&name).1 == FileType::Image
    }

    async fn extract_photo_metadata(&self, path: &Path) -> Result<PhotoMetadata, MetadataError> {
        if !self.is_photo_file(path) {
            return Err(MetadataError::Unsupported(path.display().to_string()));
        }
        // Existence check so a vanished source surfaces as an error.
        tokio::fs::metadata(path).await?;
        Ok(PhotoMetadata::default())
    }
}
