use std::path::{Path, PathBuf};

use chrono::Utc;

use super::{FileService, ServiceError};
use crate::context::RequestContext;
use crate::hasher;
use crate::paths;
use crate::storage::models::{FileRecord, FileType, FolderRecord};
use crate::storage::{DatabaseError, UniqueIndex};

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub id: String,
    /// True when the source had already been ingested and nothing was stored
    pub is_duplicate: bool,
    /// Logical path of the record
    pub stored_path: String,
}

impl FileService {
    /// Ingest one file: hash it, refuse duplicate content, store it
    /// compressed under the destination folder and persist its record.
    pub async fn upload(
        &self,
        ctx: &RequestContext,
        source: &Path,
        display_name: &str,
        folder_id: Option<&str>,
    ) -> Result<UploadOutcome, ServiceError> {
        let source_str = source.to_string_lossy();
        if paths::contains_traversal(&source_str) {
            return Err(ServiceError::PathValidation(format!(
                "source '{source_str}' contains a traversal marker"
            )));
        }
        let display_name = paths::validate_name(display_name).map_err(ServiceError::Validation)?;

        // Opened once up front; anything that keeps the bytes out of reach
        // is reported as a missing source.
        let reader = tokio::fs::File::open(source)
            .await
            .map_err(|e| unreadable_source(source, e))?;
        let meta = reader
            .metadata()
            .await
            .map_err(|e| unreadable_source(source, e))?;
        if !meta.is_file() {
            return Err(ServiceError::Validation(format!(
                "source '{source_str}' is not a regular file"
            )));
        }
        if meta.len() > self.config.max_upload_size {
            return Err(ServiceError::Validation(format!(
                "file exceeds maximum upload size of {} bytes",
                self.config.max_upload_size
            )));
        }

        let normalized_source = normalize_source(source)?;
        if let Some(existing) = self.already_ingested(&normalized_source)? {
            tracing::debug!(
                request_id = %ctx.request_id,
                file_id = %existing.id,
                source = %normalized_source,
                "Source already ingested"
            );
            return Ok(UploadOutcome {
                id: existing.id,
                is_duplicate: true,
                stored_path: existing.path,
            });
        }

        Self::ensure_active(ctx)?;
        let content_hash = hasher::hash_reader(reader, ctx.cancellation()).await?;
        tracing::debug!(request_id = %ctx.request_id, hash = %content_hash, "Hashed source");

        if let Some(existing) = self.db.get_file_by_hash(&content_hash)? {
            return Err(ServiceError::DuplicateContent {
                existing_id: existing.id,
                existing_path: existing.path,
            });
        }

        let folder = self.resolve_destination(folder_id)?;
        let destination = self.physical_location(&paths::join(&folder.path, display_name));

        Self::ensure_active(ctx)?;
        let physical = self
            .blobs
            .store(source, &destination, ctx.cancellation())
            .await?;
        tracing::debug!(request_id = %ctx.request_id, path = %physical.display(), "Stored artifact");

        match self
            .persist(ctx, source, display_name, &physical, &normalized_source, content_hash, &folder)
            .await
        {
            Ok(record) => {
                tracing::info!(
                    request_id = %ctx.request_id,
                    file_id = %record.id,
                    path = %record.path,
                    byte_size = record.byte_size,
                    "Uploaded file"
                );
                Ok(UploadOutcome {
                    id: record.id,
                    is_duplicate: false,
                    stored_path: record.path,
                })
            }
            Err(e) => {
                // The artifact is garbage without its record.
                if let Err(cleanup) = self.blobs.delete(&physical, false).await {
                    tracing::warn!(
                        path = %physical.display(),
                        error = %cleanup,
                        "Failed to remove orphaned artifact"
                    );
                }
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn persist(
        &self,
        ctx: &RequestContext,
        source: &Path,
        display_name: &str,
        physical: &Path,
        normalized_source: &str,
        content_hash: String,
        folder: &FolderRecord,
    ) -> Result<FileRecord, ServiceError> {
        let byte_size = tokio::fs::metadata(physical).await?.len();
        let (mime_type, file_type) = FileType::guess(display_name);

        let photo = if self.metadata.is_photo_file(source) {
            match self.metadata.extract_photo_metadata(source).await {
                Ok(photo) => Some(photo),
                Err(e) => {
                    tracing::warn!(
                        request_id = %ctx.request_id,
                        source = %source.display(),
                        error = %e,
                        "Photo metadata extraction failed"
                    );
                    None
                }
            }
        } else {
            None
        };

        let now = Utc::now();
        let record = FileRecord {
            id: uuid::Uuid::new_v4().to_string(),
            path: self.logical_location(physical),
            original_name: display_name.to_string(),
            content_hash,
            byte_size,
            compressed: crate::blob::is_compressed(physical),
            mime_type,
            file_type,
            created_at: now,
            updated_at: now,
            tags: Default::default(),
            folder_id: Some(folder.id.clone()),
            source_path: Some(normalized_source.to_string()),
            photo,
        };

        Self::ensure_active(ctx)?;
        match self.db.insert_file(&record) {
            Ok(()) => Ok(record),
            // Lost a race with a concurrent upload of the same bytes.
            Err(DatabaseError::UniqueViolation {
                index: UniqueIndex::FileHash,
                existing_id,
                ..
            }) => {
                let existing_path = self
                    .db
                    .get_file(&existing_id)?
                    .map(|f| f.path)
                    .unwrap_or_default();
                Err(ServiceError::DuplicateContent {
                    existing_id,
                    existing_path,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// A record that already references this source, either through the
    /// ingest-source index or because the source is the stored artifact.
    fn already_ingested(
        &self,
        normalized_source: &str,
    ) -> Result<Option<FileRecord>, ServiceError> {
        if let Some(found) = self.db.get_file_by_source(normalized_source)? {
            return Ok(Some(found));
        }
        let absolute = PathBuf::from(normalized_source);
        if absolute.starts_with(self.storage_root()) {
            let logical = self.logical_location(&absolute);
            return Ok(self.db.get_file_by_path(&logical)?);
        }
        Ok(None)
    }

    /// The supplied folder when it exists, else the default folder.
    pub(super) fn resolve_destination(
        &self,
        folder_id: Option<&str>,
    ) -> Result<FolderRecord, ServiceError> {
        if let Some(id) = folder_id {
            match self.folders.get_by_id(id)? {
                Some(folder) => return Ok(folder),
                None => tracing::warn!(folder_id = %id, "Destination folder not found, using default"),
            }
        }
        self.default_folder()
    }

    pub(super) fn default_folder(&self) -> Result<FolderRecord, ServiceError> {
        let name = self.folders.protected_name();
        match self.folders.get_or_create_by_path(name) {
            Ok(folder) => Ok(folder),
            Err(e) => {
                tracing::warn!(error = %e, "Default folder lookup failed, creating explicitly");
                match self.folders.create(name, None) {
                    Ok(folder) => Ok(folder),
                    Err(ServiceError::Conflict(_)) => self
                        .db
                        .get_folder_by_path(name)?
                        .ok_or_else(|| ServiceError::not_found(format!("folder '{name}'"))),
                    Err(e) => Err(e),
                }
            }
        }
    }
}

fn unreadable_source(source: &Path, e: std::io::Error) -> ServiceError {
    tracing::debug!(source = %source.display(), error = %e, "Source is not readable");
    ServiceError::NotFound {
        resource: format!("source '{}'", source.display()),
        candidates: vec![source.to_path_buf()],
    }
}

/// Absolute, `/`-separated form of a source location.
fn normalize_source(source: &Path) -> Result<String, ServiceError> {
    let absolute = if source.is_absolute() {
        source.to_path_buf()
    } else {
        std::env::current_dir()?.join(source)
    };
    Ok(paths::normalize(&absolute.to_string_lossy()))
}
