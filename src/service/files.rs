use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use super::{FileService, ServiceError};
use crate::blob::{is_compressed, with_suffix};
use crate::context::RequestContext;
use crate::paths;
use crate::storage::models::{FileRecord, FileType};

/// Decompressed content ready to hand to a client.
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Bytes,
    pub mime_type: String,
    pub file_name: String,
}

impl FileService {
    pub fn get_file(&self, id: &str) -> Result<FileRecord, ServiceError> {
        self.require_file(id)
    }

    /// Files in a folder, or every file when `folder_id` is absent.
    pub fn list_files(&self, folder_id: Option<&str>) -> Result<Vec<FileRecord>, ServiceError> {
        if let Some(id) = folder_id {
            if self.folders.get_by_id(id)?.is_none() {
                return Err(ServiceError::not_found(format!("folder {id}")));
            }
        }
        Ok(self.db.list_files(folder_id, None)?)
    }

    /// Rename a file in place: move the artifact, then update the record.
    /// A crash between the two leaves them disagreeing; the resolver's
    /// candidate logging is how that shows up.
    pub async fn rename_file(
        &self,
        ctx: &RequestContext,
        id: &str,
        new_name: &str,
    ) -> Result<FileRecord, ServiceError> {
        if paths::contains_traversal(new_name) {
            return Err(ServiceError::PathValidation(format!(
                "name '{new_name}' contains a traversal marker"
            )));
        }
        let new_name = paths::validate_name(new_name).map_err(ServiceError::Validation)?;

        let file = self.require_file(id)?;
        let new_path = sibling_path(&file.path, new_name);
        if new_path == file.path {
            return Ok(file);
        }
        if let Some(holder) = self.db.get_file_by_path(&new_path)? {
            return Err(ServiceError::Conflict(format!(
                "'{new_path}' is already used by file {}",
                holder.id
            )));
        }

        Self::ensure_active(ctx)?;
        let current = self.locate(&file).await?;
        let plain_target = self.physical_location(&new_path);
        let target = if is_compressed(&current) {
            with_suffix(&plain_target)
        } else {
            plain_target
        };

        self.blobs.relocate(&current, &target).await?;

        let updated = match self.db.update_file_location(id, &new_path, new_name) {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                self.revert_relocate(&target, &current).await;
                return Err(ServiceError::not_found(format!("file {id}")));
            }
            Err(e) => {
                self.revert_relocate(&target, &current).await;
                return Err(e.into());
            }
        };

        tracing::info!(
            request_id = %ctx.request_id,
            file_id = %id,
            old_path = %file.path,
            new_path = %updated.path,
            "Renamed file"
        );
        Ok(updated)
    }

    async fn revert_relocate(&self, moved_to: &Path, original: &Path) {
        if let Err(e) = self.blobs.relocate(moved_to, original).await {
            tracing::warn!(
                from = %moved_to.display(),
                to = %original.display(),
                error = %e,
                "Failed to move artifact back after metadata update failed"
            );
        }
    }

    /// Delete the artifact, then the record. A missing artifact is a soft
    /// miss.
    pub async fn delete_file(&self, ctx: &RequestContext, id: &str) -> Result<FileRecord, ServiceError> {
        let file = self.require_file(id)?;
        Self::ensure_active(ctx)?;
        self.discard_artifact(&file).await?;

        let removed = self
            .db
            .delete_file(id)?
            .ok_or_else(|| ServiceError::not_found(format!("file {id}")))?;

        tracing::info!(request_id = %ctx.request_id, file_id = %id, path = %removed.path, "Deleted file");
        Ok(removed)
    }

    /// Remove the artifact backing `file`. Missing artifacts are logged, not
    /// returned as errors.
    pub(super) async fn discard_artifact(&self, file: &FileRecord) -> Result<(), ServiceError> {
        let Some(physical) = self.resolver.resolve(&file.path, file.compressed).await else {
            tracing::warn!(file_id = %file.id, path = %file.path, "No artifact to delete");
            return Ok(());
        };
        let removed = self
            .blobs
            .delete(&physical, self.config.storage.use_recycle_bin)
            .await?;
        if !removed {
            tracing::warn!(file_id = %file.id, path = %physical.display(), "Artifact vanished before delete");
        }
        Ok(())
    }

    /// Resolve and read a file's content, decompressing as needed.
    pub async fn read_for_download(&self, ctx: &RequestContext, id: &str) -> Result<Download, ServiceError> {
        let file = self.require_file(id)?;
        let physical = self.locate(&file).await?;
        let blob = self
            .blobs
            .read(&physical, file.compressed, ctx.cancellation())
            .await?;

        tracing::debug!(
            request_id = %ctx.request_id,
            file_id = %id,
            path = %physical.display(),
            decompressed = blob.decompressed,
            "Read file for download"
        );
        Ok(Download {
            bytes: blob.content,
            mime_type: file.mime_type,
            file_name: file.original_name,
        })
    }

    // ========================================================================
    // Tags
    // ========================================================================

    pub fn set_tags<I, S>(&self, id: &str, tags: I) -> Result<FileRecord, ServiceError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags: BTreeSet<String> = tags
            .into_iter()
            .filter_map(|t| clean_tag(t.as_ref()))
            .collect();
        self.db
            .set_file_tags(id, &tags)?
            .ok_or_else(|| ServiceError::not_found(format!("file {id}")))
    }

    pub fn add_tag(&self, id: &str, tag: &str) -> Result<FileRecord, ServiceError> {
        let tag = clean_tag(tag).ok_or_else(|| ServiceError::Validation("tag must not be empty".to_string()))?;
        let mut file = self.require_file(id)?;
        if !file.tags.insert(tag) {
            return Ok(file);
        }
        self.set_tags(id, &file.tags)
    }

    pub fn remove_tag(&self, id: &str, tag: &str) -> Result<FileRecord, ServiceError> {
        let mut file = self.require_file(id)?;
        if !file.tags.remove(tag.trim()) {
            return Ok(file);
        }
        self.set_tags(id, &file.tags)
    }

    /// Thumbnail for an image file, generated on first request.
    pub async fn thumbnail(
        &self,
        ctx: &RequestContext,
        id: &str,
        max_width: u32,
        max_height: u32,
    ) -> Result<PathBuf, ServiceError> {
        let file = self.require_file(id)?;
        if file.file_type != FileType::Image {
            return Err(ServiceError::Validation(format!(
                "file {id} is not an image ({})",
                file.mime_type
            )));
        }
        let physical = self.locate(&file).await?;
        Ok(self
            .thumbnails
            .get_or_create(&physical, max_width, max_height, ctx.cancellation())
            .await?)
    }
}

fn clean_tag(tag: &str) -> Option<String> {
    let tag = tag.trim();
    (!tag.is_empty()).then(|| tag.to_string())
}

/// `dir/old.txt` + `new.txt` -> `dir/new.txt`.
fn sibling_path(path: &str, name: &str) -> String {
    match path.rfind(paths::SEPARATOR) {
        Some(idx) => format!("{}{name}", &path[..=idx]),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sibling_path() {
        assert_eq!(sibling_path("Default/a.txt", "b.txt"), "Default/b.txt");
        assert_eq!(sibling_path("/srv/a.txt", "b.txt"), "/srv/b.txt");
        assert_eq!(sibling_path("a.txt", "b.txt"), "b.txt");
    }

    #[test]
    fn test_clean_tag() {
        assert_eq!(clean_tag("  work "), Some("work".to_string()));
        assert_eq!(clean_tag("   "), None);
    }

    #[tokio::test]
    async fn test_tags_are_trimmed_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let service = crate::testutil::test_service(&dir);
        let ctx = RequestContext::default();
        let source = dir.path().join("notes.txt");
        tokio::fs::write(&source, b"tagged").await.unwrap();
        let outcome = service.upload(&ctx, &source, "notes.txt", None).await.unwrap();

        let file = service.set_tags(&outcome.id, ["  zeta", "alpha ", ""]).unwrap();
        assert_eq!(file.tags.iter().collect::<Vec<_>>(), vec!["alpha", "zeta"]);

        let file = service.add_tag(&outcome.id, "beta").unwrap();
        assert_eq!(file.tags.len(), 3);
        let file = service.remove_tag(&outcome.id, "alpha").unwrap();
        assert!(!file.tags.contains("alpha"));
        assert!(service.add_tag(&outcome.id, " ").is_err());
    }
}
