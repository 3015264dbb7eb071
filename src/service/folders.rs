use super::{FileService, ServiceError};
use crate::context::RequestContext;
use crate::folders::DeleteReport;
use crate::storage::models::{FolderRecord, RenameCascade};

impl FileService {
    pub fn get_folder(&self, id: &str) -> Result<FolderRecord, ServiceError> {
        self.folders
            .get_by_id(id)?
            .ok_or_else(|| ServiceError::not_found(format!("folder {id}")))
    }

    /// Children of `parent_id`, or root-level folders.
    pub fn list_folders(&self, parent_id: Option<&str>) -> Result<Vec<FolderRecord>, ServiceError> {
        self.folders.get_by_parent(parent_id)
    }

    pub fn create_folder(
        &self,
        ctx: &RequestContext,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<FolderRecord, ServiceError> {
        Self::ensure_active(ctx)?;
        let folder = self.folders.create(name, parent_id)?;
        tracing::debug!(request_id = %ctx.request_id, folder_id = %folder.id, "Folder created");
        Ok(folder)
    }

    pub fn get_or_create_folder(&self, ctx: &RequestContext, path: &str) -> Result<FolderRecord, ServiceError> {
        Self::ensure_active(ctx)?;
        self.folders.get_or_create_by_path(path)
    }

    /// Rename a folder. The physical directory moves first; if the metadata
    /// cascade then fails the directory is moved back.
    pub async fn rename_folder(
        &self,
        ctx: &RequestContext,
        id: &str,
        new_name: &str,
    ) -> Result<RenameCascade, ServiceError> {
        let plan = self.folders.plan_rename(id, new_name)?;
        if plan.is_noop() {
            return self.folders.apply_rename(&plan);
        }
        Self::ensure_active(ctx)?;

        let old_dir = self.physical_location(&plan.folder.path);
        let new_dir = self.physical_location(&plan.new_path);
        let case_only = plan.folder.path.to_lowercase() == plan.new_path.to_lowercase();

        let moved = if tokio::fs::try_exists(&old_dir).await? {
            if !case_only && tokio::fs::try_exists(&new_dir).await? {
                return Err(ServiceError::Conflict(format!(
                    "directory '{}' already exists",
                    new_dir.display()
                )));
            }
            tokio::fs::rename(&old_dir, &new_dir).await?;
            true
        } else {
            tracing::debug!(path = %old_dir.display(), "No physical directory to rename");
            false
        };

        match self.folders.apply_rename(&plan) {
            Ok(cascade) => {
                tracing::info!(
                    request_id = %ctx.request_id,
                    folder_id = %id,
                    new_path = %cascade.folder.path,
                    "Folder renamed"
                );
                Ok(cascade)
            }
            Err(e) => {
                if moved {
                    if let Err(revert) = tokio::fs::rename(&new_dir, &old_dir).await {
                        tracing::warn!(
                            from = %new_dir.display(),
                            to = %old_dir.display(),
                            error = %revert,
                            "Failed to restore directory after rename cascade failed"
                        );
                    }
                }
                Err(e)
            }
        }
    }

    /// Delete a folder (recursively with `force`). Artifacts of removed
    /// file records are discarded afterwards; failures there are logged.
    pub async fn delete_folder(
        &self,
        ctx: &RequestContext,
        id: &str,
        force: bool,
    ) -> Result<DeleteReport, ServiceError> {
        Self::ensure_active(ctx)?;
        let result = self.folders.delete(id, force);

        let removed = match &result {
            Ok(report) => report.removed_files.as_slice(),
            Err(ServiceError::PartialFailure(report)) => report.removed_files.as_slice(),
            Err(_) => &[],
        };
        for file in removed {
            if let Err(e) = self.discard_artifact(file).await {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    file_id = %file.id,
                    error = %e,
                    "Failed to discard artifact of deleted file"
                );
            }
        }

        if let Ok(report) = &result {
            tracing::info!(
                request_id = %ctx.request_id,
                folder_id = %id,
                deleted_folders = report.deleted_folders.len(),
                removed_files = report.removed_files.len(),
                "Folder deleted"
            );
        }
        result
    }
}
