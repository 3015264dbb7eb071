use std::path::{Path, PathBuf};

use super::{FileService, ServiceError, UploadOutcome};
use crate::context::RequestContext;
use crate::paths;
use crate::storage::models::FolderRecord;

#[derive(Debug, Clone)]
pub struct IngestFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of a batch ingest.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub uploaded: Vec<UploadOutcome>,
    /// Sources already ingested or whose content is already stored
    pub duplicates: usize,
    pub folders_visited: usize,
    pub failures: Vec<IngestFailure>,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, path: &Path, result: Result<UploadOutcome, ServiceError>) -> Result<(), ServiceError> {
        match result {
            Ok(outcome) if outcome.is_duplicate => self.duplicates += 1,
            Ok(outcome) => self.uploaded.push(outcome),
            Err(e) if e.is_duplicate_content() => {
                tracing::debug!(path = %path.display(), error = %e, "Skipping duplicate content");
                self.duplicates += 1;
            }
            Err(ServiceError::Cancelled) => return Err(ServiceError::Cancelled),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to ingest file");
                self.failures.push(IngestFailure {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl FileService {
    /// Ingest a file or a whole directory tree into `folder_id` (or the
    /// default folder).
    pub async fn ingest(
        &self,
        ctx: &RequestContext,
        path: &Path,
        folder_id: Option<&str>,
    ) -> Result<IngestReport, ServiceError> {
        if tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir()) {
            return self.ingest_directory(ctx, path, folder_id).await;
        }

        let mut report = IngestReport::default();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let result = self.upload(ctx, path, &name, folder_id).await;
        report.record(path, result)?;
        Ok(report)
    }

    /// Walk `dir` iteratively, mirroring each sub-directory as a child
    /// folder of the target and uploading every file. Per-file failures are
    /// recorded and the walk continues; cancellation aborts it.
    pub async fn ingest_directory(
        &self,
        ctx: &RequestContext,
        dir: &Path,
        folder_id: Option<&str>,
    ) -> Result<IngestReport, ServiceError> {
        if paths::contains_traversal(&dir.to_string_lossy()) {
            return Err(ServiceError::PathValidation(format!(
                "directory '{}' contains a traversal marker",
                dir.display()
            )));
        }
        let root = match folder_id {
            Some(id) => self.get_folder(id)?,
            None => self.default_folder()?,
        };

        tracing::info!(
            request_id = %ctx.request_id,
            source = %dir.display(),
            folder = %root.path,
            "Starting batch ingest"
        );

        let mut report = IngestReport::default();
        let mut pending: Vec<(PathBuf, FolderRecord)> = vec![(dir.to_path_buf(), root)];

        while let Some((current, folder)) = pending.pop() {
            Self::ensure_active(ctx)?;
            report.folders_visited += 1;

            let mut entries = Vec::new();
            let mut reader = match tokio::fs::read_dir(&current).await {
                Ok(reader) => reader,
                Err(e) => {
                    report.failures.push(IngestFailure {
                        path: current.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            while let Some(entry) = reader.next_entry().await? {
                entries.push(entry);
            }
            entries.sort_by_key(|e| e.file_name());

            for entry in entries {
                Self::ensure_active(ctx)?;
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().to_string();
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    match self.folders.get_or_create_by_path(&paths::join(&folder.path, &name)) {
                        Ok(child) => pending.push((path, child)),
                        Err(e) => {
                            tracing::warn!(path = %path.display(), error = %e, "Cannot mirror directory");
                            report.failures.push(IngestFailure {
                                path,
                                error: e.to_string(),
                            });
                        }
                    }
                } else if file_type.is_file() {
                    let result = self.upload(ctx, &path, &name, Some(&folder.id)).await;
                    report.record(&path, result)?;
                }
            }
        }

        tracing::info!(
            request_id = %ctx.request_id,
            uploaded = report.uploaded.len(),
            duplicates = report.duplicates,
            failures = report.failures.len(),
            "Batch ingest finished"
        );
        Ok(report)
    }
}
