//! Folder hierarchy as materialized paths.
//!
//! Reads go through a [`FolderCache`]; every write invalidates the cache keys
//! it can affect. Cascades (rename, recursive delete) walk an id-indexed
//! snapshot of the subtree instead of recursing over live records.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::cache::FolderCache;
use crate::paths;
use crate::service::ServiceError;
use crate::storage::models::{FileRecord, FolderRecord, RenameCascade};
use crate::storage::{Database, DatabaseError};

/// One folder that could not be removed during a recursive delete.
#[derive(Debug, Clone)]
pub struct DeleteFailure {
    pub folder_id: String,
    pub path: String,
    pub reason: String,
}

/// Outcome of a folder delete.
#[derive(Debug, Clone, Default)]
pub struct DeleteReport {
    pub deleted_folders: Vec<String>,
    pub removed_files: Vec<FileRecord>,
    pub failures: Vec<DeleteFailure>,
}

impl DeleteReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn summary(&self) -> String {
        let failed: Vec<String> = self
            .failures
            .iter()
            .map(|f| format!("'{}': {}", f.path, f.reason))
            .collect();
        format!(
            "deleted {} folders and {} files; failed {}",
            self.deleted_folders.len(),
            self.removed_files.len(),
            failed.join("; ")
        )
    }
}

/// A validated folder rename that has not been applied yet.
#[derive(Debug, Clone)]
pub struct RenamePlan {
    pub folder: FolderRecord,
    pub new_name: String,
    pub new_path: String,
}

impl RenamePlan {
    pub fn is_noop(&self) -> bool {
        self.new_path == self.folder.path && self.new_name == self.folder.name
    }
}

pub struct FolderTree {
    db: Database,
    cache: Arc<FolderCache>,
    protected_name: String,
}

impl FolderTree {
    pub fn new(db: Database, cache: Arc<FolderCache>, protected_name: impl Into<String>) -> Self {
        Self {
            db,
            cache,
            protected_name: protected_name.into(),
        }
    }

    pub fn protected_name(&self) -> &str {
        &self.protected_name
    }

    fn is_reserved(&self, name: &str) -> bool {
        name.to_lowercase() == self.protected_name.to_lowercase()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn get_by_id(&self, id: &str) -> Result<Option<FolderRecord>, ServiceError> {
        if let Some(folder) = self.cache.get_by_id(id) {
            return Ok(Some(folder));
        }
        let generation = self.cache.generation();
        let folder = self.db.get_folder(id)?;
        if let Some(ref f) = folder {
            self.cache.put(f, generation);
        }
        Ok(folder)
    }

    pub fn get_by_path(&self, path: &str) -> Result<Option<FolderRecord>, ServiceError> {
        let path = paths::normalize(path);
        if let Some(folder) = self.cache.get_by_path(&path) {
            return Ok(Some(folder));
        }
        let generation = self.cache.generation();
        let folder = self.db.get_folder_by_path(&path)?;
        if let Some(ref f) = folder {
            self.cache.put(f, generation);
        }
        Ok(folder)
    }

    /// Children of `parent_id`, or root-level folders when absent.
    pub fn get_by_parent(&self, parent_id: Option<&str>) -> Result<Vec<FolderRecord>, ServiceError> {
        if let Some(children) = self.cache.get_by_parent(parent_id) {
            return Ok(children);
        }
        let generation = self.cache.generation();
        let children = self.db.get_child_folders(parent_id)?;
        self.cache.put_children(parent_id, &children, generation);
        Ok(children)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Create `name` under `parent_id` (or at the root).
    pub fn create(&self, name: &str, parent_id: Option<&str>) -> Result<FolderRecord, ServiceError> {
        let name = paths::validate_name(name).map_err(ServiceError::Validation)?;

        let path = match parent_id {
            Some(pid) => {
                let parent = self
                    .get_by_id(pid)?
                    .ok_or_else(|| ServiceError::not_found(format!("folder {pid}")))?;
                paths::join(&parent.path, name)
            }
            None => name.to_string(),
        };

        self.insert(name, &path, parent_id)
    }

    /// Resolve a folder by path, creating it and every missing ancestor.
    /// Ancestors are discovered bottom-up and created top-down.
    pub fn get_or_create_by_path(&self, path: &str) -> Result<FolderRecord, ServiceError> {
        let path = paths::normalize(path);
        if path.is_empty() {
            return Err(ServiceError::Validation("folder path must not be empty".to_string()));
        }
        if paths::contains_traversal(&path) {
            return Err(ServiceError::PathValidation(path));
        }
        if paths::is_bare_root(&path) {
            return Err(ServiceError::InvalidOperation(format!(
                "cannot create a folder for filesystem root '{path}'"
            )));
        }

        if let Some(existing) = self.get_by_path(&path)? {
            return Ok(existing);
        }

        let mut missing = vec![path.clone()];
        let mut anchor: Option<FolderRecord> = None;
        let mut cursor = path;
        while let Some(up) = paths::parent(&cursor) {
            if let Some(found) = self.get_by_path(&up)? {
                anchor = Some(found);
                break;
            }
            missing.push(up.clone());
            cursor = up;
        }

        let mut parent = anchor;
        for folder_path in missing.into_iter().rev() {
            let name = paths::last_segment(&folder_path).to_string();
            if paths::is_bare_root(&name) {
                return Err(ServiceError::InvalidOperation(format!(
                    "cannot create a folder for root segment '{name}'"
                )));
            }
            let parent_id = parent.as_ref().map(|p| p.id.clone());
            let created = match self.insert(&name, &folder_path, parent_id.as_deref()) {
                Ok(folder) => folder,
                // Lost a race with a concurrent creator: use theirs.
                Err(ServiceError::Conflict(_)) => self
                    .db
                    .get_folder_by_path(&folder_path)?
                    .ok_or_else(|| ServiceError::not_found(format!("folder '{folder_path}'")))?,
                Err(e) => return Err(e),
            };
            parent = Some(created);
        }

        parent.ok_or_else(|| ServiceError::InvalidOperation("empty folder path".to_string()))
    }

    fn insert(&self, name: &str, path: &str, parent_id: Option<&str>) -> Result<FolderRecord, ServiceError> {
        if name.eq_ignore_ascii_case(paths::RECYCLE_BIN_DIR) {
            return Err(ServiceError::Validation(format!(
                "'{name}' is reserved for the recycle bin"
            )));
        }
        let mut folder = FolderRecord::new(name, path, parent_id);
        folder.protected = self.is_reserved(name);

        let result = self.db.insert_folder(&folder);
        self.cache.invalidate_folder(&folder);
        result?;

        tracing::info!(folder_id = %folder.id, path = %folder.path, "Created folder");
        Ok(folder)
    }

    /// Validate a rename and compute the folder's new path without
    /// touching anything.
    pub fn plan_rename(&self, id: &str, new_name: &str) -> Result<RenamePlan, ServiceError> {
        if new_name.trim().is_empty() {
            return Err(ServiceError::Validation("folder name must not be empty".to_string()));
        }
        let new_name = paths::validate_name(new_name).map_err(ServiceError::Validation)?;

        let folder = self
            .get_by_id(id)?
            .ok_or_else(|| ServiceError::not_found(format!("folder {id}")))?;
        if folder.protected {
            return Err(ServiceError::Protected(format!(
                "folder '{}' cannot be renamed",
                folder.path
            )));
        }
        if self.is_reserved(new_name) {
            return Err(ServiceError::Validation(format!(
                "'{new_name}' is a reserved folder name"
            )));
        }

        let new_path = match paths::parent(&folder.path) {
            Some(parent_path) => paths::join(&parent_path, new_name),
            None => match folder.path.rfind(paths::SEPARATOR) {
                // Top-level absolute path like "/srv": keep the leading root.
                Some(idx) => format!("{}{new_name}", &folder.path[..=idx]),
                None => new_name.to_string(),
            },
        };

        Ok(RenamePlan {
            folder,
            new_name: new_name.to_string(),
            new_path,
        })
    }

    /// Apply a planned rename, cascading the path change to all descendants
    /// and the files beneath them in one transaction.
    pub fn apply_rename(&self, plan: &RenamePlan) -> Result<RenameCascade, ServiceError> {
        if plan.is_noop() {
            return Ok(RenameCascade {
                old_path: plan.folder.path.clone(),
                folder: plan.folder.clone(),
                folders_updated: 0,
                files_updated: 0,
            });
        }

        let id = plan.folder.id.as_str();
        let result = self.db.rename_folder(id, &plan.new_name, &plan.new_path);
        self.cache.invalidate_all();

        let cascade = result?.ok_or_else(|| ServiceError::not_found(format!("folder {id}")))?;
        tracing::info!(
            folder_id = %id,
            old_path = %cascade.old_path,
            new_path = %cascade.folder.path,
            folders_updated = cascade.folders_updated,
            files_updated = cascade.files_updated,
            "Renamed folder"
        );
        Ok(cascade)
    }

    pub fn rename(&self, id: &str, new_name: &str) -> Result<RenameCascade, ServiceError> {
        let plan = self.plan_rename(id, new_name)?;
        self.apply_rename(&plan)
    }

    /// Delete a folder. Without `force` the folder must be empty. With
    /// `force` the subtree is removed children-first; a failing folder is
    /// reported and its siblings are still processed.
    pub fn delete(&self, id: &str, force: bool) -> Result<DeleteReport, ServiceError> {
        let folder = self
            .get_by_id(id)?
            .ok_or_else(|| ServiceError::not_found(format!("folder {id}")))?;
        if folder.protected {
            return Err(ServiceError::Protected(format!(
                "folder '{}' cannot be deleted",
                folder.path
            )));
        }

        let children = self.db.get_child_folders(Some(id))?;
        if !children.is_empty() && !force {
            return Err(ServiceError::FolderNotEmpty(format!(
                "folder '{}' contains subfolders",
                folder.path
            )));
        }
        let file_count = self.db.count_files_in_folder(id)?;
        if file_count > 0 && !force {
            return Err(ServiceError::FolderNotEmpty(format!(
                "folder '{}' contains {file_count} files",
                folder.path
            )));
        }

        let report = if force {
            self.delete_subtree(id)?
        } else {
            let mut report = DeleteReport::default();
            self.delete_one(&folder, &mut report)?;
            report
        };
        self.cache.invalidate_all();

        tracing::info!(
            folder_id = %id,
            deleted_folders = report.deleted_folders.len(),
            removed_files = report.removed_files.len(),
            failures = report.failures.len(),
            "Deleted folder"
        );

        if report.is_complete() {
            Ok(report)
        } else {
            Err(ServiceError::PartialFailure(Box::new(report)))
        }
    }

    fn delete_one(&self, folder: &FolderRecord, report: &mut DeleteReport) -> Result<(), DatabaseError> {
        let removed = self.db.delete_folder(&folder.id)?.unwrap_or_default();
        report.deleted_folders.push(folder.id.clone());
        report.removed_files.extend(removed);
        Ok(())
    }

    /// Post-order delete over an arena of the subtree.
    fn delete_subtree(&self, root_id: &str) -> Result<DeleteReport, ServiceError> {
        let snapshot = self.db.get_subtree(root_id)?;
        let arena: HashMap<&str, &FolderRecord> =
            snapshot.iter().map(|f| (f.id.as_str(), f)).collect();
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        for folder in &snapshot {
            if folder.id == root_id {
                continue;
            }
            if let Some(parent) = folder.parent_id.as_deref() {
                children.entry(parent).or_default().push(folder.id.as_str());
            }
        }

        // Iterative post-order: children are emitted before their parent.
        let mut order: Vec<&str> = Vec::with_capacity(snapshot.len());
        let mut stack: Vec<(&str, bool)> = vec![(root_id, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            stack.push((id, true));
            if let Some(kids) = children.get(id) {
                for kid in kids.iter().rev() {
                    stack.push((*kid, false));
                }
            }
        }

        let mut report = DeleteReport::default();
        let mut blocked: HashSet<&str> = HashSet::new();

        for id in order {
            let Some(folder) = arena.get(id).copied() else {
                continue;
            };

            let reason = if folder.protected {
                Some("folder is protected".to_string())
            } else if blocked.contains(id) {
                Some("contains subfolders that could not be deleted".to_string())
            } else {
                match self.delete_one(folder, &mut report) {
                    Ok(()) => None,
                    Err(e) => Some(e.to_string()),
                }
            };

            if let Some(reason) = reason {
                tracing::warn!(folder_id = %folder.id, path = %folder.path, %reason, "Folder not deleted");
                report.failures.push(DeleteFailure {
                    folder_id: folder.id.clone(),
                    path: folder.path.clone(),
                    reason,
                });
                if let Some(parent) = folder.parent_id.as_deref() {
                    if id != root_id {
                        blocked.insert(parent);
                    }
                }
            }
        }

        Ok(report)
    }
}
