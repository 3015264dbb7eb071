use std::collections::VecDeque;

use redb::{ReadableTable, Table};

use super::db::{id_list, id_list_add, id_list_remove, load, lookup, Database, DatabaseError, UniqueIndex};
use super::files::remove_file_in;
use super::models::{FileRecord, FolderRecord, RenameCascade};
use super::tables::*;
use crate::paths;

impl Database {
    // ========================================================================
    // Folder operations
    // ========================================================================

    /// Insert a folder. Enforces: parent exists, path unique, and no sibling
    /// with the same name compared case-insensitively.
    pub fn insert_folder(&self, folder: &FolderRecord) -> Result<(), DatabaseError> {
        debug_assert!(!folder.name.is_empty(), "folder name must not be empty");

        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(FOLDERS)?;
            let mut folder_paths = write_txn.open_table(FOLDER_PATHS)?;
            let mut children = write_txn.open_table(FOLDER_CHILDREN)?;

            if let Some(ref parent_id) = folder.parent_id {
                if table.get(parent_id.as_str())?.is_none() {
                    return Err(DatabaseError::MissingReference(format!(
                        "parent folder {parent_id}"
                    )));
                }
            }

            if let Some(existing_id) = lookup(&folder_paths, &folder.path)? {
                return Err(DatabaseError::UniqueViolation {
                    index: UniqueIndex::FolderPath,
                    value: folder.path.clone(),
                    existing_id,
                });
            }

            let key = parent_key(folder.parent_id.as_deref());
            if let Some(existing_id) = sibling_with_name(&table, &children, key, &folder.name, None)? {
                return Err(DatabaseError::UniqueViolation {
                    index: UniqueIndex::FolderSiblingName,
                    value: folder.name.clone(),
                    existing_id,
                });
            }

            let data = rmp_serde::to_vec_named(folder)?;
            table.insert(folder.id.as_str(), data.as_slice())?;
            folder_paths.insert(folder.path.as_str(), folder.id.as_str())?;
            id_list_add(&mut children, key, &folder.id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get a folder by its UUID
    pub fn get_folder(&self, id: &str) -> Result<Option<FolderRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FOLDERS)?;
        load(&table, id)
    }

    /// Get a folder by its materialized path
    pub fn get_folder_by_path(&self, path: &str) -> Result<Option<FolderRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let folder_paths = read_txn.open_table(FOLDER_PATHS)?;

        let id = match lookup(&folder_paths, path)? {
            Some(id) => id,
            None => return Ok(None),
        };

        let table = read_txn.open_table(FOLDERS)?;
        load(&table, &id)
    }

    /// Children of a folder, or root-level folders when `parent_id` is None
    pub fn get_child_folders(
        &self,
        parent_id: Option<&str>,
    ) -> Result<Vec<FolderRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let children = read_txn.open_table(FOLDER_CHILDREN)?;
        let table = read_txn.open_table(FOLDERS)?;

        let mut folders = Vec::new();
        for child_id in id_list(&children, parent_key(parent_id))? {
            if let Some(folder) = load(&table, &child_id)? {
                folders.push(folder);
            }
        }
        folders.sort_by(|a: &FolderRecord, b: &FolderRecord| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(folders)
    }

    /// Get all folders
    pub fn get_all_folders(&self) -> Result<Vec<FolderRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FOLDERS)?;

        let mut folders = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let folder: FolderRecord = rmp_serde::from_slice(value.value())?;
            folders.push(folder);
        }
        Ok(folders)
    }

    /// A folder and all of its descendants, read in one snapshot. The root
    /// comes first, followed by descendants in breadth-first order.
    pub fn get_subtree(&self, id: &str) -> Result<Vec<FolderRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FOLDERS)?;
        let children = read_txn.open_table(FOLDER_CHILDREN)?;

        let mut out = Vec::new();
        let mut queue = VecDeque::from([id.to_string()]);
        while let Some(current) = queue.pop_front() {
            if let Some(folder) = load::<FolderRecord, _>(&table, &current)? {
                queue.extend(id_list(&children, &folder.id)?);
                out.push(folder);
            }
        }
        Ok(out)
    }

    /// Rename a folder and cascade the new prefix to every descendant folder
    /// and to every file recorded underneath the old path, all inside one
    /// write transaction.
    pub fn rename_folder(
        &self,
        id: &str,
        new_name: &str,
        new_path: &str,
    ) -> Result<Option<RenameCascade>, DatabaseError> {
        let write_txn = self.begin_write()?;

        let cascade = {
            let mut table = write_txn.open_table(FOLDERS)?;
            let mut folder_paths = write_txn.open_table(FOLDER_PATHS)?;
            let children = write_txn.open_table(FOLDER_CHILDREN)?;

            let mut folder: FolderRecord = match load(&table, id)? {
                Some(folder) => folder,
                None => return Ok(None),
            };

            let key = parent_key(folder.parent_id.as_deref());
            if let Some(existing_id) = sibling_with_name(&table, &children, key, new_name, Some(id))? {
                return Err(DatabaseError::UniqueViolation {
                    index: UniqueIndex::FolderSiblingName,
                    value: new_name.to_string(),
                    existing_id,
                });
            }
            if let Some(holder) = lookup(&folder_paths, new_path)? {
                if holder != id {
                    return Err(DatabaseError::UniqueViolation {
                        index: UniqueIndex::FolderPath,
                        value: new_path.to_string(),
                        existing_id: holder,
                    });
                }
            }

            let old_path = std::mem::replace(&mut folder.path, new_path.to_string());
            folder.name = new_name.to_string();
            move_folder_path(&mut table, &mut folder_paths, &folder, &old_path)?;

            // Depth-first over the id index: each folder is rewritten before
            // its own children are visited.
            let mut folders_updated = 0;
            let mut stack = id_list(&children, id)?;
            stack.reverse();
            while let Some(child_id) = stack.pop() {
                let mut child: FolderRecord = match load(&table, &child_id)? {
                    Some(child) => child,
                    None => continue,
                };
                let previous = child.path.clone();
                match paths::rebase(&previous, &old_path, new_path) {
                    Some(rebased) => child.path = rebased,
                    None => {
                        return Err(DatabaseError::Constraint(format!(
                            "folder {} at '{}' is not under its parent path '{}'",
                            child.id, previous, old_path
                        )))
                    }
                }
                move_folder_path(&mut table, &mut folder_paths, &child, &previous)?;
                folders_updated += 1;

                let mut grandchildren = id_list(&children, &child_id)?;
                grandchildren.reverse();
                stack.extend(grandchildren);
            }

            (folder, old_path, folders_updated)
        };

        let (folder, old_path, folders_updated) = cascade;
        let files_updated = rebase_file_paths(&write_txn, &old_path, new_path)?;

        write_txn.commit()?;
        Ok(Some(RenameCascade {
            folder,
            old_path,
            folders_updated,
            files_updated,
        }))
    }

    /// Delete one folder together with every file record it holds. Fails
    /// with `Constraint` if the folder still has child folders. Returns the
    /// removed file records.
    pub fn delete_folder(&self, id: &str) -> Result<Option<Vec<FileRecord>>, DatabaseError> {
        let write_txn = self.begin_write()?;

        let folder: FolderRecord = {
            let table = write_txn.open_table(FOLDERS)?;
            let children = write_txn.open_table(FOLDER_CHILDREN)?;
            let folder: FolderRecord = match load(&table, id)? {
                Some(folder) => folder,
                None => return Ok(None),
            };
            if !id_list(&children, id)?.is_empty() {
                return Err(DatabaseError::Constraint(format!(
                    "folder '{}' still contains subfolders",
                    folder.path
                )));
            }
            folder
        };

        let file_ids = {
            let folder_files = write_txn.open_table(FOLDER_FILES)?;
            id_list(&folder_files, id)?
        };

        let mut removed = Vec::with_capacity(file_ids.len());
        for file_id in file_ids {
            if let Some(file) = remove_file_in(&write_txn, &file_id)? {
                removed.push(file);
            }
        }

        {
            let mut table = write_txn.open_table(FOLDERS)?;
            let mut folder_paths = write_txn.open_table(FOLDER_PATHS)?;
            let mut children = write_txn.open_table(FOLDER_CHILDREN)?;
            let mut folder_files = write_txn.open_table(FOLDER_FILES)?;

            table.remove(id)?;
            folder_paths.remove(folder.path.as_str())?;
            id_list_remove(&mut children, parent_key(folder.parent_id.as_deref()), id)?;
            folder_files.remove(id)?;
        }

        write_txn.commit()?;
        Ok(Some(removed))
    }
}

/// Find a sibling under `key` whose name matches case-insensitively,
/// ignoring `exclude_id`.
fn sibling_with_name<F, C>(
    folders: &F,
    children: &C,
    key: &str,
    name: &str,
    exclude_id: Option<&str>,
) -> Result<Option<String>, DatabaseError>
where
    F: ReadableTable<&'static str, &'static [u8]>,
    C: ReadableTable<&'static str, &'static [u8]>,
{
    let wanted = name.to_lowercase();
    for sibling_id in id_list(children, key)? {
        if Some(sibling_id.as_str()) == exclude_id {
            continue;
        }
        if let Some(sibling) = load::<FolderRecord, _>(folders, &sibling_id)? {
            if sibling.name.to_lowercase() == wanted {
                return Ok(Some(sibling.id));
            }
        }
    }
    Ok(None)
}

/// Persist a folder whose path changed and repoint the path index.
fn move_folder_path(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    folder_paths: &mut Table<'_, &'static str, &'static str>,
    folder: &FolderRecord,
    old_path: &str,
) -> Result<(), DatabaseError> {
    let data = rmp_serde::to_vec_named(folder)?;
    table.insert(folder.id.as_str(), data.as_slice())?;
    if lookup(&*folder_paths, old_path)?.as_deref() == Some(folder.id.as_str()) {
        folder_paths.remove(old_path)?;
    }
    folder_paths.insert(folder.path.as_str(), folder.id.as_str())?;
    Ok(())
}

/// Rewrite every file whose logical path lies under `old_prefix`.
fn rebase_file_paths(
    write_txn: &redb::WriteTransaction,
    old_prefix: &str,
    new_prefix: &str,
) -> Result<usize, DatabaseError> {
    let mut paths_table = write_txn.open_table(FILE_PATHS)?;
    let mut files = write_txn.open_table(FILES)?;

    let mut affected: Vec<(String, String)> = Vec::new();
    for entry in paths_table.range(old_prefix..)? {
        let (path, file_id) = entry?;
        let path = path.value();
        if !path.starts_with(old_prefix) {
            break;
        }
        if path != old_prefix && paths::is_within(path, old_prefix) {
            affected.push((path.to_string(), file_id.value().to_string()));
        }
    }

    for (old_path, file_id) in &affected {
        let new_path = match paths::rebase(old_path, old_prefix, new_prefix) {
            Some(p) => p,
            None => continue,
        };
        if let Some(holder) = lookup(&paths_table, &new_path)? {
            if &holder != file_id {
                return Err(DatabaseError::UniqueViolation {
                    index: UniqueIndex::FilePath,
                    value: new_path,
                    existing_id: holder,
                });
            }
        }

        paths_table.remove(old_path.as_str())?;
        paths_table.insert(new_path.as_str(), file_id.as_str())?;

        let existing: Option<FileRecord> = load(&files, file_id)?;
        if let Some(mut file) = existing {
            file.path = new_path;
            file.updated_at = chrono::Utc::now();
            let data = rmp_serde::to_vec_named(&file)?;
            files.insert(file_id.as_str(), data.as_slice())?;
        }
    }

    Ok(affected.len())
}
