use std::collections::BTreeSet;

use redb::{ReadableTable, TableDefinition, WriteTransaction};

use super::db::{id_list, id_list_add, id_list_remove, load, lookup, Database, DatabaseError, UniqueIndex};
use super::models::{FileRecord, FileType};
use super::tables::*;

impl Database {
    // ========================================================================
    // File operations
    // ========================================================================

    /// Insert a new file record with its path, hash, source and folder
    /// indexes. Fails with `UniqueViolation` when the hash or the logical
    /// path is already recorded; the check and the insert share one write
    /// transaction, so two racing uploads of the same content cannot both
    /// succeed.
    pub fn insert_file(&self, file: &FileRecord) -> Result<(), DatabaseError> {
        debug_assert!(!file.id.is_empty(), "file id must not be empty");
        debug_assert!(!file.path.is_empty(), "file path must not be empty");

        let write_txn = self.begin_write()?;
        {
            let mut hashes = write_txn.open_table(FILE_HASHES)?;
            if let Some(existing_id) = lookup(&hashes, &file.content_hash)? {
                return Err(DatabaseError::UniqueViolation {
                    index: UniqueIndex::FileHash,
                    value: file.content_hash.clone(),
                    existing_id,
                });
            }

            let mut paths = write_txn.open_table(FILE_PATHS)?;
            if let Some(existing_id) = lookup(&paths, &file.path)? {
                return Err(DatabaseError::UniqueViolation {
                    index: UniqueIndex::FilePath,
                    value: file.path.clone(),
                    existing_id,
                });
            }

            if let Some(ref folder_id) = file.folder_id {
                let folders = write_txn.open_table(FOLDERS)?;
                if folders.get(folder_id.as_str())?.is_none() {
                    return Err(DatabaseError::MissingReference(format!(
                        "folder {folder_id}"
                    )));
                }
                let mut folder_files = write_txn.open_table(FOLDER_FILES)?;
                id_list_add(&mut folder_files, folder_id, &file.id)?;
            }

            let mut table = write_txn.open_table(FILES)?;
            let data = rmp_serde::to_vec_named(file)?;
            table.insert(file.id.as_str(), data.as_slice())?;

            hashes.insert(file.content_hash.as_str(), file.id.as_str())?;
            paths.insert(file.path.as_str(), file.id.as_str())?;

            if let Some(ref source) = file.source_path {
                let mut sources = write_txn.open_table(FILE_SOURCES)?;
                sources.insert(source.as_str(), file.id.as_str())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get a file by its UUID
    pub fn get_file(&self, id: &str) -> Result<Option<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;
        load(&table, id)
    }

    /// Get a file by its logical path
    pub fn get_file_by_path(&self, path: &str) -> Result<Option<FileRecord>, DatabaseError> {
        self.get_file_via(FILE_PATHS, path)
    }

    /// Get a file by its content hash
    pub fn get_file_by_hash(&self, hash: &str) -> Result<Option<FileRecord>, DatabaseError> {
        self.get_file_via(FILE_HASHES, hash)
    }

    /// Get a file by the location it was ingested from
    pub fn get_file_by_source(&self, source: &str) -> Result<Option<FileRecord>, DatabaseError> {
        self.get_file_via(FILE_SOURCES, source)
    }

    fn get_file_via(
        &self,
        index: TableDefinition<'static, &'static str, &'static str>,
        key: &str,
    ) -> Result<Option<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let index_table = read_txn.open_table(index)?;

        let id = match lookup(&index_table, key)? {
            Some(id) => id,
            None => return Ok(None),
        };

        let files_table = read_txn.open_table(FILES)?;
        load(&files_table, &id)
    }

    /// Get all files in a folder
    pub fn get_files_in_folder(&self, folder_id: &str) -> Result<Vec<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let folder_files = read_txn.open_table(FOLDER_FILES)?;
        let files_table = read_txn.open_table(FILES)?;

        let mut files = Vec::new();
        for file_id in id_list(&folder_files, folder_id)? {
            if let Some(file) = load(&files_table, &file_id)? {
                files.push(file);
            }
        }
        Ok(files)
    }

    /// Count files in a folder without decoding them
    pub fn count_files_in_folder(&self, folder_id: &str) -> Result<usize, DatabaseError> {
        let read_txn = self.begin_read()?;
        let folder_files = read_txn.open_table(FOLDER_FILES)?;
        Ok(id_list(&folder_files, folder_id)?.len())
    }

    /// Get all files
    pub fn get_all_files(&self) -> Result<Vec<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;

        let mut files = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let file: FileRecord = rmp_serde::from_slice(value.value())?;
            files.push(file);
        }

        Ok(files)
    }

    /// List files with optional folder and file_type filters
    pub fn list_files(
        &self,
        folder_id: Option<&str>,
        file_type: Option<FileType>,
    ) -> Result<Vec<FileRecord>, DatabaseError> {
        let all = match folder_id {
            Some(fid) => self.get_files_in_folder(fid)?,
            None => self.get_all_files()?,
        };

        Ok(match file_type {
            Some(ft) => all.into_iter().filter(|f| f.file_type == ft).collect(),
            None => all,
        })
    }

    /// Move a file record to a new logical path and display name
    pub fn update_file_location(
        &self,
        id: &str,
        new_path: &str,
        new_name: &str,
    ) -> Result<Option<FileRecord>, DatabaseError> {
        let write_txn = self.begin_write()?;

        let updated = {
            let mut table = write_txn.open_table(FILES)?;
            let existing: Option<FileRecord> = load(&table, id)?;

            match existing {
                Some(mut file) => {
                    let mut paths = write_txn.open_table(FILE_PATHS)?;
                    if let Some(holder) = lookup(&paths, new_path)? {
                        if holder != id {
                            return Err(DatabaseError::UniqueViolation {
                                index: UniqueIndex::FilePath,
                                value: new_path.to_string(),
                                existing_id: holder,
                            });
                        }
                    }
                    paths.remove(file.path.as_str())?;
                    paths.insert(new_path, id)?;

                    let (mime_type, file_type) = FileType::guess(new_name);
                    file.path = new_path.to_string();
                    file.original_name = new_name.to_string();
                    file.mime_type = mime_type;
                    file.file_type = file_type;
                    file.updated_at = chrono::Utc::now();

                    let data = rmp_serde::to_vec_named(&file)?;
                    table.insert(id, data.as_slice())?;
                    Some(file)
                }
                None => None,
            }
        };

        write_txn.commit()?;
        Ok(updated)
    }

    /// Replace a file's tag set
    pub fn set_file_tags(
        &self,
        id: &str,
        tags: &BTreeSet<String>,
    ) -> Result<Option<FileRecord>, DatabaseError> {
        let write_txn = self.begin_write()?;

        let updated = {
            let mut table = write_txn.open_table(FILES)?;
            let existing: Option<FileRecord> = load(&table, id)?;
            match existing {
                Some(mut file) => {
                    file.tags = tags.clone();
                    file.updated_at = chrono::Utc::now();
                    let data = rmp_serde::to_vec_named(&file)?;
                    table.insert(id, data.as_slice())?;
                    Some(file)
                }
                None => None,
            }
        };

        write_txn.commit()?;
        Ok(updated)
    }

    /// Delete a file record and clean up every index. Returns the removed
    /// record so the caller can discard its artifact.
    pub fn delete_file(&self, id: &str) -> Result<Option<FileRecord>, DatabaseError> {
        let write_txn = self.begin_write()?;
        let removed = remove_file_in(&write_txn, id)?;
        write_txn.commit()?;
        Ok(removed)
    }
}

/// Remove a file and its index entries inside an open write transaction.
/// The caller must not hold any of the file tables open.
pub(super) fn remove_file_in(
    write_txn: &WriteTransaction,
    id: &str,
) -> Result<Option<FileRecord>, DatabaseError> {
    let mut table = write_txn.open_table(FILES)?;
    let file: FileRecord = match load(&table, id)? {
        Some(file) => file,
        None => return Ok(None),
    };
    table.remove(id)?;

    let mut paths = write_txn.open_table(FILE_PATHS)?;
    paths.remove(file.path.as_str())?;

    let mut hashes = write_txn.open_table(FILE_HASHES)?;
    if lookup(&hashes, &file.content_hash)?.as_deref() == Some(id) {
        hashes.remove(file.content_hash.as_str())?;
    }

    if let Some(ref source) = file.source_path {
        let mut sources = write_txn.open_table(FILE_SOURCES)?;
        if lookup(&sources, source)?.as_deref() == Some(id) {
            sources.remove(source.as_str())?;
        }
    }

    if let Some(ref folder_id) = file.folder_id {
        let mut folder_files = write_txn.open_table(FOLDER_FILES)?;
        id_list_remove(&mut folder_files, folder_id, id)?;
    }

    Ok(Some(file))
}
