use std::fmt;
use std::path::Path;
use std::sync::Arc;

use redb::{Database as RedbDatabase, ReadTransaction, ReadableTable, Table, WriteTransaction};
use serde::de::DeserializeOwned;
use thiserror::Error;

use super::tables::*;

/// Indexes that carry a uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueIndex {
    FileHash,
    FilePath,
    FolderPath,
    FolderSiblingName,
}

impl fmt::Display for UniqueIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UniqueIndex::FileHash => "file content hash",
            UniqueIndex::FilePath => "file path",
            UniqueIndex::FolderPath => "folder path",
            UniqueIndex::FolderSiblingName => "sibling folder name",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Commit error: {0}")]
    Commit(Box<redb::CommitError>),
    #[error("Constraint violated: {0}")]
    Constraint(String),
    #[error("Database error: {0}")]
    Redb(Box<redb::Error>),
    #[error("Database error: {0}")]
    RedbDatabase(Box<redb::DatabaseError>),
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Missing reference: {0}")]
    MissingReference(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),
    #[error("Storage error: {0}")]
    Storage(Box<redb::StorageError>),
    #[error("Table error: {0}")]
    Table(Box<redb::TableError>),
    #[error("Transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("Unique constraint on {index} violated: '{value}' is held by {existing_id}")]
    UniqueViolation {
        index: UniqueIndex,
        value: String,
        existing_id: String,
    },
}

impl From<redb::CommitError> for DatabaseError {
    fn from(e: redb::CommitError) -> Self {
        DatabaseError::Commit(Box::new(e))
    }
}

impl From<redb::DatabaseError> for DatabaseError {
    fn from(e: redb::DatabaseError) -> Self {
        DatabaseError::RedbDatabase(Box::new(e))
    }
}

impl From<redb::Error> for DatabaseError {
    fn from(e: redb::Error) -> Self {
        DatabaseError::Redb(Box::new(e))
    }
}

impl From<redb::StorageError> for DatabaseError {
    fn from(e: redb::StorageError) -> Self {
        DatabaseError::Storage(Box::new(e))
    }
}

impl From<redb::TableError> for DatabaseError {
    fn from(e: redb::TableError) -> Self {
        DatabaseError::Table(Box::new(e))
    }
}

impl From<redb::TransactionError> for DatabaseError {
    fn from(e: redb::TransactionError) -> Self {
        DatabaseError::Transaction(Box::new(e))
    }
}

/// Metadata store for files and folders. Each public method is one unit of
/// work: it opens a redb transaction and commits it before returning, so a
/// failed call leaves no partial writes behind.
pub struct Database {
    db: Arc<RedbDatabase>,
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        let db_path = data_dir.as_ref().join("file-vault.redb");
        let db = Arc::new(RedbDatabase::create(db_path)?);

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(FILES)?;
            let _ = write_txn.open_table(FILE_PATHS)?;
            let _ = write_txn.open_table(FILE_HASHES)?;
            let _ = write_txn.open_table(FILE_SOURCES)?;
            let _ = write_txn.open_table(FOLDER_FILES)?;
            let _ = write_txn.open_table(FOLDERS)?;
            let _ = write_txn.open_table(FOLDER_PATHS)?;
            let _ = write_txn.open_table(FOLDER_CHILDREN)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Begin a read transaction
    pub fn begin_read(&self) -> Result<ReadTransaction, DatabaseError> {
        Ok(self.db.begin_read()?)
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> Result<WriteTransaction, DatabaseError> {
        Ok(self.db.begin_write()?)
    }
}

// ============================================================================
// Table helpers shared by files.rs and folders.rs
// ============================================================================

/// Load and decode a msgpack record.
pub(super) fn load<T, R>(table: &R, key: &str) -> Result<Option<T>, DatabaseError>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key)? {
        Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
        None => Ok(None),
    }
}

/// Resolve a string index entry.
pub(super) fn lookup<R>(table: &R, key: &str) -> Result<Option<String>, DatabaseError>
where
    R: ReadableTable<&'static str, &'static str>,
{
    Ok(table.get(key)?.map(|v| v.value().to_string()))
}

/// Read an id list index entry; a missing key is an empty list.
pub(super) fn id_list<R>(table: &R, key: &str) -> Result<Vec<String>, DatabaseError>
where
    R: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key)? {
        Some(data) => Ok(rmp_serde::from_slice(data.value())?),
        None => Ok(Vec::new()),
    }
}

pub(super) fn id_list_add(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    key: &str,
    id: &str,
) -> Result<(), DatabaseError> {
    let mut ids = id_list(&*table, key)?;
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
        let data = rmp_serde::to_vec_named(&ids)?;
        table.insert(key, data.as_slice())?;
    }
    Ok(())
}

pub(super) fn id_list_remove(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    key: &str,
    id: &str,
) -> Result<(), DatabaseError> {
    let mut ids = id_list(&*table, key)?;
    let before = ids.len();
    ids.retain(|existing| existing != id);
    if ids.len() == before {
        return Ok(());
    }
    if ids.is_empty() {
        table.remove(key)?;
    } else {
        let data = rmp_serde::to_vec_named(&ids)?;
        table.insert(key, data.as_slice())?;
    }
    Ok(())
}
