use redb::TableDefinition;

/// File records: uuid -> FileRecord (msgpack)
pub const FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("files");

/// Logical path index: path -> uuid (unique)
pub const FILE_PATHS: TableDefinition<&str, &str> = TableDefinition::new("file_paths");

/// Content hash index: hex sha256 -> uuid (unique, backs deduplication)
pub const FILE_HASHES: TableDefinition<&str, &str> = TableDefinition::new("file_hashes");

/// Ingest source index: normalized source path -> uuid
pub const FILE_SOURCES: TableDefinition<&str, &str> = TableDefinition::new("file_sources");

/// Folder membership: folder uuid -> msgpack Vec of file uuids
pub const FOLDER_FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("folder_files");

/// Folder records: uuid -> FolderRecord (msgpack)
pub const FOLDERS: TableDefinition<&str, &[u8]> = TableDefinition::new("folders");

/// Materialized path index: path -> uuid (unique)
pub const FOLDER_PATHS: TableDefinition<&str, &str> = TableDefinition::new("folder_paths");

/// Hierarchy: parent uuid (or ROOT_KEY) -> msgpack Vec of child folder uuids
pub const FOLDER_CHILDREN: TableDefinition<&str, &[u8]> = TableDefinition::new("folder_children");

/// Key under which root-level folders are listed in FOLDER_CHILDREN
pub const ROOT_KEY: &str = "";

pub fn parent_key(parent_id: Option<&str>) -> &str {
    parent_id.unwrap_or(ROOT_KEY)
}
