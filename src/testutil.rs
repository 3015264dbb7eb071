//! Shared test helpers for file-vault unit tests.

use crate::config::Config;
use crate::FileService;

/// Create a FileService with its database, storage root and thumbnail cache
/// inside a temporary directory.
pub fn test_service(temp_dir: &tempfile::TempDir) -> FileService {
    let mut config = Config::in_dir(temp_dir.path());
    config.max_upload_size = 10 * 1024 * 1024; // 10MB for tests
    config.storage.use_recycle_bin = false;

    FileService::open(config).expect("Failed to open test service")
}
