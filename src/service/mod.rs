//! Caller-facing storage engine: upload pipeline, file and folder operations,
//! and batch ingest. An outer HTTP layer maps [`ServiceError::kind`] to
//! status codes.

mod error;
mod files;
mod folders;
mod ingest;
mod upload;

pub use error::{ErrorKind, ServiceError};
pub use files::Download;
pub use ingest::{IngestFailure, IngestReport};
pub use upload::UploadOutcome;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::blob::{BlobStore, LocalBlobStore};
use crate::cache::FolderCache;
use crate::config::Config;
use crate::context::RequestContext;
use crate::folders::FolderTree;
use crate::metadata::{MetadataExtractor, MimeMetadataExtractor};
use crate::paths;
use crate::resolver::PathResolver;
use crate::storage::models::FileRecord;
use crate::storage::Database;
use crate::thumbnail::{ImageThumbnailer, ThumbnailCache, ThumbnailGenerator};

pub struct FileService {
    config: Config,
    db: Database,
    blobs: Arc<dyn BlobStore>,
    folders: FolderTree,
    resolver: PathResolver,
    thumbnails: ThumbnailCache,
    metadata: Arc<dyn MetadataExtractor>,
}

impl FileService {
    /// Open the database and local blob store described by `config`, with
    /// the built-in metadata and thumbnail collaborators.
    pub fn open(config: Config) -> Result<Self, ServiceError> {
        let db = Database::open(&config.storage.data_dir)?;
        let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(
            &config.storage.storage_root,
            config.storage.compression_level,
        )?);
        Self::new(
            config,
            db,
            blobs,
            Arc::new(MimeMetadataExtractor),
            Arc::new(ImageThumbnailer),
        )
    }

    pub fn new(
        config: Config,
        db: Database,
        blobs: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataExtractor>,
        generator: Arc<dyn ThumbnailGenerator>,
    ) -> Result<Self, ServiceError> {
        let cache = Arc::new(FolderCache::new(config.folders.cache_ttl));
        let folders = FolderTree::new(
            db.clone(),
            cache,
            config.folders.default_folder_name.clone(),
        );
        let resolver = PathResolver::new(&config.storage.storage_root);
        let thumbnails =
            ThumbnailCache::new(&config.storage.thumbnail_dir, Arc::clone(&blobs), generator)?;

        Ok(Self {
            config,
            db,
            blobs,
            folders,
            resolver,
            thumbnails,
            metadata,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn folder_tree(&self) -> &FolderTree {
        &self.folders
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    fn storage_root(&self) -> &Path {
        &self.config.storage.storage_root
    }

    /// Physical location for a logical path: absolute paths as-is, relative
    /// ones under the storage root.
    fn physical_location(&self, logical: &str) -> PathBuf {
        let path = Path::new(logical);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.storage_root().join(path)
        }
    }

    /// Logical path for a physical artifact: root-relative when it lies
    /// under the storage root, with the compression suffix stripped.
    fn logical_location(&self, physical: &Path) -> String {
        let plain = crate::blob::logical_path(physical);
        let relative = plain.strip_prefix(self.storage_root()).unwrap_or(&plain);
        paths::normalize(&relative.to_string_lossy())
    }

    /// Resolve the artifact behind a record, failing with the full
    /// candidate list when nothing exists.
    async fn locate(&self, file: &FileRecord) -> Result<PathBuf, ServiceError> {
        match self.resolver.resolve(&file.path, file.compressed).await {
            Some(physical) => Ok(physical),
            None => Err(ServiceError::NotFound {
                resource: format!("artifact for file {} at '{}'", file.id, file.path),
                candidates: self.resolver.candidates(&file.path, file.compressed),
            }),
        }
    }

    fn ensure_active(ctx: &RequestContext) -> Result<(), ServiceError> {
        if ctx.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }
        Ok(())
    }

    fn require_file(&self, id: &str) -> Result<FileRecord, ServiceError> {
        self.db
            .get_file(id)?
            .ok_or_else(|| ServiceError::not_found(format!("file {id}")))
    }
}
