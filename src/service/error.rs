use std::path::PathBuf;

use thiserror::Error;

use crate::blob::BlobStoreError;
use crate::folders::DeleteReport;
use crate::hasher::HashError;
use crate::storage::{DatabaseError, UniqueIndex};
use crate::thumbnail::ThumbnailError;

/// Error categories an outer layer maps to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Protected,
    PartialFailure,
    Cancelled,
    Internal,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Path validation failed: {0}")]
    PathValidation(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Duplicate content: already stored at '{existing_path}'")]
    DuplicateContent {
        existing_id: String,
        existing_path: String,
    },
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Folder not empty: {0}")]
    FolderNotEmpty(String),

    #[error("Not found: {resource}{}", format_candidates(.candidates))]
    NotFound {
        resource: String,
        candidates: Vec<PathBuf>,
    },

    #[error("Protected: {0}")]
    Protected(String),

    #[error("Partial failure: {}", .0.summary())]
    PartialFailure(Box<DeleteReport>),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Blob store error: {0}")]
    Blob(BlobStoreError),
    #[error("Database error: {0}")]
    Database(DatabaseError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Thumbnail error: {0}")]
    Thumbnail(ThumbnailError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::PathValidation(_)
            | ServiceError::Validation(_)
            | ServiceError::InvalidOperation(_) => ErrorKind::Validation,
            ServiceError::DuplicateContent { .. }
            | ServiceError::Conflict(_)
            | ServiceError::FolderNotEmpty(_) => ErrorKind::Conflict,
            ServiceError::NotFound { .. } => ErrorKind::NotFound,
            ServiceError::Protected(_) => ErrorKind::Protected,
            ServiceError::PartialFailure(_) => ErrorKind::PartialFailure,
            ServiceError::Cancelled => ErrorKind::Cancelled,
            ServiceError::Blob(_)
            | ServiceError::Database(_)
            | ServiceError::Io(_)
            | ServiceError::Thumbnail(_) => ErrorKind::Internal,
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        ServiceError::NotFound {
            resource: resource.into(),
            candidates: Vec::new(),
        }
    }

    /// True for the duplicate-content conflict callers may treat as success.
    pub fn is_duplicate_content(&self) -> bool {
        matches!(self, ServiceError::DuplicateContent { .. })
    }
}

fn format_candidates(candidates: &[PathBuf]) -> String {
    if candidates.is_empty() {
        return String::new();
    }
    let tried: Vec<String> = candidates.iter().map(|c| c.display().to_string()).collect();
    format!(" (tried: {})", tried.join(", "))
}

impl From<DatabaseError> for ServiceError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::UniqueViolation {
                index: UniqueIndex::FolderSiblingName,
                value,
                ..
            } => ServiceError::Conflict(format!(
                "a folder named '{value}' already exists here"
            )),
            DatabaseError::UniqueViolation { index, value, .. } => {
                ServiceError::Conflict(format!("{index} '{value}' already exists"))
            }
            DatabaseError::MissingReference(what) => ServiceError::not_found(what),
            other => ServiceError::Database(other),
        }
    }
}

impl From<BlobStoreError> for ServiceError {
    fn from(e: BlobStoreError) -> Self {
        match e {
            BlobStoreError::NotFound(path) => ServiceError::NotFound {
                candidates: vec![PathBuf::from(&path)],
                resource: path,
            },
            BlobStoreError::AlreadyExists(path) => {
                ServiceError::Conflict(format!("target '{path}' already exists"))
            }
            BlobStoreError::Cancelled => ServiceError::Cancelled,
            other => ServiceError::Blob(other),
        }
    }
}

impl From<HashError> for ServiceError {
    fn from(e: HashError) -> Self {
        match e {
            HashError::Cancelled => ServiceError::Cancelled,
            HashError::Io(io) => ServiceError::Io(io),
        }
    }
}

impl From<ThumbnailError> for ServiceError {
    fn from(e: ThumbnailError) -> Self {
        match e {
            ThumbnailError::InvalidBounds(w, h) => {
                ServiceError::Validation(format!("thumbnail bounds {w}x{h} must be non-zero"))
            }
            ThumbnailError::Hash(e) => e.into(),
            ThumbnailError::Blob(e) => e.into(),
            ThumbnailError::Image(
                e @ (image::ImageError::Decoding(_) | image::ImageError::Unsupported(_)),
            ) => ServiceError::Validation(format!("artifact is not a readable image: {e}")),
            other => ServiceError::Thumbnail(other),
        }
    }
}
