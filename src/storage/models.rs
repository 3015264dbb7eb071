use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a file derived from its MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Audio,
    Binary,
    Document,
    Image,
    Video,
}

impl FileType {
    /// Derive a file type classification from a MIME type string.
    pub fn from_mime(mime_type: &str) -> Self {
        let primary = mime_type.split('/').next().unwrap_or("");
        match primary {
            "audio" => FileType::Audio,
            "image" => FileType::Image,
            "video" => FileType::Video,
            "text" | "application" => {
                let sub = mime_type.split('/').nth(1).unwrap_or("");
                match sub {
                    "pdf"
                    | "msword"
                    | "rtf"
                    | "csv"
                    | "vnd.openxmlformats-officedocument.wordprocessingml.document"
                    | "vnd.openxmlformats-officedocument.spreadsheetml.sheet"
                    | "vnd.ms-excel" => FileType::Document,
                    _ if primary == "text" => FileType::Document,
                    _ => FileType::Binary,
                }
            }
            _ => FileType::Binary,
        }
    }

    /// Guess MIME type and classification from a file name.
    pub fn guess(file_name: &str) -> (String, Self) {
        let mime = mime_guess::from_path(file_name)
            .first()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let file_type = Self::from_mime(&mime);
        (mime, file_type)
    }
}

/// Photo metadata supplied by the metadata extraction collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhotoMetadata {
    #[serde(default)]
    pub date_taken: Option<DateTime<Utc>>,
    #[serde(default)]
    pub camera_make: Option<String>,
    #[serde(default)]
    pub camera_model: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// A stored file. `path` is the logical (uncompressed-looking) path; the
/// artifact on disk may carry the compression suffix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub path: String,
    pub original_name: String,
    /// Hex SHA-256 of the original bytes
    pub content_hash: String,
    /// Size of the stored (possibly compressed) artifact
    pub byte_size: u64,
    pub compressed: bool,
    pub mime_type: String,
    pub file_type: FileType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub folder_id: Option<String>,
    /// Normalized location the bytes were ingested from
    #[serde(default)]
    pub source_path: Option<String>,
    #[serde(default)]
    pub photo: Option<PhotoMetadata>,
}

/// A folder with a materialized path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderRecord {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Protected folders can be neither renamed nor deleted
    #[serde(default)]
    pub protected: bool,
    pub created_at: DateTime<Utc>,
}

impl FolderRecord {
    pub fn new(name: &str, path: &str, parent_id: Option<&str>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            path: path.to_string(),
            parent_id: parent_id.map(|p| p.to_string()),
            protected: false,
            created_at: Utc::now(),
        }
    }
}

/// Outcome of a folder rename cascade.
#[derive(Debug, Clone)]
pub struct RenameCascade {
    pub folder: FolderRecord,
    pub old_path: String,
    pub folders_updated: usize,
    pub files_updated: usize,
}
