use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::paths;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub folders: FolderConfig,
    /// Maximum upload size in bytes
    pub max_upload_size: u64,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding the metadata database
    pub data_dir: PathBuf,
    /// Root under which artifacts are stored; absolute after `load()`
    pub storage_root: PathBuf,
    pub thumbnail_dir: PathBuf,
    /// zstd level, 1..=22
    pub compression_level: i32,
    /// Move deleted artifacts to `<storage_root>/.trash` instead of unlinking
    pub use_recycle_bin: bool,
}

#[derive(Debug, Clone)]
pub struct FolderConfig {
    /// Name of the protected fallback folder
    pub default_folder_name: String,
    pub cache_ttl: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            storage_root: PathBuf::from("./files"),
            thumbnail_dir: PathBuf::from("./data/thumbnails"),
            compression_level: 3,
            use_recycle_bin: true,
        }
    }
}

impl Default for FolderConfig {
    fn default() -> Self {
        Self {
            default_folder_name: "Default".to_string(),
            cache_ttl: Duration::from_secs(30),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            folders: FolderConfig::default(),
            max_upload_size: 50 * 1024 * 1024, // 50MB
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.storage.data_dir);

        let storage_root = std::env::var("STORAGE_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.storage.storage_root);

        let thumbnail_dir = std::env::var("THUMBNAIL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("thumbnails"));

        let compression_level = match std::env::var("COMPRESSION_LEVEL") {
            Ok(raw) => raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("COMPRESSION_LEVEL '{raw}' is not a number"))
            })?,
            Err(_) => defaults.storage.compression_level,
        };

        let use_recycle_bin = std::env::var("USE_RECYCLE_BIN")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(defaults.storage.use_recycle_bin);

        let default_folder_name = std::env::var("DEFAULT_FOLDER_NAME")
            .unwrap_or(defaults.folders.default_folder_name);

        let cache_ttl = std::env::var("FOLDER_CACHE_TTL")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.folders.cache_ttl);

        let max_upload_size = std::env::var("MAX_UPLOAD_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_upload_size);

        let mut config = Config {
            storage: StorageConfig {
                data_dir,
                storage_root,
                thumbnail_dir,
                compression_level,
                use_recycle_bin,
            },
            folders: FolderConfig {
                default_folder_name,
                cache_ttl,
            },
            max_upload_size,
        };

        config.absolutize_storage_root()?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration rooted in `base`, for tests and embedding.
    pub fn in_dir<P: Into<PathBuf>>(base: P) -> Self {
        let base = base.into();
        Config {
            storage: StorageConfig {
                data_dir: base.join("data"),
                storage_root: base.join("files"),
                thumbnail_dir: base.join("thumbnails"),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn absolutize_storage_root(&mut self) -> Result<(), ConfigError> {
        if self.storage.storage_root.is_absolute() {
            return Ok(());
        }
        let cwd = std::env::current_dir().map_err(|e| {
            ConfigError::ValidationError(format!("cannot resolve STORAGE_ROOT: {e}"))
        })?;
        self.storage.storage_root = cwd.join(&self.storage.storage_root);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.storage_root.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "STORAGE_ROOT cannot be empty".to_string(),
            ));
        }

        paths::validate_name(&self.folders.default_folder_name).map_err(|e| {
            ConfigError::ValidationError(format!("DEFAULT_FOLDER_NAME: {e}"))
        })?;

        if !(1..=22).contains(&self.storage.compression_level) {
            return Err(ConfigError::ValidationError(format!(
                "COMPRESSION_LEVEL must be between 1 and 22, got {}",
                self.storage.compression_level
            )));
        }

        if self.max_upload_size == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_UPLOAD_SIZE must be greater than zero".to_string(),
            ));
        }

        if !self.storage.use_recycle_bin {
            tracing::warn!("Recycle bin disabled; deleted artifacts are unlinked immediately");
        }

        Ok(())
    }
}
