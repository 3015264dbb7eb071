//! Locates the physical artifact behind a stored logical path.
//!
//! Stored paths and on-disk artifacts drift apart over time: historical
//! uncompressed files, relocated storage roots, and relative paths recorded
//! by older writers. Resolution is centralized here and every candidate is
//! logged so that drift shows up in the logs instead of hiding behind a hit.

use std::path::{Path, PathBuf};

use crate::blob::{is_compressed, with_suffix};

#[derive(Debug, Clone)]
pub struct PathResolver {
    storage_root: PathBuf,
    working_dir: Option<PathBuf>,
}

impl PathResolver {
    pub fn new<P: AsRef<Path>>(storage_root: P) -> Self {
        Self {
            storage_root: storage_root.as_ref().to_path_buf(),
            working_dir: std::env::current_dir().ok(),
        }
    }

    /// Override the working directory used for the last fallback step.
    pub fn with_working_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Ordered candidate list for a stored path.
    ///
    /// Suffixed variants are only generated when the record is flagged as
    /// compressed; the plain variant always comes first so that historical
    /// uncompressed artifacts keep resolving.
    pub fn candidates(&self, stored: &str, compressed: bool) -> Vec<PathBuf> {
        let stored_path = PathBuf::from(stored);
        let variants = |base: PathBuf| -> Vec<PathBuf> {
            if compressed && !is_compressed(&base) {
                let packed = with_suffix(&base);
                vec![base, packed]
            } else {
                vec![base]
            }
        };

        let mut out = variants(stored_path.clone());
        if !stored_path.is_absolute() {
            out.extend(variants(self.storage_root.join(&stored_path)));
            if let Some(cwd) = &self.working_dir {
                out.extend(variants(cwd.join(&stored_path)));
            }
        }
        out.dedup();
        out
    }

    /// First candidate that exists on disk.
    pub async fn resolve(&self, stored: &str, compressed: bool) -> Option<PathBuf> {
        for candidate in self.candidates(stored, compressed) {
            let exists = tokio::fs::try_exists(&candidate).await.unwrap_or(false);
            tracing::debug!(
                stored,
                candidate = %candidate.display(),
                exists,
                "Path resolution candidate"
            );
            if exists {
                return Some(candidate);
            }
        }
        tracing::warn!(
            stored,
            compressed,
            storage_root = %self.storage_root.display(),
            "No physical artifact found for stored path"
        );
        None
    }
}
