//! Uploaded asset storage
//!
//! Records store a URL-like reference to each upload (`/uploads/resume-17.pdf`).
//! Only the final path segment is meaningful: it names a file directly under
//! the asset root. Deletion is idempotent because a record may be purged more
//! than once across retries.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::Result;

/// Outcome of deleting one asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetDeletion {
    /// File existed and was removed
    Removed,
    /// File was not there (already reclaimed, or never written)
    AlreadyGone,
    /// Reference did not name a file under the asset root
    Skipped,
    /// Removal failed for another reason; logged, never raised
    Failed,
}

/// Filesystem view over the uploads directory
#[derive(Debug, Clone)]
pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Asset root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a stored reference to the file it names. Pure; no I/O.
    ///
    /// Returns `None` when the reference has no usable file name.
    pub fn resolve(&self, reference: &str) -> Option<PathBuf> {
        let name = reference.trim().rsplit(['/', '\\']).next()?;
        if name.is_empty() || name == "." || name == ".." {
            return None;
        }
        Some(self.root.join(name))
    }

    /// Remove the file behind `reference`, tolerating its absence
    pub fn delete(&self, reference: &str) -> AssetDeletion {
        let Some(path) = self.resolve(reference) else {
            debug!("Asset reference {:?} names no file, skipping", reference);
            return AssetDeletion::Skipped;
        };

        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Deleted asset {}", path.display());
                AssetDeletion::Removed
            }
            Err(e) if e.kind() == ErrorKind::NotFound => AssetDeletion::AlreadyGone,
            Err(e) => {
                warn!("Failed to delete asset {}: {}", path.display(), e);
                AssetDeletion::Failed
            }
        }
    }

    /// Relative paths of every file in the asset tree, sorted
    ///
    /// A missing root is an empty store.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&self.root) {
                files.push(relative.to_path_buf());
            }
        }
        files.sort();
        Ok(files)
    }
}
