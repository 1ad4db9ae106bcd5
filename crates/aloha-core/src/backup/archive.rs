//! Snapshot archive writer

use std::fs::File;
use std::io::{self, Seek, Write};
use std::path::{Component, Path};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{DB_ENTRY, UPLOADS_PREFIX};
use crate::config::StorageConfig;
use crate::db::DatabaseHandle;
use crate::error::{Error, Result};

/// What ended up in an archive
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotSummary {
    /// Whether the database entry was written
    pub database_included: bool,
    /// Number of asset files written under `uploads/`
    pub asset_count: usize,
    /// Uncompressed bytes across all entries
    pub total_bytes: u64,
}

/// Builds snapshot archives of the database and the asset tree
pub struct SnapshotArchiver {
    config: StorageConfig,
    handle: DatabaseHandle,
}

impl SnapshotArchiver {
    pub fn new(config: StorageConfig, handle: DatabaseHandle) -> Self {
        Self { config, handle }
    }

    /// Write a complete archive to `writer`
    ///
    /// A missing database file or a missing uploads directory is not an
    /// error: the archive simply lacks that part.
    pub fn create_snapshot<W: Write + Seek>(&self, writer: W) -> Result<SnapshotSummary> {
        let mut zip = ZipWriter::new(writer);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut summary = SnapshotSummary::default();

        if let Some(bytes) = self.add_database(&mut zip, options)? {
            summary.database_included = true;
            summary.total_bytes += bytes;
        }

        let (asset_count, asset_bytes) = self.add_assets(&mut zip, options)?;
        summary.asset_count = asset_count;
        summary.total_bytes += asset_bytes;

        zip.finish()?;

        info!(
            "Snapshot archive written: database={}, assets={}, bytes={}",
            summary.database_included, summary.asset_count, summary.total_bytes
        );
        Ok(summary)
    }

    /// Write a complete archive to a new file at `path`
    pub fn write_to_file(&self, path: &Path) -> Result<SnapshotSummary> {
        let file = File::create(path)?;
        let summary = self.create_snapshot(file)?;
        Ok(summary)
    }

    /// Add the database entry. Returns the number of bytes written, if any.
    fn add_database<W: Write + Seek>(
        &self,
        zip: &mut ZipWriter<W>,
        options: SimpleFileOptions,
    ) -> Result<Option<u64>> {
        match self.handle.get() {
            Ok(db) => {
                // Point-in-time copy, including whatever is still in the WAL
                let staging = tempfile::tempdir()?;
                let copy_path = staging.path().join(DB_ENTRY);
                db.snapshot_to(&copy_path)?;
                let bytes = copy_entry(zip, DB_ENTRY, &copy_path, options)?;
                Ok(Some(bytes))
            }
            Err(Error::DatabaseClosed) => {
                let db_path = &self.config.db_path;
                if !db_path.is_file() {
                    debug!("No database file at {}, archive will have no database entry", db_path.display());
                    return Ok(None);
                }
                warn!("Database handle is closed, archiving the raw file at {}", db_path.display());
                let bytes = copy_entry(zip, DB_ENTRY, db_path, options)?;
                Ok(Some(bytes))
            }
            Err(e) => Err(e),
        }
    }

    /// Add every file under the asset root. Returns (files, bytes).
    fn add_assets<W: Write + Seek>(
        &self,
        zip: &mut ZipWriter<W>,
        options: SimpleFileOptions,
    ) -> Result<(usize, u64)> {
        let root = &self.config.uploads_dir;
        if !root.is_dir() {
            debug!("No uploads directory at {}, archive will have no assets", root.display());
            return Ok((0, 0));
        }

        let mut count = 0;
        let mut bytes = 0;

        for entry in WalkDir::new(root).follow_links(false).min_depth(1).sort_by_file_name() {
            let entry = entry?;
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let Some(relative) = zip_relative_name(relative) else {
                warn!("Skipping asset with unrepresentable path: {}", entry.path().display());
                continue;
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                zip.add_directory(format!("{}{}/", UPLOADS_PREFIX, relative), options)?;
            } else if file_type.is_file() {
                let name = format!("{}{}", UPLOADS_PREFIX, relative);
                bytes += copy_entry(zip, &name, entry.path(), options)?;
                count += 1;
            } else {
                debug!("Skipping non-regular asset entry: {}", entry.path().display());
            }
        }

        Ok((count, bytes))
    }
}

/// Stream one file into the archive under `name`
fn copy_entry<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    source: &Path,
    options: SimpleFileOptions,
) -> Result<u64> {
    let mut file = File::open(source)?;
    zip.start_file(name, options)?;
    let bytes = io::copy(&mut file, zip)?;
    Ok(bytes)
}

/// Forward-slash path for an archive entry, or `None` for non-UTF-8 names
fn zip_relative_name(relative: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::{Cursor, Read};
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn setup() -> (TempDir, StorageConfig, DatabaseHandle) {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig::under(dir.path());
        let handle = DatabaseHandle::open(&config.db_path).unwrap();
        (dir, config, handle)
    }

    fn entry_names(bytes: Vec<u8>) -> Vec<String> {
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<String> = archive.file_names().map(String::from).collect();
        names.sort();
        names
    }

    #[test]
    fn test_snapshot_contains_database_and_assets() {
        let (_dir, config, handle) = setup();
        handle.get().unwrap().log_audit("admin", "SEED", None).unwrap();
        fs::create_dir_all(config.uploads_dir.join("ids")).unwrap();
        fs::write(config.uploads_dir.join("resume-1.pdf"), b"resume").unwrap();
        fs::write(config.uploads_dir.join("ids").join("id-1.png"), b"png").unwrap();

        let archiver = SnapshotArchiver::new(config, handle);
        let mut buffer = Cursor::new(Vec::new());
        let summary = archiver.create_snapshot(&mut buffer).unwrap();

        assert!(summary.database_included);
        assert_eq!(summary.asset_count, 2);
        assert_eq!(
            entry_names(buffer.into_inner()),
            vec![
                "aloha_database.db".to_string(),
                "uploads/ids/".to_string(),
                "uploads/ids/id-1.png".to_string(),
                "uploads/resume-1.pdf".to_string(),
            ]
        );
    }

    #[test]
    fn test_snapshot_database_entry_is_sqlite() {
        let (_dir, config, handle) = setup();
        let archiver = SnapshotArchiver::new(config, handle);
        let mut buffer = Cursor::new(Vec::new());
        archiver.create_snapshot(&mut buffer).unwrap();

        let mut archive = ZipArchive::new(Cursor::new(buffer.into_inner())).unwrap();
        let mut entry = archive.by_name(DB_ENTRY).unwrap();
        let mut header = [0u8; 16];
        entry.read_exact(&mut header).unwrap();
        assert_eq!(&header, b"SQLite format 3\0");
    }

    #[test]
    fn test_snapshot_with_closed_handle_and_no_files() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig::under(dir.path().join("empty"));
        let handle = DatabaseHandle::open(dir.path().join("elsewhere.db")).unwrap();
        handle.close();

        let archiver = SnapshotArchiver::new(config, handle);
        let mut buffer = Cursor::new(Vec::new());
        let summary = archiver.create_snapshot(&mut buffer).unwrap();

        assert_eq!(summary, SnapshotSummary::default());
        assert!(entry_names(buffer.into_inner()).is_empty());
    }

    #[test]
    fn test_zip_relative_name() {
        assert_eq!(
            zip_relative_name(Path::new("a").join("b.pdf").as_path()),
            Some("a/b.pdf".to_string())
        );
        assert_eq!(zip_relative_name(Path::new("")), None);
        assert_eq!(zip_relative_name(Path::new("../x")), None);
    }
}
