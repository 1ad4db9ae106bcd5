//! Restore coordinator
//!
//! Swaps the persisted state (database file plus asset tree) for the contents
//! of an uploaded snapshot archive:
//!
//! ```text
//! Idle -> Validating -> Staging -> Quiescing -> Extracting -> Committed
//!            |             |           |             |
//!            +-------------+-----------+-------------+--> Aborted
//! ```
//!
//! Every entry is extracted into a staging directory beside the database
//! before the live handle is touched, so a bad archive never disturbs the
//! running system. Only one restore runs at a time.
//!
//! Assets are merged with overwrite: archived files replace same-named files
//! in the asset root, and files absent from the archive are left alone.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use zip::ZipArchive;

use super::{DB_ENTRY, UPLOADS_PREFIX};
use crate::config::StorageConfig;
use crate::db::DatabaseHandle;
use crate::error::{Error, Result};

/// First bytes of every SQLite database file
const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

/// Unix file-type bits for a symbolic link
const S_IFLNK: u32 = 0o120000;

/// Where a restore currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreState {
    Idle,
    Validating,
    Staging,
    Quiescing,
    Extracting,
    /// State swapped in; with [`RestartPolicy::Exit`] the process is about to exit
    Committed,
    /// Last attempt failed; a new attempt may start
    Aborted,
}

impl RestoreState {
    /// Whether a new restore may begin from this state
    pub fn accepts_restore(&self) -> bool {
        matches!(self, Self::Idle | Self::Aborted)
    }
}

/// What happens to the process after a committed restore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Exit so a process supervisor restarts with a fresh handle.
    /// Requires a supervisor that restarts on exit.
    #[default]
    Exit,
    /// Reopen the database handle on the restored file without exiting
    ReopenInPlace,
}

impl RestartPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exit => "exit",
            Self::ReopenInPlace => "reopen",
        }
    }
}

impl FromStr for RestartPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exit" => Ok(Self::Exit),
            "reopen" | "reopen_in_place" | "reopen-in-place" => Ok(Self::ReopenInPlace),
            _ => Err(format!("Unknown restart policy: {} (expected exit or reopen)", s)),
        }
    }
}

/// Outcome of a committed restore
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    /// Asset files written into the asset root
    pub assets_restored: usize,
    /// What the caller must do next
    pub restart: RestartPolicy,
}

/// Contents of a validated archive
struct RestorePlan {
    db_index: usize,
    /// (archive index, path relative to the asset root, is_dir)
    assets: Vec<(usize, PathBuf, bool)>,
}

/// Archive contents extracted to disk, ready to swap in
struct StagedRestore {
    /// Held so the staging directory is removed when the restore finishes
    _dir: tempfile::TempDir,
    db_file: PathBuf,
    uploads: PathBuf,
    asset_files: Vec<PathBuf>,
}

/// Runs the restore state machine against the live state
pub struct RestoreCoordinator {
    config: StorageConfig,
    handle: DatabaseHandle,
    policy: RestartPolicy,
    state: Mutex<RestoreState>,
}

impl RestoreCoordinator {
    pub fn new(config: StorageConfig, handle: DatabaseHandle, policy: RestartPolicy) -> Self {
        Self {
            config,
            handle,
            policy,
            state: Mutex::new(RestoreState::Idle),
        }
    }

    pub fn state(&self) -> RestoreState {
        *self.lock_state()
    }

    pub fn policy(&self) -> RestartPolicy {
        self.policy
    }

    /// Restore from an uploaded archive, deleting the upload once committed
    pub fn restore(&self, upload: Option<&Path>) -> Result<RestoreReport> {
        self.run(upload, true)
    }

    /// Restore from an archive the caller owns; the file is left in place
    pub fn restore_keeping(&self, archive: &Path) -> Result<RestoreReport> {
        self.run(Some(archive), false)
    }

    fn run(&self, upload: Option<&Path>, discard_upload: bool) -> Result<RestoreReport> {
        self.begin()?;

        match self.execute(upload) {
            Ok(assets_restored) => {
                if discard_upload {
                    if let Some(path) = upload {
                        if let Err(e) = fs::remove_file(path) {
                            warn!("Failed to remove uploaded archive {}: {}", path.display(), e);
                        }
                    }
                }
                self.commit(assets_restored)
            }
            Err(e) => {
                if e.is_validation() {
                    warn!("Restore rejected: {}", e);
                } else {
                    error!("Restore failed: {}", e);
                }
                self.set_state(RestoreState::Aborted);
                Err(e)
            }
        }
    }

    /// Claim the exclusive restore slot
    fn begin(&self) -> Result<()> {
        let mut state = self.lock_state();
        if !state.accepts_restore() {
            return Err(Error::RestoreInProgress);
        }
        *state = RestoreState::Validating;
        Ok(())
    }

    fn execute(&self, upload: Option<&Path>) -> Result<usize> {
        let upload = upload.ok_or(Error::NoUpload)?;
        info!("Restore started from {}", upload.display());

        let mut archive = open_archive(upload)?;
        let plan = validate(&mut archive)?;

        self.set_state(RestoreState::Staging);
        let staged = self.stage(&mut archive, &plan)?;

        self.set_state(RestoreState::Quiescing);
        self.handle.close();

        self.set_state(RestoreState::Extracting);
        match self.swap_in(&staged) {
            Ok(count) => Ok(count),
            Err(e) => {
                // Leave the process with a usable handle on whatever file is there
                if let Err(reopen_err) = self.handle.reopen() {
                    error!("Failed to reopen database after aborted restore: {}", reopen_err);
                }
                Err(e)
            }
        }
    }

    /// Extract every planned entry into a staging directory beside the database
    fn stage(&self, archive: &mut ZipArchive<File>, plan: &RestorePlan) -> Result<StagedRestore> {
        let db_dir = self.config.db_dir();
        fs::create_dir_all(&db_dir)?;

        let dir = tempfile::Builder::new()
            .prefix(".aloha-restore-")
            .tempdir_in(&db_dir)?;
        let db_file = dir.path().join(DB_ENTRY);
        let uploads = dir.path().join("uploads");

        {
            let mut entry = archive.by_index(plan.db_index)?;
            let mut out = File::create(&db_file)?;
            io::copy(&mut entry, &mut out)?;
            out.sync_all()?;
        }
        check_sqlite_header(&db_file)?;

        let mut asset_files = Vec::new();
        for (index, relative, is_dir) in &plan.assets {
            let target = uploads.join(relative);
            if *is_dir {
                fs::create_dir_all(&target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut entry = archive.by_index(*index)?;
            let mut out = File::create(&target)?;
            io::copy(&mut entry, &mut out)?;
            asset_files.push(relative.clone());
        }

        debug!(
            "Staged restore in {}: {} asset file(s)",
            dir.path().display(),
            asset_files.len()
        );

        Ok(StagedRestore {
            _dir: dir,
            db_file,
            uploads,
            asset_files,
        })
    }

    /// Move staged files over the live state. Handle must be closed.
    fn swap_in(&self, staged: &StagedRestore) -> Result<usize> {
        let db_path = &self.config.db_path;

        fs::rename(&staged.db_file, db_path).map_err(|e| {
            Error::Restore(format!(
                "failed to move restored database into {}: {}",
                db_path.display(),
                e
            ))
        })?;

        // Stale sidecars would be replayed against the new file
        for suffix in ["-wal", "-shm"] {
            let sidecar = sidecar_path(db_path, suffix);
            match fs::remove_file(&sidecar) {
                Ok(()) => debug!("Removed {}", sidecar.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", sidecar.display(), e),
            }
        }
        info!("Database file replaced: {}", db_path.display());

        let uploads_dir = &self.config.uploads_dir;
        if staged.asset_files.is_empty() && !staged.uploads.exists() {
            info!("Archive has no uploads, asset root left untouched");
            return Ok(0);
        }

        fs::create_dir_all(uploads_dir)?;
        let mut restored = 0;
        for relative in &staged.asset_files {
            let target = uploads_dir.join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            move_file(&staged.uploads.join(relative), &target).map_err(|e| {
                Error::Restore(format!(
                    "database restored but asset {} failed: {}",
                    relative.display(),
                    e
                ))
            })?;
            restored += 1;
        }

        info!("Restored {} asset file(s) into {}", restored, uploads_dir.display());
        Ok(restored)
    }

    fn commit(&self, assets_restored: usize) -> Result<RestoreReport> {
        self.set_state(RestoreState::Committed);
        info!("Restore committed ({} assets)", assets_restored);

        if self.policy == RestartPolicy::ReopenInPlace {
            if let Err(e) = self.handle.reopen() {
                error!("Restore committed but reopening the database failed: {}", e);
                self.set_state(RestoreState::Aborted);
                return Err(e);
            }
            self.set_state(RestoreState::Idle);
        }

        Ok(RestoreReport {
            assets_restored,
            restart: self.policy,
        })
    }

    fn set_state(&self, next: RestoreState) {
        let mut state = self.lock_state();
        debug!("Restore state {:?} -> {:?}", *state, next);
        *state = next;
    }

    fn lock_state(&self) -> MutexGuard<'_, RestoreState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path)?;
    ZipArchive::new(file).map_err(|e| Error::InvalidArchive(format!("not a zip archive: {}", e)))
}

/// Check the archive is a snapshot of this system and every entry stays in bounds
fn validate(archive: &mut ZipArchive<File>) -> Result<RestorePlan> {
    let mut db_index = None;
    let mut assets = Vec::new();

    for index in 0..archive.len() {
        let entry = archive
            .by_index_raw(index)
            .map_err(|e| Error::InvalidArchive(format!("unreadable entry #{}: {}", index, e)))?;
        let name = entry.name().to_string();

        if name == DB_ENTRY {
            if entry.is_dir() {
                return Err(Error::InvalidArchive(format!("{} is a directory", DB_ENTRY)));
            }
            db_index = Some(index);
            continue;
        }

        let Some(rest) = name.strip_prefix(UPLOADS_PREFIX) else {
            debug!("Ignoring archive entry outside the snapshot layout: {}", name);
            continue;
        };
        if rest.is_empty() {
            continue;
        }

        if entry.unix_mode().is_some_and(|mode| mode & 0o170000 == S_IFLNK) {
            warn!("Skipping symbolic link in archive: {}", name);
            continue;
        }

        let relative = safe_relative_path(rest)
            .ok_or_else(|| Error::InvalidArchive(format!("unsafe entry path: {}", name)))?;
        assets.push((index, relative, entry.is_dir()));
    }

    let db_index = db_index.ok_or_else(|| {
        Error::InvalidArchive(format!("missing {}; not an Aloha backup", DB_ENTRY))
    })?;

    Ok(RestorePlan { db_index, assets })
}

/// Relative path made only of normal components, or `None`
fn safe_relative_path(name: &str) -> Option<PathBuf> {
    if name.contains('\\') || name.contains('\0') {
        return None;
    }
    let mut path = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if path.as_os_str().is_empty() {
        return None;
    }
    Some(path)
}

fn check_sqlite_header(path: &Path) -> Result<()> {
    let mut header = [0u8; 16];
    let mut file = File::open(path)?;
    let valid = file.read_exact(&mut header).is_ok() && &header == SQLITE_HEADER;
    if !valid {
        return Err(Error::InvalidArchive(format!(
            "{} is not a SQLite database",
            DB_ENTRY
        )));
    }
    Ok(())
}

/// `aloha_database.db` + `-wal` -> `aloha_database.db-wal`
fn sidecar_path(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = db_path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Rename, falling back to copy + remove across filesystems
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default();
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn setup(policy: RestartPolicy) -> (TempDir, StorageConfig, RestoreCoordinator) {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig::under(dir.path().join("volume"));
        let handle = DatabaseHandle::open(&config.db_path).unwrap();
        let coordinator = RestoreCoordinator::new(config.clone(), handle, policy);
        (dir, config, coordinator)
    }

    #[test]
    fn test_missing_upload_is_rejected() {
        let (_dir, _config, coordinator) = setup(RestartPolicy::ReopenInPlace);
        let result = coordinator.restore(None);
        assert!(matches!(result, Err(Error::NoUpload)));
        assert_eq!(coordinator.state(), RestoreState::Aborted);
        assert!(coordinator.handle.is_open());
    }

    #[test]
    fn test_archive_without_database_entry() {
        let (dir, _config, coordinator) = setup(RestartPolicy::ReopenInPlace);
        let upload = dir.path().join("upload.zip");
        write_zip(&upload, &[("uploads/resume.pdf", b"pdf")]);

        let result = coordinator.restore(Some(&upload));
        assert!(matches!(result, Err(Error::InvalidArchive(_))));
        assert!(upload.exists());
        assert!(coordinator.handle.is_open());
    }

    #[test]
    fn test_not_a_zip() {
        let (dir, _config, coordinator) = setup(RestartPolicy::ReopenInPlace);
        let upload = dir.path().join("upload.zip");
        fs::write(&upload, b"definitely not a zip").unwrap();

        assert!(matches!(
            coordinator.restore(Some(&upload)),
            Err(Error::InvalidArchive(_))
        ));
    }

    #[test]
    fn test_database_entry_must_be_sqlite() {
        let (dir, config, coordinator) = setup(RestartPolicy::ReopenInPlace);
        let before = fs::read(&config.db_path).unwrap();
        let upload = dir.path().join("upload.zip");
        write_zip(&upload, &[(DB_ENTRY, b"garbage")]);

        assert!(matches!(
            coordinator.restore(Some(&upload)),
            Err(Error::InvalidArchive(_))
        ));
        assert_eq!(fs::read(&config.db_path).unwrap(), before);
        assert!(coordinator.handle.is_open());
    }

    #[test]
    fn test_zip_slip_entry_is_rejected() {
        let (dir, config, coordinator) = setup(RestartPolicy::ReopenInPlace);
        let upload = dir.path().join("upload.zip");
        write_zip(
            &upload,
            &[(DB_ENTRY, SQLITE_HEADER), ("uploads/../../escaped.txt", b"x")],
        );

        assert!(matches!(
            coordinator.restore(Some(&upload)),
            Err(Error::InvalidArchive(_))
        ));
        assert!(!config.db_dir().join("escaped.txt").exists());
        assert!(!dir.path().join("escaped.txt").exists());
    }

    #[test]
    fn test_aborted_state_accepts_new_attempt() {
        assert!(RestoreState::Aborted.accepts_restore());
        assert!(RestoreState::Idle.accepts_restore());
        assert!(!RestoreState::Committed.accepts_restore());
        assert!(!RestoreState::Extracting.accepts_restore());
    }

    #[test]
    fn test_committed_exit_policy_rejects_further_restores() {
        let (dir, config, coordinator) = setup(RestartPolicy::Exit);
        let source = Database::open(dir.path().join("source.db")).unwrap();
        source.checkpoint().unwrap();
        let db_bytes = fs::read(source.path()).unwrap();

        let upload = dir.path().join("upload.zip");
        write_zip(&upload, &[(DB_ENTRY, &db_bytes)]);

        let report = coordinator.restore(Some(&upload)).unwrap();
        assert_eq!(report.restart, RestartPolicy::Exit);
        assert_eq!(coordinator.state(), RestoreState::Committed);
        assert!(!coordinator.handle.is_open());
        assert!(!upload.exists());
        assert!(config.db_path.exists());

        let second = dir.path().join("second.zip");
        write_zip(&second, &[(DB_ENTRY, &db_bytes)]);
        assert!(matches!(
            coordinator.restore(Some(&second)),
            Err(Error::RestoreInProgress)
        ));
    }

    #[test]
    fn test_restore_keeping_leaves_archive() {
        let (dir, _config, coordinator) = setup(RestartPolicy::ReopenInPlace);
        let source = Database::open(dir.path().join("source.db")).unwrap();
        source.checkpoint().unwrap();
        let archive = dir.path().join("keep.zip");
        write_zip(&archive, &[(DB_ENTRY, &fs::read(source.path()).unwrap())]);

        coordinator.restore_keeping(&archive).unwrap();
        assert!(archive.exists());
        assert_eq!(coordinator.state(), RestoreState::Idle);
        assert!(coordinator.handle.is_open());
    }

    #[test]
    fn test_safe_relative_path() {
        assert_eq!(
            safe_relative_path("ids/a.png"),
            Some(PathBuf::from("ids").join("a.png"))
        );
        assert_eq!(safe_relative_path("./a.png"), Some(PathBuf::from("a.png")));
        assert_eq!(safe_relative_path("../a.png"), None);
        assert_eq!(safe_relative_path("/etc/passwd"), None);
        assert_eq!(safe_relative_path("a\\..\\b"), None);
        assert_eq!(safe_relative_path(""), None);
    }

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path(Path::new("/data/aloha_database.db"), "-wal"),
            PathBuf::from("/data/aloha_database.db-wal")
        );
    }

    #[test]
    fn test_restart_policy_parse() {
        assert_eq!("exit".parse::<RestartPolicy>().unwrap(), RestartPolicy::Exit);
        assert_eq!(
            "reopen".parse::<RestartPolicy>().unwrap(),
            RestartPolicy::ReopenInPlace
        );
        assert!("later".parse::<RestartPolicy>().is_err());
    }
}
