//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::path::Path;

use aloha_core::{ApplicantStatus, Database, NewApplicant, StorageConfig, DB_ENTRY};
use chrono::{Duration, Utc};
use tempfile::TempDir;

use crate::commands::{self, format_size};

fn setup_volume() -> (TempDir, StorageConfig) {
    let dir = TempDir::new().unwrap();
    let storage = StorageConfig::under(dir.path().join("volume"));
    commands::cmd_init(&storage).unwrap();
    (dir, storage)
}

fn add_applicant(db: &Database, last_name: &str, resume: Option<&str>) -> i64 {
    db.insert_applicant(&NewApplicant {
        first_name: "Test".to_string(),
        last_name: last_name.to_string(),
        resume_path: resume.map(String::from),
        ..Default::default()
    })
    .unwrap()
}

fn entry_names(archive: &Path) -> Vec<String> {
    let file = std::fs::File::open(archive).unwrap();
    let archive = zip::ZipArchive::new(file).unwrap();
    archive.file_names().map(String::from).collect()
}

// ========== Storage Resolution Tests ==========

#[test]
fn test_resolve_storage_volume_flag() {
    let storage = commands::resolve_storage(None, Some(Path::new("/data")));
    assert_eq!(storage.db_path, Path::new("/data/aloha_database.db"));
    assert_eq!(storage.uploads_dir, Path::new("/data/uploads"));
    assert_eq!(
        storage.auto_backup_path,
        Path::new("/data/aloha_auto_backup.db")
    );
}

#[test]
fn test_resolve_storage_db_overrides_volume() {
    let storage = commands::resolve_storage(
        Some(Path::new("/tmp/other.db")),
        Some(Path::new("/data")),
    );
    assert_eq!(storage.db_path, Path::new("/tmp/other.db"));
    assert_eq!(storage.uploads_dir, Path::new("/data/uploads"));
}

// ========== Core Command Tests ==========

#[test]
fn test_cmd_init_creates_layout() {
    let (_dir, storage) = setup_volume();
    assert!(storage.db_path.exists());
    assert!(storage.uploads_dir.is_dir());
}

#[test]
fn test_cmd_audit_empty_and_populated() {
    let (_dir, storage) = setup_volume();
    assert!(commands::cmd_audit(&storage, 1, 15).is_ok());

    let db = commands::open_db(&storage).unwrap();
    db.log_audit("admin", "EVENT", None).unwrap();
    assert!(commands::cmd_audit(&storage, 0, 5000).is_ok());
}

// ========== Backup Command Tests ==========

#[test]
fn test_cmd_backup_export() {
    let (dir, storage) = setup_volume();
    std::fs::write(storage.uploads_dir.join("resume-1.pdf"), b"pdf").unwrap();
    let out = dir.path().join("snapshot.zip");

    commands::cmd_backup_export(&storage, Some(&out)).unwrap();

    let names = entry_names(&out);
    assert!(names.iter().any(|n| n == DB_ENTRY));
    assert!(names.iter().any(|n| n == "uploads/resume-1.pdf"));

    let db = commands::open_db(&storage).unwrap();
    let page = db.list_audit_log(1, 15).unwrap();
    assert_eq!(page.entries[0].action, "SYSTEM_BACKUP");
    assert_eq!(page.entries[0].actor, "cli");
}

#[test]
fn test_cmd_backup_restore_requires_force() {
    let (dir, storage) = setup_volume();
    let out = dir.path().join("snapshot.zip");
    commands::cmd_backup_export(&storage, Some(&out)).unwrap();

    let result = commands::cmd_backup_restore(&storage, &out, false);
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("--force"));
}

#[test]
fn test_cmd_backup_restore_missing_archive() {
    let (dir, storage) = setup_volume();
    let result = commands::cmd_backup_restore(&storage, &dir.path().join("nope.zip"), true);
    assert!(result.is_err());
}

#[test]
fn test_cmd_backup_restore_round_trip() {
    let (source_dir, source) = setup_volume();
    {
        let db = commands::open_db(&source).unwrap();
        add_applicant(&db, "Reyes", Some("/uploads/resume-7.pdf"));
        add_applicant(&db, "Cruz", None);
    }
    std::fs::write(source.uploads_dir.join("resume-7.pdf"), b"resume").unwrap();
    let archive = source_dir.path().join("snapshot.zip");
    commands::cmd_backup_export(&source, Some(&archive)).unwrap();

    let (_target_dir, target) = setup_volume();
    commands::cmd_backup_restore(&target, &archive, true).unwrap();

    // The archive is left in place for the caller
    assert!(archive.exists());

    let db = commands::open_db(&target).unwrap();
    assert_eq!(db.count_applicants().unwrap(), 2);
    assert_eq!(
        std::fs::read(target.uploads_dir.join("resume-7.pdf")).unwrap(),
        b"resume"
    );
    let page = db.list_audit_log(1, 15).unwrap();
    assert_eq!(page.entries[0].action, "SYSTEM_RESTORE");
}

// ========== Maintenance Command Tests ==========

#[test]
fn test_cmd_sweep_purges_expired_rejections() {
    let (_dir, storage) = setup_volume();
    let db = commands::open_db(&storage).unwrap();

    let expired = add_applicant(&db, "Old", Some("/uploads/resume-old.pdf"));
    db.update_applicant_status_at(
        expired,
        ApplicantStatus::Rejected,
        Utc::now() - Duration::days(10),
    )
    .unwrap();
    std::fs::write(storage.uploads_dir.join("resume-old.pdf"), b"old").unwrap();

    let fresh = add_applicant(&db, "New", None);
    db.update_applicant_status(fresh, ApplicantStatus::Rejected)
        .unwrap();

    commands::cmd_sweep(&storage).unwrap();

    assert!(db.get_applicant(expired).unwrap().is_none());
    assert!(db.get_applicant(fresh).unwrap().is_some());
    assert!(!storage.uploads_dir.join("resume-old.pdf").exists());
}

#[test]
fn test_cmd_auto_backup() {
    let (_dir, storage) = setup_volume();
    commands::cmd_auto_backup(&storage).unwrap();
    assert!(storage.auto_backup_path.exists());
}

#[test]
fn test_cmd_auto_backup_without_database() {
    let dir = TempDir::new().unwrap();
    let storage = StorageConfig::under(dir.path());
    assert!(commands::cmd_auto_backup(&storage).is_ok());
    assert!(!storage.auto_backup_path.exists());
}

// ========== Utility Tests ==========

#[test]
fn test_format_size() {
    assert_eq!(format_size(512), "512 B");
    assert_eq!(format_size(2048), "2.00 KB");
    assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
}
