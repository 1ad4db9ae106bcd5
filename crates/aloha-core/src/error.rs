//! Error types for Aloha

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("No backup file uploaded")]
    NoUpload,

    #[error("Invalid backup archive: {0}")]
    InvalidArchive(String),

    #[error("A restore is already in progress")]
    RestoreInProgress,

    #[error("Database is closed for maintenance")]
    DatabaseClosed,

    #[error("Restore failed: {0}")]
    Restore(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Whether this error was caused by the caller's input rather than the system
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::NoUpload | Error::InvalidArchive(_) | Error::InvalidData(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
