//! Snapshot export and restore handlers

use std::io::{self, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Multipart, State},
    http::{header, HeaderMap, Response, StatusCode},
    Json,
};
use chrono::Utc;
use futures_util::stream;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

use aloha_core::{
    snapshot_filename, Database, RestartPolicy, RestoreReport, RestoreState, SnapshotArchiver,
    SnapshotSummary,
};

use crate::{get_actor, ApiResponse, AppError, AppState, MAX_RESTORE_UPLOAD};

/// Multipart field carrying the archive
const UPLOAD_FIELD: &str = "backup_file";

/// Delay between the restore response and process exit
const EXIT_DELAY: Duration = Duration::from_secs(1);

/// Read size when streaming an archive to the client
const DOWNLOAD_CHUNK: usize = 64 * 1024;

/// GET /api/system/backup - Download a snapshot archive of the database and uploads
pub async fn download_backup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response<Body>, AppError> {
    let actor = get_actor(&headers);
    let archiver = SnapshotArchiver::new(state.storage.clone(), state.db.clone());

    // Built into an unlinked temp file; the body streams it back out
    let (file, length, summary) = tokio::task::spawn_blocking(
        move || -> aloha_core::Result<(std::fs::File, u64, SnapshotSummary)> {
            let mut file = tempfile::tempfile()?;
            let summary = archiver.create_snapshot(&mut file)?;
            let length = file.seek(SeekFrom::End(0))?;
            file.seek(SeekFrom::Start(0))?;
            Ok((file, length, summary))
        },
    )
    .await
    .map_err(|e| AppError::internal(&format!("Backup task failed: {}", e)))?
    .map_err(AppError::from_core)?;

    // Archive is finalized; record the export
    let details = format!(
        "Downloaded system backup ({} assets, {} bytes)",
        summary.asset_count, summary.total_bytes
    );
    if let Err(e) = state
        .db
        .get()
        .and_then(|db| db.log_audit(&actor, "SYSTEM_BACKUP", Some(&details)))
    {
        warn!("Backup exported but not audited: {}", e);
    }

    let today = Utc::now()
        .with_timezone(&state.storage.schedule.utc_offset)
        .date_naive();
    let filename = snapshot_filename(today);
    info!("Serving backup {} ({} bytes)", filename, length);

    let body = Body::from_stream(stream::try_unfold(File::from_std(file), next_chunk));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_LENGTH, length)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(body)
        .map_err(|e| AppError::internal(&e.to_string()))
}

/// Next slice of the archive, or `None` at end of file
async fn next_chunk(mut file: File) -> io::Result<Option<(Vec<u8>, File)>> {
    let mut buf = vec![0u8; DOWNLOAD_CHUNK];
    let read = file.read(&mut buf).await?;
    if read == 0 {
        return Ok(None);
    }
    buf.truncate(read);
    Ok(Some((buf, file)))
}

/// POST /api/system/restore - Restore from an uploaded snapshot archive
///
/// Expects multipart form with:
/// - backup_file: zip archive produced by the backup endpoint (max 512MB)
///
/// With the exit restart policy the process exits shortly after responding.
pub async fn restore_backup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<String>>, AppError> {
    let actor = get_actor(&headers);
    let mut upload: Option<tempfile::TempPath> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(&format!("Failed to read form field: {}", e)))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let has_filename = field.file_name().is_some_and(|name| !name.is_empty());

        let mut spool = tempfile::NamedTempFile::new()?;
        let mut total_size: usize = 0;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|_| AppError::bad_request("Failed to read backup file"))?
        {
            total_size += chunk.len();
            if total_size > MAX_RESTORE_UPLOAD {
                return Err(AppError::bad_request(&format!(
                    "File too large. Maximum size is {} MB",
                    MAX_RESTORE_UPLOAD / 1024 / 1024
                )));
            }
            spool.write_all(&chunk)?;
        }
        spool.flush()?;

        // Browsers send an empty part when no file was chosen
        if total_size == 0 && !has_filename {
            continue;
        }
        upload = Some(spool.into_temp_path());
    }

    let upload_path = upload.as_ref().map(|p| p.to_path_buf());
    let restore_state = state.clone();
    let report = tokio::task::spawn_blocking(move || {
        restore_state.restore.restore(upload_path.as_deref())
    })
    .await
    .map_err(|e| AppError::internal(&format!("Restore task failed: {}", e)))?
    .map_err(AppError::from_core)?;

    audit_restore(&state, &actor, &report);

    let message = match report.restart {
        RestartPolicy::Exit => {
            schedule_exit();
            "System restored successfully. Server is restarting..."
        }
        RestartPolicy::ReopenInPlace => "System restored successfully. Database reloaded.",
    };

    Ok(ApiResponse::ok(message.to_string()))
}

/// Current restore state and restart policy
#[derive(Debug, Serialize)]
pub struct RestoreStatus {
    pub state: RestoreState,
    pub restart: RestartPolicy,
    pub database_open: bool,
}

/// GET /api/system/restore/status - Where the restore state machine stands
pub async fn restore_status(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<RestoreStatus>> {
    ApiResponse::ok(RestoreStatus {
        state: state.restore.state(),
        restart: state.restore.policy(),
        database_open: state.db.is_open(),
    })
}

/// Record the restore in the restored database
fn audit_restore(state: &AppState, actor: &str, report: &RestoreReport) {
    let details = format!(
        "Restored system from backup ({} assets, restart: {})",
        report.assets_restored,
        report.restart.as_str()
    );

    // With the exit policy the handle stays closed; write through a short-lived pool
    let db = match report.restart {
        RestartPolicy::ReopenInPlace => state.db.get(),
        RestartPolicy::Exit => Database::open(&state.storage.db_path),
    };

    match db.and_then(|db| db.log_audit(actor, "SYSTEM_RESTORE", Some(&details))) {
        Ok(_) => info!("Restore audited for {}", actor),
        Err(e) => warn!("Restore committed but not audited: {}", e),
    }
}

/// Exit after the response has had time to flush; the supervisor restarts us
fn schedule_exit() {
    tokio::spawn(async {
        tokio::time::sleep(EXIT_DELAY).await;
        info!("Exiting after restore so the supervisor restarts with the restored database");
        std::process::exit(0);
    });
}
