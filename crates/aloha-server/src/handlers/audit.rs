//! Audit log handlers

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{AppError, AppState, MAX_PAGE_LIMIT};
use aloha_core::{AuditEntry, Pagination};

/// Query parameters for audit log
#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_audit_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_audit_limit() -> i64 {
    15
}

/// Paged audit log response
#[derive(Debug, Serialize)]
pub struct AuditLogResponse {
    pub success: bool,
    pub data: Vec<AuditEntry>,
    pub pagination: Pagination,
}

/// GET /api/audit/logs - List audit log entries, newest first
pub async fn list_audit_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditQuery>,
) -> Result<Json<AuditLogResponse>, AppError> {
    let page = params.page.max(1);
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);

    let db = state.db.get().map_err(AppError::from_core)?;
    let result = db
        .list_audit_log(page, limit)
        .map_err(AppError::from_core)?;

    Ok(Json(AuditLogResponse {
        success: true,
        data: result.entries,
        pagination: result.pagination,
    }))
}
