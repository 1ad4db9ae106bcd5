//! Aloha Admin Server
//!
//! Axum-based REST API for the persistent-state lifecycle of the Aloha
//! recruitment admin.
//!
//! Security features:
//! - API key authentication (secure by default, use --no-auth for local dev)
//! - Upload size limit on restore
//! - Audit logging for backup and restore
//! - Sanitized error responses
//!
//! Every JSON response uses the envelope `{ "success": bool, "data": ... }`.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use aloha_core::{DatabaseHandle, RestartPolicy, RestoreCoordinator, StorageConfig};

mod handlers;
mod scheduler;

pub use scheduler::{start_auto_backup_scheduler, start_retention_sweeper};

/// Maximum backup archive upload size (512 MB)
pub const MAX_RESTORE_UPLOAD: usize = 512 * 1024 * 1024;

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: i64 = 1000;

/// Header naming the admin on whose behalf a request is made (audit actor)
const ACTOR_HEADER: &str = "x-aloha-user";

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether authentication is required (secure by default)
    pub require_auth: bool,
    /// API keys accepted as `Authorization: Bearer <key>`
    pub api_keys: Vec<String>,
    /// What the process does after a committed restore
    pub restart: RestartPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            api_keys: vec![],
            restart: RestartPolicy::Exit,
        }
    }
}

/// Shared application state
pub struct AppState {
    /// Live database, closed while a restore swaps the file
    pub db: DatabaseHandle,
    /// Persisted-state locations
    pub storage: StorageConfig,
    pub config: ServerConfig,
    /// The only owner of restore; holds the exclusive in-progress flag
    pub restore: RestoreCoordinator,
}

/// Authentication middleware - validates API keys
///
/// API keys are compared in constant time.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        return next.run(request).await;
    }

    let api_key_valid = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|key| validate_api_key(key, &state.config.api_keys))
        .unwrap_or(false);

    if api_key_valid {
        info!(user = %get_actor(request.headers()), path = %request.uri().path(), "Authenticated via API key");
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid auth");
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiResponse::failure("Authentication required")),
    )
        .into_response()
}

/// Validate an API key against the configured keys using constant-time comparison
/// to prevent timing attacks.
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();

    valid_keys.iter().any(|key| {
        let key_bytes = key.as_bytes();
        provided_bytes.len() == key_bytes.len() && bool::from(provided_bytes.ct_eq(key_bytes))
    })
}

/// Parse a comma-separated list of API keys (`ALOHA_API_KEYS`)
pub fn parse_api_keys(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Identify the admin for audit logging
/// Returns the `x-aloha-user` header, "api-key" for API key auth, or "local-dev" for unauthenticated
pub fn get_actor(headers: &axum::http::HeaderMap) -> String {
    if let Some(user) = headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return user.to_string();
    }

    if headers
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .is_some()
    {
        return "api-key".to_string();
    }

    "local-dev".to_string()
}

/// Response envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

impl ApiResponse<String> {
    pub fn failure(message: &str) -> Self {
        Self {
            success: false,
            data: message.to_string(),
        }
    }
}

/// Create the application router
pub fn create_router(db: DatabaseHandle, storage: StorageConfig, config: ServerConfig) -> Router {
    let restore = RestoreCoordinator::new(storage.clone(), db.clone(), config.restart);

    let state = Arc::new(AppState {
        db,
        storage,
        config,
        restore,
    });

    let api_routes = Router::new()
        // Snapshot export / restore
        .route("/system/backup", get(handlers::download_backup))
        .route(
            "/system/restore",
            post(handlers::restore_backup).layer(DefaultBodyLimit::max(MAX_RESTORE_UPLOAD)),
        )
        .route("/system/restore/status", get(handlers::restore_status))
        // Audit log
        .route("/audit/logs", get(handlers::list_audit_logs));

    Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
}

/// Start the server with custom configuration
///
/// Also starts the hourly retention sweeper and the daily auto-backup.
pub async fn serve_with_config(
    db: DatabaseHandle,
    storage: StorageConfig,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("⚠️  Authentication disabled - do not expose to network!");
    } else if config.api_keys.is_empty() {
        warn!("⚠️  Authentication required but ALOHA_API_KEYS is empty - every API request will be rejected");
    }

    if config.restart == RestartPolicy::Exit {
        info!("Restore restart policy: exit (requires a process supervisor that restarts on exit)");
    }

    start_retention_sweeper(db.clone(), &storage);
    start_auto_backup_scheduler(db.clone(), &storage);

    let app = create_router(db, storage, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn internal(msg: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn conflict(msg: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn unavailable(msg: &str) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: msg.to_string(),
            internal: None,
        }
    }

    /// Map a core error to a status: caller mistakes are shown, system faults are sanitized
    pub fn from_core(err: aloha_core::Error) -> Self {
        use aloha_core::Error;

        match err {
            e if e.is_validation() => Self::bad_request(&e.to_string()),
            Error::RestoreInProgress => Self::conflict(&Error::RestoreInProgress.to_string()),
            Error::DatabaseClosed => Self::unavailable(&Error::DatabaseClosed.to_string()),
            e => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        (self.status, Json(ApiResponse::failure(&self.message))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}
