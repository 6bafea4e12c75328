//! JSON HTTP API.
//!
//! Exposes sync and question answering over HTTP so CRM backends can
//! trigger a sync after saving leads and forward user questions.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/sync` | Run a sync for one tenant |
//! | `POST` | `/ask` | Answer a question over a tenant's synced leads |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one schema:
//!
//! ```json
//! { "error": { "code": "invalid_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `invalid_request` (400), `configuration_missing` (404),
//! `upstream_unavailable` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser-based CRM
//! frontends can call the API directly.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::ask;
use crate::config::Config;
use crate::docstore::ERR_NO_CREDENTIALS;
use crate::sync::{self, SyncOptions, TenantLocks};
use crate::vectorstore::VectorMatch;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    /// Per-tenant sync serialization.
    locks: TenantLocks,
}

/// Starts the HTTP server.
///
/// Binds to the address configured in `[server].bind` and runs until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState {
        config: Arc::new(config.clone()),
        locks: TenantLocks::new(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/sync", post(handle_sync))
        .route("/ask", post(handle_ask))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("Server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"invalid_request"`).
    code: String,
    /// Human-readable error message.
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn invalid_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "invalid_request".to_string(),
        message: message.into(),
    }
}

fn configuration_missing(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "configuration_missing".to_string(),
        message: message.into(),
    }
}

fn upstream_unavailable(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "upstream_unavailable".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Maps operation errors onto the API's error codes. Validation failures
/// happen before any external call, unknown tenants are a configuration
/// problem, and anything that exhausted its retries against an upstream
/// gets a 502 so callers know to retry later.
fn classify_error(err: anyhow::Error) -> AppError {
    let msg = err.to_string();

    if msg.contains(ERR_NO_CREDENTIALS) {
        configuration_missing(msg)
    } else if msg.contains("must not be empty") || msg.contains("disabled") {
        invalid_request(msg)
    } else if msg.contains("unreachable")
        || msg.contains("API error")
        || msg.contains("vector store")
        || msg.contains("document store error")
        || msg.contains("language model error")
        || msg.contains("attempts")
        || msg.contains("after retries")
    {
        upstream_unavailable(msg)
    } else {
        internal(msg)
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /sync ============

/// Request body for `POST /sync`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncRequest {
    tenant_name: String,
    #[serde(default)]
    assigned_to: Option<String>,
    #[serde(default)]
    assigned_to_id: Option<String>,
    #[serde(default)]
    force_refresh: bool,
}

/// Response body for `POST /sync`.
///
/// `skippedCount` folds together unchanged and filtered-out records; the
/// distinction only matters internally.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncResponse {
    fetched_count: usize,
    upserted_count: usize,
    skipped_count: usize,
    failed_count: usize,
}

/// Handler for `POST /sync`.
///
/// Two concurrent requests for the same tenant run one after the other;
/// different tenants proceed in parallel.
async fn handle_sync(
    State(state): State<AppState>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, AppError> {
    if req.tenant_name.trim().is_empty() {
        return Err(invalid_request("tenantName must not be empty"));
    }

    let opts = SyncOptions {
        assigned_to: req.assigned_to,
        assigned_to_id: req.assigned_to_id,
        force_refresh: req.force_refresh,
        dry_run: false,
    };

    let _guard = state.locks.acquire(&req.tenant_name).await;
    let report = sync::run_sync(&state.config, &req.tenant_name, &opts)
        .await
        .map_err(classify_error)?;

    Ok(Json(SyncResponse {
        fetched_count: report.fetched,
        upserted_count: report.upserted,
        skipped_count: report.skipped_total(),
        failed_count: report.failed,
    }))
}

// ============ POST /ask ============

/// Request body for `POST /ask`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AskRequest {
    tenant_name: String,
    question: String,
}

/// Response body for `POST /ask`.
#[derive(Serialize)]
struct AskResponse {
    answer: String,
    sources: Vec<VectorMatch>,
}

/// Handler for `POST /ask`.
async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let result = ask::run_ask(&state.config, &req.tenant_name, &req.question)
        .await
        .map_err(classify_error)?;

    Ok(Json(AskResponse {
        answer: result.answer,
        sources: result.sources,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn unknown_tenant_maps_to_404() {
        let err = anyhow!("{}: 'ghost'", ERR_NO_CREDENTIALS);
        let app = classify_error(err);
        assert_eq!(app.status, StatusCode::NOT_FOUND);
        assert_eq!(app.code, "configuration_missing");
    }

    #[test]
    fn validation_maps_to_400() {
        let app = classify_error(anyhow!("question must not be empty"));
        assert_eq!(app.status, StatusCode::BAD_REQUEST);
        assert_eq!(app.code, "invalid_request");
    }

    #[test]
    fn exhausted_retries_map_to_502() {
        let app = classify_error(anyhow!("Vector store unreachable after 3 attempts"));
        assert_eq!(app.status, StatusCode::BAD_GATEWAY);
        assert_eq!(app.code, "upstream_unavailable");
    }

    #[test]
    fn unknown_errors_map_to_500() {
        let app = classify_error(anyhow!("database is locked"));
        assert_eq!(app.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(app.code, "internal");
    }
}
