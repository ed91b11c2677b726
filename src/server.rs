//! HTTP server for the hub.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/functions/process-manual` | Process one manual: `{"filename": "..."}` |
//! | `GET`  | `/manuals/status` | All manual status records |
//! | `GET`  | `/manuals/status/{*filename}` | One manual's status record |
//! | `GET`  | `/manuals/search?q=...&limit=...` | Keyword search over chunks |
//! | `POST` | `/worker/message` | Control message for the offline worker |
//! | any    | anything else | Proxied to `[offline].origin` through the offline worker |
//!
//! `process-manual` always answers with a processing result body; the status
//! code reflects the failing stage: 404 download, 422 parse, 500 persist.
//!
//! Errors follow one shape:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "filename must not be empty" } }
//! ```

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use workshop_hub_core::models::{
    ChunkHit, FailureKind, HttpRequest, HttpResponse, ManualStatus, ProcessingResult, RequestMode,
};

use crate::app;
use crate::config::Config;
use crate::ingest::ManualProcessor;
use crate::offline::{ControlMessage, Handled, HttpFetcher, MessageReply, OfflineWorker};

/// Largest request body the proxy will buffer.
const MAX_PROXY_BODY_BYTES: usize = 16 * 1024 * 1024;

const HOP_BY_HOP: &[&str] = &["connection", "content-length", "transfer-encoding", "keep-alive"];

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<ManualProcessor>,
    pub worker: Option<Arc<OfflineWorker>>,
}

/// Build the router over already-constructed components.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/functions/process-manual", post(handle_process_manual))
        .route("/manuals/status", get(handle_list_status))
        .route("/manuals/status/{*filename}", get(handle_get_status))
        .route("/manuals/search", get(handle_search))
        .route("/worker/message", post(handle_worker_message))
        .fallback(handle_proxy)
        .layer(cors)
        .with_state(state)
}

/// Serve on `[server].bind` until the process is stopped.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let processor = Arc::new(app::open_processor(config).await?);

    let worker = match config.offline {
        Some(ref offline) => {
            let fetcher = Arc::new(HttpFetcher::new(std::time::Duration::from_secs(
                offline.fetch_timeout_secs,
            ))?);
            let worker = Arc::new(OfflineWorker::new(offline, fetcher)?);
            let installing = Arc::clone(&worker);
            tokio::spawn(async move {
                installing.install().await;
            });
            Some(worker)
        }
        None => None,
    };

    let app = router(AppState { processor, worker });

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "hub server listening");
    println!("Workshop hub listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: format!("{:#}", err),
    }
}

fn bad_gateway(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "bad_gateway",
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ POST /functions/process-manual ============

#[derive(Deserialize)]
struct ProcessManualRequest {
    #[serde(alias = "fileName")]
    filename: String,
}

/// HTTP status for a processing result.
pub fn result_status(result: &ProcessingResult) -> StatusCode {
    match result.error_kind {
        None => StatusCode::OK,
        Some(FailureKind::Download) => StatusCode::NOT_FOUND,
        Some(FailureKind::Parse) => StatusCode::UNPROCESSABLE_ENTITY,
        Some(FailureKind::Persist) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn handle_process_manual(
    State(state): State<AppState>,
    Json(req): Json<ProcessManualRequest>,
) -> Result<Response, AppError> {
    let filename = req.filename.trim();
    if filename.is_empty() {
        return Err(bad_request("filename must not be empty"));
    }
    let result = state.processor.process(filename).await;
    Ok((result_status(&result), Json(result)).into_response())
}

// ============ GET /manuals/status ============

async fn handle_list_status(
    State(state): State<AppState>,
) -> Result<Json<Vec<ManualStatus>>, AppError> {
    let statuses = state
        .processor
        .store()
        .list_statuses()
        .await
        .map_err(internal)?;
    Ok(Json(statuses))
}

async fn handle_get_status(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<ManualStatus>, AppError> {
    state
        .processor
        .store()
        .get_status(&filename)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or_else(|| not_found(format!("no status recorded for {}", filename)))
}

// ============ GET /manuals/search ============

#[derive(Deserialize)]
struct SearchParams {
    q: String,
    #[serde(default = "default_search_limit")]
    limit: usize,
}

fn default_search_limit() -> usize {
    10
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<ChunkHit>>, AppError> {
    if params.q.trim().is_empty() {
        return Err(bad_request("q must not be empty"));
    }
    let hits = state
        .processor
        .store()
        .search_chunks(&params.q, params.limit)
        .await
        .map_err(internal)?;
    Ok(Json(hits))
}

// ============ POST /worker/message ============

async fn handle_worker_message(
    State(state): State<AppState>,
    Json(message): Json<ControlMessage>,
) -> Result<Json<MessageReply>, AppError> {
    let worker = state
        .worker
        .as_ref()
        .ok_or_else(|| not_found("offline worker is not configured"))?;
    Ok(Json(worker.on_message(message).await))
}

// ============ Fallback proxy ============

fn is_navigation(headers: &HeaderMap) -> bool {
    if let Some(mode) = headers.get("sec-fetch-mode") {
        return mode.as_bytes() == b"navigate";
    }
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

async fn to_worker_request(worker: &OfflineWorker, req: Request) -> Result<HttpRequest, AppError> {
    let (parts, body) = req.into_parts();
    let url = worker.origin_url(parts.uri.path(), parts.uri.query());

    let body = to_bytes(body, MAX_PROXY_BODY_BYTES)
        .await
        .map_err(|e| bad_request(format!("unreadable request body: {}", e)))?;

    let headers = parts
        .headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect();

    Ok(HttpRequest {
        method: parts.method.as_str().to_string(),
        url: url.to_string(),
        mode: if is_navigation(&parts.headers) {
            RequestMode::Navigate
        } else {
            RequestMode::Other
        },
        headers,
        body: body.to_vec(),
    })
}

fn to_axum_response(resp: HttpResponse) -> Result<Response, AppError> {
    let mut builder = axum::http::Response::builder()
        .status(StatusCode::from_u16(resp.status).unwrap_or(StatusCode::BAD_GATEWAY));
    for (name, value) in &resp.headers {
        if HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(Body::from(resp.body))
        .map_err(|e| bad_gateway(format!("invalid upstream response: {}", e)))
}

async fn handle_proxy(State(state): State<AppState>, req: Request) -> Result<Response, AppError> {
    let worker = state
        .worker
        .as_ref()
        .ok_or_else(|| not_found("no route and no offline origin configured"))?;

    let request = to_worker_request(worker, req).await?;
    let response = match worker.handle(&request).await {
        Handled::Response(resp) => resp,
        Handled::PassThrough => worker
            .pass_through(&request)
            .await
            .map_err(|e| bad_gateway(e.to_string()))?,
    };
    to_axum_response(response)
}
