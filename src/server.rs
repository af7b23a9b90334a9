//! HTTP server for triggering ingestion and polling progress.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ingest/{kind}` | Start a background batch; `202`, or `409` if one is running |
//! | `GET`  | `/progress/{kind}` | Progress snapshot for the kind's pipeline |
//! | `GET`  | `/documents/{kind}` | List stored documents, newest first |
//! | `GET`  | `/documents/{kind}/{sha}` | Stored document with its sections |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `{kind}` is `cv` or `role` (the progress keys `documents` / `roles` are
//! accepted too).
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "unknown document kind" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `conflict` (409),
//! `internal` (500).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::models::{Document, DocumentKind, DocumentSummary, Section};
use crate::pipeline::{list_candidate_files, BatchResult, Pipeline};
use crate::progress::{ProgressRegistry, ProgressSnapshot};
use crate::store::{DocumentStore, SqliteStore};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    store: Arc<dyn DocumentStore>,
    progress: ProgressRegistry,
    pipelines: Arc<HashMap<DocumentKind, Arc<Pipeline>>>,
    /// Held for the lifetime of a background batch.
    running: Arc<HashMap<DocumentKind, Arc<Mutex<()>>>>,
}

impl AppState {
    /// Wire one pipeline per kind against `store`, sharing `progress`.
    pub fn new(
        config: &Config,
        store: Arc<dyn DocumentStore>,
        progress: ProgressRegistry,
    ) -> anyhow::Result<Self> {
        let mut pipelines = HashMap::new();
        let mut running = HashMap::new();
        for kind in DocumentKind::ALL {
            let pipeline =
                Pipeline::from_config(config, kind, store.clone(), progress.tracker(kind))?;
            pipelines.insert(kind, Arc::new(pipeline));
            running.insert(kind, Arc::new(Mutex::new(())));
        }
        Ok(Self {
            config: Arc::new(config.clone()),
            store,
            progress,
            pipelines: Arc::new(pipelines),
            running: Arc::new(running),
        })
    }
}

/// Build the router with all routes and a permissive CORS layer.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ingest/{kind}", post(handle_ingest))
        .route("/progress/{kind}", get(handle_progress))
        .route("/documents/{kind}", get(handle_list))
        .route("/documents/{kind}/{sha}", get(handle_document))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = SqliteStore::connect(&config.db.path).await?;
    store.ensure_schema().await?;
    let state = AppState::new(config, Arc::new(store), ProgressRegistry::new())?;

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "server listening");
    println!("hiremind listening on http://{}", bind_addr);

    axum::serve(listener, router(state)).await?;
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

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
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

fn conflict(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::CONFLICT,
        code: "conflict",
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

fn parse_kind(raw: &str) -> Result<DocumentKind, AppError> {
    raw.parse().map_err(|e: anyhow::Error| bad_request(e.to_string()))
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

// ============ POST /ingest/{kind} ============

#[derive(Debug, Default, Deserialize)]
pub struct IngestRequest {
    /// Files to ingest; empty means the configured folder for the kind.
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Serialize)]
pub struct IngestAccepted {
    pub kind: &'static str,
    pub total: usize,
}

async fn handle_ingest(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(req): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestAccepted>), AppError> {
    let kind = parse_kind(&kind)?;
    let pipeline = state
        .pipelines
        .get(&kind)
        .cloned()
        .ok_or_else(|| not_found(format!("no pipeline for {}", kind)))?;
    let lock = state
        .running
        .get(&kind)
        .cloned()
        .ok_or_else(|| not_found(format!("no pipeline for {}", kind)))?;
    let guard = lock
        .try_lock_owned()
        .map_err(|_| conflict(format!("a {} batch is already running", kind)))?;

    let paths = if req.paths.is_empty() {
        let folder = state
            .config
            .folders
            .for_kind(kind)
            .ok_or_else(|| bad_request("paths is empty and no folder is configured"))?;
        list_candidate_files(folder, &state.config.ingest.extensions).map_err(internal)?
    } else {
        req.paths
    };
    let total = paths.len();
    let overwrite = req.overwrite;

    tokio::spawn(async move {
        let _guard = guard;
        match pipeline.process_batch_with(&paths, overwrite).await {
            Ok(BatchResult { errors, .. }) if !errors.is_empty() => {
                for e in &errors {
                    error!(kind = %kind, "{}", e);
                }
            }
            Ok(_) => {}
            Err(e) => error!(kind = %kind, error = %format!("{:#}", e), "batch aborted"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestAccepted {
            kind: kind.progress_key(),
            total,
        }),
    ))
}

// ============ GET /progress/{kind} ============

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub kind: &'static str,
    #[serde(flatten)]
    pub snapshot: ProgressSnapshot,
}

async fn handle_progress(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<ProgressResponse>, AppError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(ProgressResponse {
        kind: kind.progress_key(),
        snapshot: state.progress.snapshot(kind),
    }))
}

// ============ GET /documents ============

#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub id: String,
    pub document: Document,
    pub sections: Vec<Section>,
}

async fn handle_list(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<Vec<DocumentSummary>>, AppError> {
    let kind = parse_kind(&kind)?;
    let docs = state.store.list_documents(kind).await.map_err(internal)?;
    Ok(Json(docs))
}

async fn handle_document(
    State(state): State<AppState>,
    Path((kind, sha)): Path<(String, String)>,
) -> Result<Json<DocumentResponse>, AppError> {
    let kind = parse_kind(&kind)?;
    let summary = state
        .store
        .find_by_hash(kind, &sha)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(format!("no {} document with sha {}", kind, sha)))?;
    let document = state
        .store
        .read_document(kind, &sha)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(format!("no {} document with sha {}", kind, sha)))?;
    let sections = state
        .store
        .read_sections(kind, &sha)
        .await
        .map_err(internal)?;
    Ok(Json(DocumentResponse {
        id: summary.id,
        document,
        sections,
    }))
}
