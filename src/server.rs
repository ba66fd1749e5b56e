//! JSON HTTP API over the question-answering pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Status, version, and index statistics |
//! | `GET`  | `/search?q=&limit=&semantic_weight=` | Ranked chunks with previews |
//! | `POST` | `/ask` | Extractive answers with provenance |
//! | `POST` | `/similar` | Retrieval only, default weight |
//! | `POST` | `/ingest` | Ingest one text document |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "kind": "invalid_query", "message": "invalid query: query is blank" } }
//! ```
//!
//! `invalid_query`, `unsupported_format`, `extraction`, and `empty_input`
//! are 400; `model_unavailable` is 503; everything else is 500.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::error::{EngineError, ErrorBody};
use crate::indexer::IngestReport;
use crate::models::{Document, SourceRef};
use crate::orchestrator::{AskRequest, QaResponse, SearchHit};
use crate::pipeline::{Pipeline, PipelineStats};

#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

/// Open the pipeline from `config` and serve on `[server].bind` until the
/// process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = Arc::new(Pipeline::open(config).await?);
    let listener = TcpListener::bind(&config.server.bind).await?;
    serve(listener, pipeline).await
}

/// Serve on an already-bound listener.
pub async fn serve(listener: TcpListener, pipeline: Arc<Pipeline>) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "server listening");
    axum::serve(listener, router(pipeline)).await?;
    Ok(())
}

pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/search", get(handle_search))
        .route("/ask", post(handle_ask))
        .route("/similar", post(handle_similar))
        .route("/ingest", post(handle_ingest))
        .layer(cors)
        .with_state(AppState { pipeline })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

struct AppError(EngineError);

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        AppError(err)
    }
}

fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::InvalidQuery(_)
        | EngineError::UnsupportedFormat { .. }
        | EngineError::Extraction(_)
        | EngineError::EmptyInput => StatusCode::BAD_REQUEST,
        EngineError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(kind = self.0.kind(), error = %self.0, "request failed");
        }
        let body = ErrorResponse {
            error: self.0.to_body(),
        };
        (status, Json(body)).into_response()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    stats: PipelineStats,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        stats: state.pipeline.stats(),
    })
}

// ============ GET /search ============

#[derive(Deserialize)]
struct SearchParams {
    q: String,
    limit: Option<usize>,
    semantic_weight: Option<f64>,
}

#[derive(Serialize)]
struct SearchResponse<T> {
    results: Vec<T>,
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse<SearchHit>>, AppError> {
    let results = state
        .pipeline
        .orchestrator
        .search(&params.q, params.limit, params.semantic_weight)
        .await?;
    Ok(Json(SearchResponse { results }))
}

// ============ POST /ask ============

async fn handle_ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<QaResponse>, AppError> {
    Ok(Json(state.pipeline.orchestrator.ask(request).await?))
}

// ============ POST /similar ============

#[derive(Deserialize)]
struct SimilarRequest {
    query: String,
    k: Option<usize>,
}

async fn handle_similar(
    State(state): State<AppState>,
    Json(request): Json<SimilarRequest>,
) -> Result<Json<SearchResponse<SourceRef>>, AppError> {
    let orchestrator = &state.pipeline.orchestrator;
    let k = request.k.unwrap_or(orchestrator.defaults().search_limit);
    let results = orchestrator.similar(&request.query, k).await?;
    Ok(Json(SearchResponse { results }))
}

// ============ POST /ingest ============

#[derive(Deserialize)]
struct IngestRequest {
    source: String,
    content: String,
    content_type: Option<String>,
}

async fn handle_ingest(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestReport>, AppError> {
    let mut doc = Document::new(request.source, request.content);
    if let Some(content_type) = request.content_type {
        doc = doc.with_content_type(content_type);
    }
    Ok(Json(state.pipeline.indexer.ingest(doc).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_400() {
        assert_eq!(
            status_for(&EngineError::InvalidQuery("blank".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&EngineError::unsupported("doc")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_for(&EngineError::EmptyInput), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn model_and_internal_errors() {
        assert_eq!(
            status_for(&EngineError::ModelUnavailable("down".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&EngineError::IndexCorrupt("bad".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
