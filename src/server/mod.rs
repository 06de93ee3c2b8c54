// HTTP server
// Thin axum layer over the pipeline: request parsing, error-to-status
// mapping, and the startup cleanup sweep

#[cfg(test)]
mod tests;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tracing::{error, info, warn};

use crate::RagError;
use crate::pipeline::{IngestRequest, RagService, RetrieveRequest};

pub const DEFAULT_PORT: u16 = 5300;

/// Error wrapper that maps the pipeline taxonomy onto HTTP statuses.
struct ApiError(RagError);

impl From<RagError> for ApiError {
    #[inline]
    fn from(error: RagError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    #[inline]
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RagError::InvalidInput(_) | RagError::NoChunksProduced => StatusCode::BAD_REQUEST,
            RagError::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected ({}): {}", status, self.0);
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Build the application router.
#[inline]
pub fn router(service: RagService) -> Router {
    Router::new()
        .route("/", get(describe))
        .route("/health", get(health))
        .route("/embed", post(embed))
        .route("/retrieve", post(retrieve))
        .route("/collections", get(list_collections))
        .route(
            "/collections/{session_id}",
            get(collection_info).delete(delete_collection),
        )
        .route("/cleanup", post(cleanup))
        .with_state(service)
}

/// Run the startup cleanup sweep and serve the API on `port` until the
/// process is terminated.
#[inline]
pub async fn serve(service: RagService, port: u16) -> Result<(), RagError> {
    // Expired collections from previous runs are removed before the
    // first request is accepted. Failure is logged, not fatal.
    match service.cleanup().await {
        Ok(summary) => info!(
            "Startup cleanup: {} collections deleted",
            summary.collections_deleted
        ),
        Err(e) => warn!("Startup cleanup failed: {}", e),
    }

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("RAG builder listening on port {}", port);

    axum::serve(listener, router(service)).await?;
    Ok(())
}

async fn describe(State(service): State<RagService>) -> Json<serde_json::Value> {
    let chunking = service.chunking_config();
    Json(json!({
        "service": "rag-builder",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "GET /health": "Service and dependency health",
            "POST /embed": "Chunk, embed, and store a document",
            "POST /retrieve": "Retrieve chunks similar to a query",
            "GET /collections": "List session collections",
            "GET /collections/{session_id}": "Describe one session collection",
            "DELETE /collections/{session_id}": "Delete one session collection",
            "POST /cleanup": "Delete expired session collections",
        },
        "chunking": {
            "target_tokens": chunking.target_tokens,
            "min_tokens": chunking.min_tokens,
            "max_tokens": chunking.max_tokens,
            "overlap_tokens": chunking.overlap_tokens,
        },
    }))
}

async fn health(State(service): State<RagService>) -> Json<serde_json::Value> {
    let report = service.health().await;
    Json(json!({
        "status": report.status,
        "services": report.services,
        "rag_config": report.rag_config,
    }))
}

async fn embed(
    State(service): State<RagService>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = service.ingest(request).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Document embedded successfully",
        "session_id": outcome.session_id,
        "collection_name": outcome.collection_name,
        "document": outcome.document,
        "embedding_dimensions": outcome.embedding_dimensions,
    })))
}

async fn retrieve(
    State(service): State<RagService>,
    Json(request): Json<RetrieveRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = service.retrieve(request).await?;
    let mut body = json!({
        "success": true,
        "query": outcome.query,
        "session_id": outcome.session_id,
        "results": outcome.results,
        "total_results": outcome.total_results,
        "total_chunks_searched": outcome.total_chunks_searched,
    });
    if let Some(message) = outcome.message {
        body["message"] = json!(message);
    }
    Ok(Json(body))
}

async fn list_collections(
    State(service): State<RagService>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let sessions = service.list_sessions().await?;
    let total_count = sessions.len();
    Ok(Json(json!({
        "collections": sessions,
        "total_count": total_count,
    })))
}

async fn collection_info(
    State(service): State<RagService>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let info = service.session_info(&session_id).await?;
    let status = if info.exists {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    Ok((status, Json(info)).into_response())
}

async fn delete_collection(
    State(service): State<RagService>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    if service.delete_session(&session_id).await? {
        Ok(Json(json!({
            "success": true,
            "message": format!("Collection for session '{}' deleted", session_id),
        }))
        .into_response())
    } else {
        Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Collection not found" })),
        )
            .into_response())
    }
}

async fn cleanup(State(service): State<RagService>) -> Result<Json<serde_json::Value>, ApiError> {
    let summary = service.cleanup().await?;
    Ok(Json(json!({
        "success": true,
        "collections_checked": summary.collections_checked,
        "collections_deleted": summary.collections_deleted,
        "deleted_collections": summary.deleted_collections,
        "errors": summary.errors,
    })))
}
