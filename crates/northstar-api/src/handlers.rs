//! Route handler functions for the API endpoints.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use northstar_core::types::{QueryRequest, QueryResponse, Turn};

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub turns: Vec<Turn>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub indexed_passages: u64,
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /query - answer one query within a session.
pub async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let answer = state.orchestrator.handle(request.into()).await?;
    Ok(Json(answer.into()))
}

/// GET /sessions/{id}/history - stored turns, empty for unknown sessions.
pub async fn session_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let turns = state.orchestrator.history(&session_id).await?;
    Ok(Json(HistoryResponse {
        session_id: session_id.trim().to_string(),
        turns,
    }))
}

/// GET /health - liveness plus index size.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        indexed_passages: state.vector_index.len() as u64,
    })
}
