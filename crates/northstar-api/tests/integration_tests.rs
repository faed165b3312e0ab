//! Integration tests for the NorthStar API.
//!
//! Each test builds its own router over in-memory stores and drives it with
//! `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use northstar_agent::{AgentOrchestrator, DisabledGeneration};
use northstar_api::create_router;
use northstar_api::handlers::{HealthResponse, HistoryResponse};
use northstar_api::state::AppState;
use northstar_core::config::NorthstarConfig;
use northstar_core::error::GenerationError;
use northstar_core::types::{
    GenerationRequest, GenerationResponse, QueryResponse, RecordKind, Role, UsedModel,
};
use northstar_core::Generation;
use northstar_storage::{MemoryConversationStore, MemoryRecordStore};
use northstar_vector::{DocumentPipeline, HashEmbedding, VectorIndex, VectorSearch};

// =============================================================================
// Helpers
// =============================================================================

/// Answers every synthesis prompt with a fixed line; classification fails.
struct FixedAnswer;

#[async_trait]
impl Generation for FixedAnswer {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        if request.prompt.starts_with("Classify") {
            return Err(GenerationError::Transport("offline".into()));
        }
        Ok(GenerationResponse {
            text: "Your claim CLM-003C7AFB is submitted.".into(),
        })
    }
}

async fn make_state(generation: Arc<dyn Generation>) -> AppState {
    let config = NorthstarConfig::default();
    let records = MemoryRecordStore::new().with_record(
        RecordKind::Claim,
        "CLM-003C7AFB",
        json!({"claim_id": "CLM-003C7AFB", "status": "submitted", "estimated_damage": 14089}),
    );

    let index = VectorIndex::new();
    let pipeline = DocumentPipeline::new(index.clone(), HashEmbedding::new());
    pipeline
        .ingest_document(
            "claims-faq.md",
            "Claims are reviewed by an adjuster within five business days of submission.",
        )
        .await
        .unwrap();
    let search = VectorSearch::new(index.clone(), HashEmbedding::new());

    let orchestrator = AgentOrchestrator::from_config(
        &config,
        Arc::new(records),
        Arc::new(search),
        generation,
        Arc::new(MemoryConversationStore::new()),
    );
    AppState::new(orchestrator, index, config.general.port)
}

async fn make_app() -> axum::Router {
    create_router(make_state(Arc::new(FixedAnswer)).await)
}

fn post_json(uri: &str, json: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

/// Read full response body bytes.
async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_reports_index_size() {
    let app = make_app().await;
    let resp = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let health: HealthResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.version, "0.1.0");
    assert_eq!(health.indexed_passages, 1);
}

// =============================================================================
// POST /query
// =============================================================================

#[tokio::test]
async fn test_query_happy_path() {
    let app = make_app().await;
    let resp = app
        .oneshot(post_json(
            "/query",
            r#"{"query": "What is the status of CLM-003C7AFB?", "session_id": "s-1"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body: QueryResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(body.session_id, "s-1");
    assert_eq!(body.used_model, UsedModel::Primary);
    assert!(body.answer.contains("submitted"));
    assert!(body.evidence_refs.contains(&"claim:CLM-003C7AFB".to_string()));
}

#[tokio::test]
async fn test_query_generates_session_id() {
    let app = make_app().await;
    let resp = app
        .oneshot(post_json("/query", r#"{"query": "How are claims reviewed?"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    let session_id = body["session_id"].as_str().unwrap();
    assert_eq!(session_id.len(), 36);
}

#[tokio::test]
async fn test_query_without_generation_still_answers() {
    let app = create_router(make_state(Arc::new(DisabledGeneration)).await);
    let resp = app
        .oneshot(post_json("/query", r#"{"query": "status of CLM-003C7AFB"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body: QueryResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(body.used_model, UsedModel::None);
    assert!(body.answer.contains("CLM-003C7AFB"));
}

#[tokio::test]
async fn test_query_empty_text_is_bad_request() {
    for payload in [r#"{"query": ""}"#, r#"{"query": "   "}"#, r#"{}"#] {
        let app = make_app().await;
        let resp = app.oneshot(post_json("/query", payload)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "payload {}", payload);

        let body: Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(body["error"], "bad_request");
        assert!(body["message"].as_str().is_some());
    }
}

#[tokio::test]
async fn test_query_too_long_is_bad_request() {
    let app = make_app().await;
    let payload = json!({"query": "a".repeat(2001)}).to_string();
    let resp = app.oneshot(post_json("/query", &payload)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_query_invalid_json_rejected() {
    let app = make_app().await;
    let resp = app.oneshot(post_json("/query", "{not json")).await.unwrap();
    assert!(resp.status().is_client_error());
}

#[tokio::test]
async fn test_query_body_limit() {
    let app = make_app().await;
    let payload = json!({"query": "a".repeat(70 * 1024)}).to_string();
    let resp = app.oneshot(post_json("/query", &payload)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

// =============================================================================
// GET /sessions/{id}/history
// =============================================================================

#[tokio::test]
async fn test_history_after_query() {
    let app = make_app().await;

    let resp = app
        .clone()
        .oneshot(post_json(
            "/query",
            r#"{"query": "status of CLM-003C7AFB", "session_id": "hist-1"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.oneshot(get("/sessions/hist-1/history")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let history: HistoryResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(history.session_id, "hist-1");
    assert_eq!(history.turns.len(), 2);
    assert_eq!(history.turns[0].role, Role::User);
    assert_eq!(history.turns[0].text, "status of CLM-003C7AFB");
    assert_eq!(history.turns[1].role, Role::Assistant);
}

#[tokio::test]
async fn test_history_unknown_session_is_empty() {
    let app = make_app().await;
    let resp = app.oneshot(get("/sessions/nobody/history")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let history: HistoryResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert!(history.turns.is_empty());
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = make_app().await;
    let resp = app.oneshot(get("/nope")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
