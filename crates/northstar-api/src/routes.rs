//! Router setup with all API routes and middleware.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use northstar_core::error::NorthstarError;

use crate::handlers;
use crate::state::AppState;

/// Request bodies are a query plus a session id.
const BODY_LIMIT: usize = 64 * 1024;

/// Localhost origins on the configured port.
fn localhost_origins(port: u16) -> Vec<HeaderValue> {
    ["127.0.0.1", "localhost"]
        .iter()
        .filter_map(|host| format!("http://{}:{}", host, port).parse::<HeaderValue>().ok())
        .collect()
}

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(localhost_origins(state.port)))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/query", post(handlers::query))
        .route("/sessions/{id}/history", get(handlers::session_history))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on 127.0.0.1 at the state's port.
pub async fn start_server(state: AppState) -> Result<(), NorthstarError> {
    let addr = format!("127.0.0.1:{}", state.port);
    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| NorthstarError::Api(format!("Failed to bind: {}", e)))?;

    axum::serve(listener, router)
        .await
        .map_err(|e| NorthstarError::Api(format!("Server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_localhost_origins() {
        let origins = localhost_origins(3040);
        assert_eq!(origins.len(), 2);
        assert_eq!(origins[0], "http://127.0.0.1:3040");
        assert_eq!(origins[1], "http://localhost:3040");
    }
}
