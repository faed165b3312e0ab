//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use northstar_agent::AgentOrchestrator;
use northstar_vector::VectorIndex;

/// Shared application state. Cloned per request; every field is a handle.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<AgentOrchestrator>,
    /// Passage index, reported by the health check.
    pub vector_index: VectorIndex,
    /// Port the server listens on, used for the CORS origin list.
    pub port: u16,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(orchestrator: AgentOrchestrator, vector_index: VectorIndex, port: u16) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            vector_index,
            port,
            start_time: Instant::now(),
        }
    }
}
