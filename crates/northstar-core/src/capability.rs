//! Capability traits for the external collaborators of the agent.
//!
//! Every boundary the orchestrator talks to is one of these traits, so the
//! concrete transport (HTTP, SQLite, local files, in-memory) can be swapped
//! without touching pipeline logic. Implementations must be safe to share
//! across concurrent requests.

use async_trait::async_trait;

use crate::error::{CapabilityError, GenerationError};
use crate::types::{
    GenerationRequest, GenerationResponse, Passage, RecordRequest, RecordResponse, SearchRequest,
    Turn,
};

/// Structured record lookup (policy, claim, document rule).
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Look up one record. A missing record is `Ok` with `found == false`.
    async fn lookup(&self, request: &RecordRequest) -> Result<RecordResponse, CapabilityError>;
}

/// Free-text search over indexed documents.
#[async_trait]
pub trait SemanticSearch: Send + Sync {
    /// Return up to `top_k` passages ordered by descending score.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Passage>, CapabilityError>;
}

/// Text generation backend addressed by model selector.
#[async_trait]
pub trait Generation: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError>;
}

/// Keyed append-only conversation history.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// All turns for the session, oldest first. Unknown sessions are empty.
    async fn get(&self, session_id: &str) -> Result<Vec<Turn>, CapabilityError>;

    /// Append `turns` atomically: either all are stored or none are.
    async fn put(&self, session_id: &str, turns: &[Turn]) -> Result<(), CapabilityError>;
}
