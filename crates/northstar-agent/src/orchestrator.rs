//! Agent orchestrator: the per-query pipeline.
//!
//! validate -> (classify then records || load history || search) -> assemble
//! -> synthesize -> persist. Only a malformed request is returned as an
//! error; every downstream failure degrades to a weaker answer.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use northstar_core::config::{NorthstarConfig, MAX_QUERY_CHARS};
use northstar_core::types::{Answer, Query, Turn};
use northstar_core::{ConversationStore, Generation, RecordStore, SemanticSearch};

use crate::augment::ContextAugmenter;
use crate::error::AgentError;
use crate::retrieval::RetrievalCoordinator;
use crate::router::IntentRouter;
use crate::session::SessionManager;
use crate::synthesis::SynthesisEngine;

pub struct AgentOrchestrator {
    router: IntentRouter,
    retrieval: RetrievalCoordinator,
    augmenter: ContextAugmenter,
    synthesis: SynthesisEngine,
    sessions: SessionManager,
}

impl AgentOrchestrator {
    pub fn new(
        router: IntentRouter,
        retrieval: RetrievalCoordinator,
        augmenter: ContextAugmenter,
        synthesis: SynthesisEngine,
        sessions: SessionManager,
    ) -> Self {
        Self {
            router,
            retrieval,
            augmenter,
            synthesis,
            sessions,
        }
    }

    /// Wire every stage from configuration and the four capabilities.
    pub fn from_config(
        config: &NorthstarConfig,
        records: Arc<dyn RecordStore>,
        search: Arc<dyn SemanticSearch>,
        generation: Arc<dyn Generation>,
        conversations: Arc<dyn ConversationStore>,
    ) -> Self {
        Self::new(
            IntentRouter::new(generation.clone(), config.router.clone()),
            RetrievalCoordinator::new(records, config.retrieval.clone()),
            ContextAugmenter::new(search, config.context.clone()),
            SynthesisEngine::new(generation, config.synthesis.clone()),
            SessionManager::new(conversations, config.storage.persist_timeout_ms),
        )
    }

    /// Answer one query and record the exchange in its session.
    pub async fn handle(&self, query: Query) -> Result<Answer, AgentError> {
        let started = Instant::now();

        validate_query(&query.raw_text)?;
        let session_id = SessionManager::resolve_session_id(query.session_id.as_deref())?;
        let raw_text = query.raw_text.as_str();

        // Search needs no intents, so it runs alongside classification.
        let search = self.augmenter.search(raw_text);
        let classify_then_gather = async {
            let intents = self.router.classify(raw_text).await;
            let structured = self.retrieval.gather(&intents, raw_text).await;
            (intents, structured)
        };
        let ((intents, structured), conversation, search) = tokio::join!(
            classify_then_gather,
            self.sessions.load(&session_id),
            search,
        );
        let passages = search.unwrap_or_else(|e| {
            warn!(session_id = %session_id, error = %e, "Continuing with structured evidence only");
            Vec::new()
        });

        let bundle = self
            .augmenter
            .assemble(&session_id, raw_text, structured, passages, &conversation);
        let answer = self.synthesis.synthesize(&bundle).await;

        let (user, assistant) = SessionManager::new_turns(&conversation, raw_text, &answer.text);
        if let Err(e) = self.sessions.append(conversation, user, assistant).await {
            error!(session_id = %session_id, error = %e, "Failed to persist conversation turns");
        }

        info!(
            session_id = %session_id,
            intents = ?intents.iter().map(|i| i.kind.label()).collect::<Vec<_>>(),
            used_model = %answer.used_model,
            evidence = answer.evidence_refs.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Query handled"
        );

        Ok(answer)
    }

    /// Stored turns for a session, oldest first.
    pub async fn history(&self, session_id: &str) -> Result<Vec<Turn>, AgentError> {
        let session_id = SessionManager::resolve_session_id(Some(session_id))?;
        self.sessions.history(&session_id).await
    }
}

/// Reject empty, blank or oversized query text.
pub fn validate_query(raw_text: &str) -> Result<(), AgentError> {
    if raw_text.trim().is_empty() {
        return Err(AgentError::MalformedRequest("query must not be empty".to_string()));
    }
    let chars = raw_text.chars().count();
    if chars > MAX_QUERY_CHARS {
        return Err(AgentError::MalformedRequest(format!(
            "query exceeds {} characters ({})",
            MAX_QUERY_CHARS, chars
        )));
    }
    Ok(())
}
