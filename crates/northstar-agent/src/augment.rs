//! Context augmenter.
//!
//! Runs semantic search on every query and merges the passages with the
//! structured evidence and recent history into a bundle that never exceeds
//! the character budget.
//!
//! Eviction order when over budget:
//! 1. lowest-scoring passage
//! 2. oldest history turn
//! 3. not-found / unavailable records, last first
//! 4. found records, last first
//!
//! A query longer than the whole budget is truncated.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use northstar_core::config::ContextConfig;
use northstar_core::error::CapabilityError;
use northstar_core::types::{ContextBundle, Conversation, EvidenceItem, Passage, SearchRequest};
use northstar_core::SemanticSearch;

use crate::error::AgentError;

pub struct ContextAugmenter {
    search: Arc<dyn SemanticSearch>,
    config: ContextConfig,
}

impl ContextAugmenter {
    pub fn new(search: Arc<dyn SemanticSearch>, config: ContextConfig) -> Self {
        Self { search, config }
    }

    /// Semantic search on the raw query, bounded by the search timeout.
    pub async fn search(&self, raw_text: &str) -> Result<Vec<Passage>, AgentError> {
        let request = SearchRequest {
            query_text: raw_text.to_string(),
            top_k: self.config.top_k,
        };
        let timeout = Duration::from_millis(self.config.search_timeout_ms);
        match tokio::time::timeout(timeout, self.search.search(&request)).await {
            Ok(Ok(passages)) => Ok(passages),
            Ok(Err(e)) => Err(AgentError::SearchUnavailable(e.to_string())),
            Err(_) => Err(AgentError::SearchUnavailable(
                CapabilityError::Timeout(self.config.search_timeout_ms).to_string(),
            )),
        }
    }

    /// Search, then assemble. A failed search yields a bundle built from
    /// structured evidence only.
    pub async fn augment(
        &self,
        session_id: &str,
        raw_text: &str,
        structured: Vec<EvidenceItem>,
        conversation: &Conversation,
    ) -> ContextBundle {
        let passages = match self.search(raw_text).await {
            Ok(passages) => passages,
            Err(e) => {
                warn!(session_id, error = %e, "Continuing with structured evidence only");
                Vec::new()
            }
        };
        self.assemble(session_id, raw_text, structured, passages, conversation)
    }

    /// Build the bundle. Deterministic for the same inputs.
    pub fn assemble(
        &self,
        session_id: &str,
        raw_text: &str,
        structured: Vec<EvidenceItem>,
        passages: Vec<Passage>,
        conversation: &Conversation,
    ) -> ContextBundle {
        let budget = self.config.max_chars;
        let passages = self.select_passages(&structured, passages);

        let query: String = raw_text.chars().take(budget).collect();

        let mut evidence = structured;
        evidence.extend(passages.into_iter().map(EvidenceItem::Passage));

        let mut bundle = ContextBundle {
            session_id: session_id.to_string(),
            query,
            evidence,
            history: conversation.recent(self.config.history_turns).to_vec(),
            budget,
            evicted: 0,
        };
        evict_to_budget(&mut bundle);

        debug!(
            session_id,
            size = bundle.size(),
            budget,
            structured = bundle.structured().count(),
            passages = bundle.passages().count(),
            history = bundle.history.len(),
            evicted = bundle.evicted,
            "Context bundle assembled"
        );
        bundle
    }

    /// Threshold, drop passages restating a found record, order by score
    /// (ties by source), keep `top_k`.
    fn select_passages(&self, structured: &[EvidenceItem], passages: Vec<Passage>) -> Vec<Passage> {
        let found_keys: Vec<String> = structured
            .iter()
            .filter(|e| e.is_found_record())
            .filter_map(|e| match e {
                EvidenceItem::Record { key, .. } => Some(key.to_lowercase()),
                EvidenceItem::Passage(_) => None,
            })
            .collect();

        let mut kept: Vec<Passage> = passages
            .into_iter()
            .filter(|p| !p.score.is_nan() && p.score >= self.config.relevance_threshold)
            .filter(|p| {
                let text = p.text.to_lowercase();
                !found_keys.iter().any(|key| text.contains(key.as_str()))
            })
            .collect();

        kept.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.source_ref.cmp(&b.source_ref))
        });
        kept.truncate(self.config.top_k);
        kept
    }
}

/// Drop items in eviction order until the bundle fits its budget.
fn evict_to_budget(bundle: &mut ContextBundle) {
    let mut size = bundle.size();
    while size > bundle.budget {
        let removed = if let Some(idx) = lowest_passage(&bundle.evidence) {
            bundle.evidence.remove(idx).size()
        } else if !bundle.history.is_empty() {
            bundle.history.remove(0).text.chars().count()
        } else if let Some(idx) = bundle.evidence.iter().rposition(|e| !e.is_found_record()) {
            bundle.evidence.remove(idx).size()
        } else if let Some(item) = bundle.evidence.pop() {
            item.size()
        } else {
            break;
        };
        size -= removed;
        bundle.evicted += 1;
    }
}

/// Index of the passage evicted first: lowest score, last in order on ties.
fn lowest_passage(evidence: &[EvidenceItem]) -> Option<usize> {
    let mut lowest: Option<(usize, f32)> = None;
    for (idx, item) in evidence.iter().enumerate() {
        if let EvidenceItem::Passage(p) = item {
            match lowest {
                Some((_, score)) if p.score > score => {}
                _ => lowest = Some((idx, p.score)),
            }
        }
    }
    lowest.map(|(idx, _)| idx)
}
