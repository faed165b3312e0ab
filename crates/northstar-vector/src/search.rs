//! `SemanticSearch` over the local vector index.

use async_trait::async_trait;
use tracing::debug;

use northstar_core::error::CapabilityError;
use northstar_core::types::{Passage, SearchRequest};
use northstar_core::SemanticSearch;

use crate::embedding::{DynEmbeddingService, EmbeddingService};
use crate::index::VectorIndex;

/// Embeds the query text and returns the nearest indexed chunks as passages.
pub struct VectorSearch {
    index: VectorIndex,
    embedder: Box<dyn DynEmbeddingService>,
}

impl VectorSearch {
    pub fn new(index: VectorIndex, embedder: impl EmbeddingService + 'static) -> Self {
        Self {
            index,
            embedder: Box::new(embedder),
        }
    }
}

#[async_trait]
impl SemanticSearch for VectorSearch {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Passage>, CapabilityError> {
        if request.top_k == 0 || request.query_text.trim().is_empty() || self.index.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed_boxed(&request.query_text).await?;
        let hits = self.index.search(&query_vec, request.top_k)?;
        debug!(hits = hits.len(), top_k = request.top_k, "Vector search complete");

        Ok(hits
            .into_iter()
            .map(|hit| Passage {
                source_ref: hit.meta.source_ref(),
                score: hit.score as f32,
                text: hit.meta.text,
            })
            .collect())
    }
}
