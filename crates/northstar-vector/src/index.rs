//! In-memory vector index with brute-force cosine similarity search.
//!
//! Each entry carries the chunk text and where it came from. Search is O(n),
//! which is fine for a policy-guide sized corpus.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use northstar_core::error::NorthstarError;

/// Where an indexed chunk came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    /// Document path relative to the documents directory.
    pub source: String,
    pub chunk_index: usize,
    pub text: String,
}

impl ChunkMeta {
    /// `"<source>#<chunk_index>"`, the passage reference shown to callers.
    pub fn source_ref(&self) -> String {
        format!("{}#{}", self.source, self.chunk_index)
    }
}

/// A single hit returned from a vector search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: Uuid,
    /// Cosine similarity clamped to [0, 1].
    pub score: f64,
    pub meta: ChunkMeta,
}

#[derive(Debug, Clone)]
struct VectorEntry {
    embedding: Vec<f32>,
    meta: ChunkMeta,
}

/// In-memory vector index. Thread-safe via interior RwLock.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    entries: Arc<RwLock<HashMap<Uuid, VectorEntry>>>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a vector with its chunk metadata. Overwrites an existing id.
    pub fn insert(&self, id: Uuid, embedding: Vec<f32>, meta: ChunkMeta) -> Result<(), NorthstarError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| NorthstarError::Search(format!("Lock poisoned: {}", e)))?;
        entries.insert(id, VectorEntry { embedding, meta });
        Ok(())
    }

    /// The `k` nearest entries by cosine similarity, best first.
    ///
    /// Equal scores are ordered by source and chunk index so results are
    /// stable regardless of map iteration order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, NorthstarError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| NorthstarError::Search(format!("Lock poisoned: {}", e)))?;

        let mut scored: Vec<SearchHit> = entries
            .iter()
            .map(|(id, entry)| SearchHit {
                id: *id,
                score: cosine_similarity(query, &entry.embedding).clamp(0.0, 1.0),
                meta: entry.meta.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.meta.source.cmp(&b.meta.source))
                .then_with(|| a.meta.chunk_index.cmp(&b.meta.chunk_index))
        });
        scored.truncate(k);

        Ok(scored)
    }

    /// Remove every chunk of `source`. Returns how many were removed.
    pub fn remove_source(&self, source: &str) -> Result<usize, NorthstarError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| NorthstarError::Search(format!("Lock poisoned: {}", e)))?;
        let before = entries.len();
        entries.retain(|_, entry| entry.meta.source != source);
        Ok(before - entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cosine similarity; 0.0 for mismatched lengths or zero-magnitude vectors.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
