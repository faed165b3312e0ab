//! Document ingestion pipeline.
//!
//! Splits documents into overlapping chunks, embeds each chunk and stores it
//! in the vector index. Re-ingesting a source replaces its previous chunks.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use northstar_core::error::NorthstarError;

use crate::chunker::{chunk_text, CHUNK_OVERLAP, CHUNK_SIZE};
use crate::embedding::EmbeddingService;
use crate::index::{ChunkMeta, VectorIndex};

/// File extensions picked up by [`DocumentPipeline::ingest_directory`].
const INGEST_EXTENSIONS: &[&str] = &["txt", "md"];

/// Result of ingesting one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IngestResult {
    Stored { chunks: usize },
    Skipped { reason: String },
}

/// Totals for a directory ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub skipped: usize,
}

pub struct DocumentPipeline<E: EmbeddingService> {
    index: VectorIndex,
    embedder: E,
}

impl<E: EmbeddingService> DocumentPipeline<E> {
    pub fn new(index: VectorIndex, embedder: E) -> Self {
        Self { index, embedder }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Chunk, embed and index one document under `source`.
    pub async fn ingest_document(&self, source: &str, text: &str) -> Result<IngestResult, NorthstarError> {
        let chunks = chunk_text(text, CHUNK_SIZE, CHUNK_OVERLAP);
        if chunks.is_empty() {
            return Ok(IngestResult::Skipped {
                reason: "document has no text".to_string(),
            });
        }

        let replaced = self.index.remove_source(source)?;
        if replaced > 0 {
            debug!(source, replaced, "Replacing previously indexed chunks");
        }

        let count = chunks.len();
        for (chunk_index, chunk) in chunks.into_iter().enumerate() {
            let embedding = self.embedder.embed(&chunk).await?;
            self.index.insert(
                Uuid::new_v4(),
                embedding,
                ChunkMeta {
                    source: source.to_string(),
                    chunk_index,
                    text: chunk,
                },
            )?;
        }

        debug!(source, chunks = count, "Document indexed");
        Ok(IngestResult::Stored { chunks: count })
    }

    /// Ingest every `.txt` and `.md` file under `dir`, recursively.
    ///
    /// A missing directory yields an empty report. Unreadable files are
    /// skipped with a warning.
    pub async fn ingest_directory(&self, dir: &Path) -> Result<IngestReport, NorthstarError> {
        let mut report = IngestReport::default();
        if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
            info!(dir = %dir.display(), "Documents directory missing, nothing to ingest");
            return Ok(report);
        }

        for path in collect_documents(dir).await? {
            let source = relative_source(dir, &path);
            let text = match tokio::fs::read_to_string(&path).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable document");
                    report.skipped += 1;
                    continue;
                }
            };
            match self.ingest_document(&source, &text).await? {
                IngestResult::Stored { chunks } => {
                    report.documents += 1;
                    report.chunks += chunks;
                }
                IngestResult::Skipped { reason } => {
                    debug!(source, reason, "Document skipped");
                    report.skipped += 1;
                }
            }
        }

        info!(
            documents = report.documents,
            chunks = report.chunks,
            skipped = report.skipped,
            "Document ingestion complete"
        );
        Ok(report)
    }
}

fn has_ingest_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| INGEST_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

/// Path relative to `root` with `/` separators.
fn relative_source(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// All ingestible files under `root`, sorted for a stable ingestion order.
async fn collect_documents(root: &Path) -> Result<Vec<PathBuf>, NorthstarError> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() && has_ingest_extension(&path) {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}
