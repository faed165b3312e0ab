//! NorthStar Vector crate - document chunking, hashed embeddings, vector index and search.
//!
//! Provides the local semantic search backend: documents are chunked and
//! embedded at ingestion, kept in an in-memory cosine-similarity index, and
//! queried through the `SemanticSearch` capability.

pub mod chunker;
pub mod embedding;
pub mod index;
pub mod ingest;
pub mod search;

pub use chunker::{chunk_text, CHUNK_OVERLAP, CHUNK_SIZE};
pub use embedding::{DynEmbeddingService, EmbeddingService, HashEmbedding};
pub use index::{ChunkMeta, SearchHit, VectorIndex};
pub use ingest::{DocumentPipeline, IngestReport, IngestResult};
pub use search::VectorSearch;
