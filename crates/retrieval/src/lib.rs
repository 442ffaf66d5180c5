//! Catalog retrieval with a persisted vector index
//!
//! Features:
//! - Delimited catalog loading with required-column validation
//! - Weighted composed text per record as the embedding input
//! - Dense vector search via Qdrant (in-memory index for tests)
//! - Content-fingerprinted index lifecycle: reuse, rebuild, dimension checks
//! - Keyword-aware reranking on top of cosine similarity

pub mod catalog;
pub mod embeddings;
pub mod index;
pub mod retriever;
pub mod vector_index;

pub use catalog::{Catalog, CatalogRecord};
pub use embeddings::{EmbeddingConfig, HashEmbedder, TextEmbedder};
#[cfg(feature = "onnx")]
pub use embeddings::OnnxEmbedder;
pub use index::{BuildOutcome, CatalogIndex, CatalogIndexConfig};
pub use retriever::{Retriever, RetrieverConfig, SearchResult};
pub use vector_index::{
    IndexInfo, IndexPoint, MemoryIndex, QdrantIndex, ScoredPoint, VectorIndex,
};

use thiserror::Error;

/// Retrieval errors
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Catalog schema error: {0}")]
    Schema(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Index not built yet")]
    IndexUnavailable,

    #[error("Connection error: {0}")]
    Connection(String),
}

impl From<RetrievalError> for policy_voice_core::Error {
    fn from(err: RetrievalError) -> Self {
        policy_voice_core::Error::Retrieval(err.to_string())
    }
}
