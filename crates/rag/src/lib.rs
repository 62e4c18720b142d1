//! Hybrid retrieval: dense vector search (C2) + BM25 lexical search (C3)
//! fused by Reciprocal Rank Fusion (C4), with French query-side
//! lemmatization (C1) matching the ingestion-side indexing vocabulary.

pub mod lemmatizer;
pub mod retriever;
pub mod sparse_search;
pub mod vector_store;

pub use lemmatizer::Lemmatizer;
pub use retriever::HybridRetriever;
pub use sparse_search::{LexicalHit, LexicalIndex, LexicalSearchClient};
pub use vector_store::{VectorHit, VectorSearchClient, VectorSearchConfig};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("search error: {0}")]
    Search(String),

    #[error("index error: {0}")]
    Index(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("connection error: {0}")]
    Connection(String),
}

impl From<RagError> for ragsvc_core::Error {
    fn from(err: RagError) -> Self {
        ragsvc_core::Error::Rag(err.to_string())
    }
}
