//! Seam traits implemented by the `rag` and `llm` crates, kept here so
//! the orchestrator and server crates can depend on the contract without
//! depending on the concrete backends.

use crate::domain::RankedChunk;
use crate::Result;
use async_trait::async_trait;

/// Options accepted by [`Retriever::retrieve`].
#[derive(Debug, Clone)]
pub struct RetrieveOptions {
    pub initial_k: usize,
    pub final_k: usize,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            initial_k: 8,
            final_k: 5,
        }
    }
}

/// The hybrid retrieval seam (C4). Implemented by
/// `ragsvc_rag::HybridRetriever`; consumed by the RAG engine and both
/// orchestrators without them knowing about vector stores or Tantivy.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(
        &self,
        collection_name: &str,
        query_text: &str,
        options: RetrieveOptions,
    ) -> Result<Vec<RankedChunk>>;
}

/// One delta of a streaming LLM response.
#[derive(Debug, Clone)]
pub enum GenerationDelta {
    Content(String),
    Thinking(String),
}

/// Options accepted by [`LanguageModel::complete`] / `stream`.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: usize,
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 4096,
            stop_sequences: Vec::new(),
        }
    }
}

/// The LLM client seam (C5). Implemented by `ragsvc_llm` backends.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        options: &GenerationOptions,
    ) -> Result<String>;

    /// Streams deltas through the bounded channel `tx`. Returns once the
    /// underlying transport has signalled completion; dropping the
    /// receiver end of `tx` is the cancellation signal.
    async fn stream(
        &self,
        system: &str,
        user: &str,
        options: &GenerationOptions,
        tx: tokio::sync::mpsc::Sender<GenerationDelta>,
    ) -> Result<()>;

    fn model_name(&self) -> &str;
}
