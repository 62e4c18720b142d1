//! Centralized defaults for the hybrid RAG service.
//!
//! Domain-agnostic only: service endpoints, timeouts, and retrieval/
//! generation tuning knobs. Nothing here is specific to a single
//! collection or customer; per-collection behavior lives entirely in the
//! collection registry file.

/// Service endpoints (env-overridable via the `Settings` loader, these
/// are just the fallback defaults used when no env var / config file
/// supplies a value).
pub mod endpoints {
    pub const QDRANT_DEFAULT: &str = "http://127.0.0.1:6333";
    pub const EMBEDDING_DEFAULT: &str = "http://localhost:11434/api/embeddings";
    pub const LLM_DEFAULT: &str = "http://localhost:11434";
    pub const FILESERVER_INTERNAL_DEFAULT: &str = "http://fileserver.internal:9000";
    pub const FILESERVER_PUBLIC_DEFAULT: &str = "https://files.example.com";
    /// Base directory holding one on-disk Tantivy index per
    /// `lexical_index_id` named in the collection registry.
    pub const LEXICAL_INDEX_DIR_DEFAULT: &str = "data/lexical_indexes";
    /// Which `ragsvc_llm` backend to construct at startup: `"ollama"` or
    /// `"openai"`.
    pub const LLM_BACKEND_DEFAULT: &str = "ollama";
}

/// Timeouts, in milliseconds unless noted.
pub mod timeouts {
    pub const RETRIEVAL_MS: u64 = 10_000;
    pub const LLM_NON_STREAMING_MS: u64 = 60_000;
    pub const COURSE_TOTAL_SECS: u64 = 600;
    pub const QCM_TOTAL_SECS: u64 = 300;
    pub const HEARTBEAT_SECS: u64 = 10;
}

/// Hybrid retriever defaults.
pub mod retriever {
    pub const INITIAL_K: usize = 8;
    pub const FINAL_K: usize = 5;
    pub const BM25_WEIGHT: f32 = 0.5;
    pub const VECTOR_WEIGHT: f32 = 0.5;
    pub const RRF_K: f32 = 60.0;
    pub const VECTOR_TOP_K_DEFAULT: usize = 8;
    pub const BM25_K1: f32 = 1.2;
    pub const BM25_B: f32 = 0.75;
}

/// RAG engine defaults.
pub mod rag {
    pub const DEFAULT_TOP_K: usize = 5;
    pub const TEMPERATURE: f32 = 0.7;
    pub const MAX_TOKENS: usize = 4096;
    /// Characters per artificially re-chunked streaming delta; tunable
    /// knob, not a hardcoded contract (see design notes).
    pub const STREAM_CHUNK_SIZE: usize = 5;
    pub const STREAM_CHUNK_DELAY_MS: u64 = 10;
    pub const CITATION_LOOKAHEAD_BOUND: usize = 64;
}

/// Course orchestrator defaults.
pub mod course {
    pub const RETRIEVER_TOP_K: usize = 5;
    pub const ENHANCER_ITERATIONS: usize = 3;
    pub const ENHANCER_TOP_K: usize = 5;
    pub const MAX_TOKENS: usize = 8000;
}

/// QCM orchestrator defaults.
pub mod qcm {
    pub const RETRIEVER_TOP_K: usize = 15;
    pub const ANSWER_TOP_K: usize = 5;
    pub const MAX_TOKENS: usize = 8000;
    pub const MIN_COUNT: usize = 1;
    pub const MAX_COUNT: usize = 50;
}
