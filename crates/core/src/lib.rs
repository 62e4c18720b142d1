//! Shared domain types, error taxonomy, and seam traits for the hybrid
//! RAG service.
//!
//! This crate provides foundational types used across the `rag`, `llm`,
//! `orchestrator`, and `server` crates:
//! - The domain model (chunks, sources, requests, streaming events)
//! - The `Error` taxonomy each crate's own error enum bridges into
//! - The `Retriever` / `LanguageModel` seam traits
//! - The read-only collection registry

pub mod domain;
pub mod error;
pub mod registry;
pub mod traits;

pub use domain::{
    Chapter, Chunk, CollectionEntry, CourseDocument, Difficulty, QcmConversationState, QcmItem,
    RagRequest, RagResponse, RankedChunk, Source, StreamEvent, StreamEventKind,
};
pub use error::{Error, Result};
pub use registry::CollectionRegistry;
pub use traits::{GenerationDelta, GenerationOptions, LanguageModel, Retriever, RetrieveOptions};
