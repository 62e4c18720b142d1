//! LLM Client (C5): a unified streaming/non-streaming interface over a
//! local Ollama-style backend and a remote OpenAI-compatible backend,
//! implementing `ragsvc_core::traits::LanguageModel`.

pub mod backend;
pub mod prompt;

pub use backend::{BackendConfig, OllamaBackend, OpenAiBackend};
pub use prompt::{build_knowledge_base, rag_system_prompt, Message, PromptBuilder, Role};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("timeout")]
    Timeout,

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<LlmError> for ragsvc_core::Error {
    fn from(err: LlmError) -> Self {
        ragsvc_core::Error::Llm(err.to_string())
    }
}
