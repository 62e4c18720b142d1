//! Shared error type for the hybrid RAG service
//!
//! Each crate defines its own `thiserror` error enum for its domain and
//! bridges it into `Error` via `From`. HTTP handlers match on `Error`
//! variants to pick a status code or an in-band stream message (see
//! the error taxonomy table in the spec).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    #[error("missing bearer token")]
    AuthMissing,

    #[error("invalid bearer token")]
    AuthInvalid,

    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("embedding failure: {0}")]
    EmbeddingFailure(String),

    #[error("llm failure: {0}")]
    LlmFailure(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("fileserver failure: {0}")]
    FileserverFailure(String),

    #[error("rag error: {0}")]
    Rag(String),

    #[error("llm error: {0}")]
    Llm(String),

    #[error("orchestrator error: {0}")]
    Orchestrator(String),

    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error should degrade gracefully in-band on a stream
    /// that has already started, rather than fail the request up front.
    pub fn is_mid_stream_recoverable(&self) -> bool {
        matches!(
            self,
            Error::LlmFailure(_)
                | Error::DeadlineExceeded(_)
                | Error::FileserverFailure(_)
                | Error::RetrievalUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
