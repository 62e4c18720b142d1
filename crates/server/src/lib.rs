//! Hybrid RAG Service HTTP Server
//!
//! Axum router exposing an OpenAI-compatible chat-completions surface
//! over three features (`/rag`, `/course`, `/qcm`), backed by the
//! retrieval/LLM seams in `ragsvc-rag`/`ragsvc-llm` and the orchestration
//! pipelines in `ragsvc-orchestrator`.

pub mod auth;
pub mod http;
pub mod state;
pub mod stream;

pub use auth::auth_middleware;
pub use http::create_router;
pub use state::AppState;

use thiserror::Error;

/// Server-layer errors: request validation/transport concerns that sit
/// above `ragsvc_core::Error` (which covers the retrieval/generation
/// domain itself).
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("authentication error: {0}")]
    Auth(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Auth(_) => axum::http::StatusCode::UNAUTHORIZED,
            ServerError::InvalidRequest(_) => axum::http::StatusCode::BAD_REQUEST,
        }
    }
}

/// Maps a domain error to the pre-stream HTTP status code it should
/// surface as, per the error taxonomy (§7). Errors that occur mid-stream
/// never reach this path — they go in-band via `stream::to_sse_stream`.
pub fn status_for(err: &ragsvc_core::Error) -> axum::http::StatusCode {
    use axum::http::StatusCode;
    use ragsvc_core::Error;

    match err {
        Error::UnknownCollection(_) | Error::MalformedRequest(_) => StatusCode::BAD_REQUEST,
        Error::AuthMissing | Error::AuthInvalid => StatusCode::UNAUTHORIZED,
        Error::RetrievalUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
