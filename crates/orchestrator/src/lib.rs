//! RAG engine and multi-agent orchestration (C6-C9): knowledge-base
//! prompt assembly and streaming citation rewrite for single-turn RAG
//! (C6/C7), and the course and QCM orchestrators built on top of it
//! (C8/C9).

pub mod citation;
pub mod course;
pub mod fileserver;
pub mod qcm;
pub mod rag_engine;
pub mod state_manager;
mod text_utils;

pub use citation::{format_citations, rewrite_inline_citations, rewrite_inline_citations_into};
pub use course::CourseOrchestrator;
pub use fileserver::FileserverClient;
pub use qcm::QcmOrchestrator;
pub use rag_engine::stream_rag;
pub use state_manager::{advance, UserIntent};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("generation failed: {0}")]
    Generation(String),

    #[error("malformed llm output: {0}")]
    MalformedOutput(String),

    #[error("fileserver upload failed: {0}")]
    Upload(String),
}

impl From<OrchestratorError> for ragsvc_core::Error {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Upload(msg) => ragsvc_core::Error::FileserverFailure(msg),
            other => ragsvc_core::Error::Orchestrator(other.to_string()),
        }
    }
}
