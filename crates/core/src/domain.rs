//! Retrieval and generation data model shared across crates.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named retrieval scope backed by a paired vector index and lexical
/// index. Loaded once into the [`crate::registry::CollectionRegistry`]
/// at startup; never mutated at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionEntry {
    pub vector_index_id: String,
    pub lexical_index_id: String,
}

/// An atomic retrievable unit, joinable across the vector and lexical
/// stores by `point_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable unique identifier, equal across vector and lexical indexes
    /// for the same chunk.
    pub point_id: String,
    pub text: String,
    pub title: String,
    /// Canonical URL; may be a fileserver-internal URL requiring
    /// public-URL rewriting before it reaches a client.
    pub source_url: Option<String>,
    /// Ordered heading labels from document root to this chunk.
    pub section_path: Vec<String>,
    pub token_count: usize,
    pub extra_tags: HashMap<String, String>,
}

impl Chunk {
    pub fn section_path_joined(&self) -> String {
        self.section_path.join(" / ")
    }
}

/// A [`Chunk`] decorated with its per-backend ranks and fused RRF score.
/// Ranks are `None` when the chunk appeared in only one backend's result
/// list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedChunk {
    #[serde(flatten)]
    pub chunk: Chunk,
    pub bm25_rank: Option<usize>,
    pub vector_rank: Option<usize>,
    pub fused_score: f32,
}

/// A deduplicated, user-facing view of a chunk that was cited in an
/// answer. `sequence_number` is assigned in first-citation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub sequence_number: usize,
    pub title: String,
    pub url: Option<String>,
    pub snippet: String,
}

/// Inbound RAG query.
#[derive(Debug, Clone, Deserialize)]
pub struct RagRequest {
    pub collection_name: String,
    pub query_text: String,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub stream: Option<bool>,
}

impl RagRequest {
    /// Clamp `top_k` to `[1, 100]`, falling back to `default_top_k` when
    /// unset. Returns `MalformedRequest` if an explicit `top_k` of 0 was
    /// supplied (rejected rather than silently clamped up).
    pub fn resolved_top_k(&self, default_top_k: usize) -> crate::Result<usize> {
        match self.top_k {
            None => Ok(default_top_k.clamp(1, 100)),
            Some(0) => Err(crate::Error::MalformedRequest(
                "top_k must be at least 1".into(),
            )),
            Some(k) => Ok(k.clamp(1, 100)),
        }
    }
}

/// Non-streaming RAG response.
#[derive(Debug, Clone, Serialize)]
pub struct RagResponse {
    pub answer_text: String,
    pub sources: Vec<Source>,
    pub model_id: String,
}

/// One event of a streaming generator's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEventKind {
    /// Reasoning/thinking text, not shown as the final answer.
    Progress,
    /// User-visible text delta.
    Content,
    /// Terminal marker; exactly one per stream, always last.
    Done,
}

#[derive(Debug, Clone)]
pub struct StreamEvent {
    pub kind: StreamEventKind,
    pub text: String,
}

impl StreamEvent {
    pub fn progress(text: impl Into<String>) -> Self {
        Self {
            kind: StreamEventKind::Progress,
            text: text.into(),
        }
    }

    pub fn content(text: impl Into<String>) -> Self {
        Self {
            kind: StreamEventKind::Content,
            text: text.into(),
        }
    }

    pub fn done() -> Self {
        Self {
            kind: StreamEventKind::Done,
            text: String::new(),
        }
    }
}

/// Difficulty level for a QCM quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl std::str::FromStr for Difficulty {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(()),
        }
    }
}

/// One generated multiple-choice item. `answer_list[0]` is always the
/// canonically correct answer; consumers shuffle at render time.
#[derive(Debug, Clone, Serialize)]
pub struct QcmItem {
    pub question_text: String,
    pub answer_list: [String; 3],
    pub source_chunk: Chunk,
}

/// A single chapter of a generated course document.
#[derive(Debug, Clone, Serialize)]
pub struct Chapter {
    pub heading: String,
    pub body_markdown: String,
    pub cited_source_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseDocument {
    pub chapters: Vec<Chapter>,
    pub knowledge_base: String,
    pub iteration_logs: Vec<String>,
}

/// QCM conversational state, mutated only by the State Manager as a pure
/// function of replayed message history — never held server-side across
/// requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum QcmConversationState {
    AskTopic,
    AskDifficulty {
        topic: String,
    },
    AskCount {
        topic: String,
        difficulty: Difficulty,
    },
    Confirm {
        topic: String,
        difficulty: Difficulty,
        count: usize,
    },
    Running {
        topic: String,
        difficulty: Difficulty,
        count: usize,
    },
    Done {
        topic: String,
        difficulty: Difficulty,
        count: usize,
    },
}

impl Default for QcmConversationState {
    fn default() -> Self {
        QcmConversationState::AskTopic
    }
}
