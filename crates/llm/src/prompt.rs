//! Knowledge-base prompt construction (C6's input into C5).
//!
//! Assembles the system/user message pair handed to the LLM client: a
//! system prompt instructing citation discipline, and a user prompt
//! carrying the `<knowledge_base>` block built from retrieved chunks.

use std::fmt;

use ragsvc_core::domain::RankedChunk;

/// Chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Builds the `<knowledge_base>` prompt segment from ranked chunks,
/// numbering each source `[SOURCE k]` in retrieval order (1-indexed).
pub fn build_knowledge_base(chunks: &[RankedChunk]) -> String {
    let mut out = String::from("<knowledge_base>\n");
    for (i, ranked) in chunks.iter().enumerate() {
        let k = i + 1;
        let section = ranked.chunk.section_path_joined();
        if section.is_empty() {
            out.push_str(&format!("[SOURCE {k}] {}\n", ranked.chunk.title));
        } else {
            out.push_str(&format!("[SOURCE {k}] {} — {}\n", ranked.chunk.title, section));
        }
        out.push_str(&ranked.chunk.text);
        out.push('\n');
    }
    out.push_str("</knowledge_base>");
    out
}

/// System prompt instructing the model to answer strictly from the
/// supplied knowledge base and cite sources inline.
pub fn rag_system_prompt() -> String {
    "You are a retrieval-augmented assistant. Answer the user's question \
     using only the information in the <knowledge_base> block below. \
     Cite every factual claim inline with its source marker, exactly as \
     `[SOURCE k]` where k is the source's number. If the knowledge base \
     does not contain the answer, say so plainly instead of guessing."
        .to_string()
}

/// Builder assembling the two-message payload C6 hands to the LLM
/// client: a system prompt plus a user prompt carrying the knowledge
/// base and the question.
pub struct PromptBuilder {
    system: String,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self {
            system: rag_system_prompt(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    pub fn build(self, chunks: &[RankedChunk], question: &str) -> (Message, Message) {
        let knowledge_base = build_knowledge_base(chunks);
        let user = format!("{knowledge_base}\n\nQuestion: {question}");
        (Message::system(self.system), Message::user(user))
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_chunk(point_id: &str, title: &str, text: &str) -> RankedChunk {
        RankedChunk {
            chunk: ragsvc_core::domain::Chunk {
                point_id: point_id.to_string(),
                text: text.to_string(),
                title: title.to_string(),
                source_url: None,
                section_path: vec!["Intro".to_string()],
                token_count: 10,
                extra_tags: HashMap::new(),
            },
            bm25_rank: Some(1),
            vector_rank: Some(1),
            fused_score: 1.0,
        }
    }

    #[test]
    fn numbers_sources_in_order() {
        let chunks = vec![
            sample_chunk("p1", "Doc A", "first"),
            sample_chunk("p2", "Doc B", "second"),
        ];
        let kb = build_knowledge_base(&chunks);
        assert!(kb.contains("[SOURCE 1] Doc A — Intro"));
        assert!(kb.contains("[SOURCE 2] Doc B — Intro"));
    }

    #[test]
    fn builder_embeds_question() {
        let chunks = vec![sample_chunk("p1", "Doc A", "first")];
        let (system, user) = PromptBuilder::new().build(&chunks, "What is X?");
        assert_eq!(system.role, Role::System);
        assert!(user.content.contains("Question: What is X?"));
        assert!(user.content.contains("<knowledge_base>"));
    }
}
