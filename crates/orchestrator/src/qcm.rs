//! QCM Orchestrator (C9) generation half: two-phase question synthesis
//! and per-question answer/distractor/source generation. Conversational
//! parameter collection lives in [`crate::state_manager`].

use std::sync::Arc;

use ragsvc_core::domain::{Chunk, Difficulty, QcmItem, RankedChunk, StreamEvent};
use ragsvc_core::traits::{GenerationOptions, LanguageModel, RetrieveOptions, Retriever};
use ragsvc_core::Error;
use ragsvc_config::QcmSettings;
use ragsvc_llm::build_knowledge_base;
use tokio::sync::mpsc;

use crate::citation::rewrite_url;
use crate::fileserver::FileserverClient;
use crate::text_utils::{numbered_lines, parse_labeled_lines};

fn difficulty_label(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => "easy",
        Difficulty::Medium => "medium",
        Difficulty::Hard => "hard",
    }
}

fn distractor_policy(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => "Both wrong answers must be clearly and obviously incorrect.",
        Difficulty::Medium => {
            "One wrong answer should be plausible enough to require thought; the other must be \
             clearly incorrect."
        }
        Difficulty::Hard => {
            "Both wrong answers must be highly plausible and require careful reasoning to rule out."
        }
    }
}

fn slugify(text: &str) -> String {
    let slug: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let collapsed: Vec<&str> = slug.split('-').filter(|s| !s.is_empty()).collect();
    let joined = collapsed.join("-");
    if joined.is_empty() {
        "qcm".to_string()
    } else {
        joined.chars().take(48).collect()
    }
}

pub struct QcmOrchestrator {
    retriever: Arc<dyn Retriever>,
    llm: Arc<dyn LanguageModel>,
    settings: QcmSettings,
    fileserver: FileserverClient,
    fileserver_internal_base: String,
    fileserver_public_base: String,
}

impl QcmOrchestrator {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        llm: Arc<dyn LanguageModel>,
        settings: QcmSettings,
        fileserver: FileserverClient,
        fileserver_internal_base: String,
        fileserver_public_base: String,
    ) -> Self {
        Self {
            retriever,
            llm,
            settings,
            fileserver,
            fileserver_internal_base,
            fileserver_public_base,
        }
    }

    pub async fn run(
        &self,
        collection: String,
        topic: String,
        difficulty: Difficulty,
        count: usize,
        tx: mpsc::Sender<ragsvc_core::Result<StreamEvent>>,
    ) {
        match self.run_inner(collection, topic, difficulty, count, &tx).await {
            Ok((markdown, json_url)) => {
                let body = match json_url {
                    Some(url) => format!("{markdown}\n\n[Download as JSON]({url})"),
                    None => markdown,
                };
                if tx.send(Ok(StreamEvent::content(body))).await.is_err() {
                    return;
                }
                let _ = tx.send(Ok(StreamEvent::done())).await;
            }
            Err(e) => {
                let _ = tx.send(Err(e)).await;
            }
        }
    }

    async fn progress(
        &self,
        tx: &mpsc::Sender<ragsvc_core::Result<StreamEvent>>,
        text: impl Into<String>,
    ) -> ragsvc_core::Result<()> {
        tx.send(Ok(StreamEvent::progress(text)))
            .await
            .map_err(|_| Error::Orchestrator("stream receiver dropped".to_string()))
    }

    async fn run_inner(
        &self,
        collection: String,
        topic: String,
        difficulty: Difficulty,
        count: usize,
        tx: &mpsc::Sender<ragsvc_core::Result<StreamEvent>>,
    ) -> ragsvc_core::Result<(String, Option<String>)> {
        let options = GenerationOptions {
            max_tokens: self.settings.max_tokens,
            ..GenerationOptions::default()
        };

        // --- Phase 1: question synthesis ---
        self.progress(tx, "Retrieving broad context for topic...").await?;
        let broad_chunks = self
            .retriever
            .retrieve(
                &collection,
                &topic,
                RetrieveOptions {
                    initial_k: self.settings.retriever_top_k,
                    final_k: self.settings.retriever_top_k,
                },
            )
            .await?;

        self.progress(tx, "Synthesizing questions...").await?;
        let questions_raw = self
            .llm
            .complete(
                "You write multiple-choice quiz questions strictly from the supplied context. \
                 Follow the requested output format exactly: one question per line, numbered.",
                &format!(
                    "{}\n\nWrite {count} pedagogically distinct questions about \"{topic}\" at \
                     {} difficulty, one per line, numbered.",
                    build_knowledge_base(&broad_chunks),
                    difficulty_label(difficulty)
                ),
                &options,
            )
            .await?;

        let mut questions = numbered_lines(&questions_raw);
        questions.truncate(count);
        if questions.is_empty() {
            return Err(Error::Orchestrator(
                "question synthesis produced no questions".to_string(),
            ));
        }

        // --- Phase 2: per-question answer generation ---
        let mut items = Vec::new();

        for (i, question_text) in questions.iter().enumerate() {
            self.progress(
                tx,
                format!("Generating answer {}/{}...", i + 1, questions.len()),
            )
            .await?;

            let ctx = self
                .retriever
                .retrieve(
                    &collection,
                    question_text,
                    RetrieveOptions {
                        initial_k: self.settings.answer_top_k,
                        final_k: self.settings.answer_top_k,
                    },
                )
                .await?;

            if ctx.is_empty() {
                tracing::warn!(question = %question_text, "no supporting context for question, skipping");
                continue;
            }

            let response = self
                .llm
                .complete(
                    "You answer a single quiz question strictly from the supplied context.",
                    &format!(
                        "{}\n\nQuestion: {question_text}\n\n{}\n\nRespond in exactly this format:\n\
                         ANSWER: <the correct answer>\n\
                         DISTRACTOR1: <a wrong answer>\n\
                         DISTRACTOR2: <a wrong answer>\n\
                         SOURCE: <the number of the source above that best supports the correct answer>",
                        build_knowledge_base(&ctx),
                        distractor_policy(difficulty)
                    ),
                    &options,
                )
                .await?;

            let fields = parse_labeled_lines(&response, &["ANSWER", "DISTRACTOR1", "DISTRACTOR2", "SOURCE"]);

            let answer = fields.get("ANSWER").cloned().unwrap_or_default();
            let distractor1 = fields.get("DISTRACTOR1").cloned().unwrap_or_default();
            let distractor2 = fields.get("DISTRACTOR2").cloned().unwrap_or_default();

            if answer.is_empty() || distractor1.is_empty() || distractor2.is_empty() {
                return Err(Error::LlmFailure(format!(
                    "malformed answer generation for question '{question_text}'"
                )));
            }

            let source_chunk = select_source_chunk(&ctx, fields.get("SOURCE"));

            items.push(QcmItem {
                question_text: question_text.clone(),
                answer_list: [answer, distractor1, distractor2],
                source_chunk,
            });
        }

        if items.is_empty() {
            return Err(Error::Orchestrator(
                "no questions had supporting context".to_string(),
            ));
        }

        self.progress(tx, "Uploading quiz...").await?;
        let json_url = self.upload_quiz_json(&topic, &items).await;

        let markdown = render_markdown(
            &topic,
            difficulty,
            &items,
            &self.fileserver_internal_base,
            &self.fileserver_public_base,
        );

        Ok((markdown, json_url))
    }

    /// Serializes `items` to JSON with each source URL rewritten to its
    /// public form and uploads it, degrading to `None` on serialization
    /// or upload failure rather than discarding the already-generated quiz.
    async fn upload_quiz_json(&self, topic: &str, items: &[QcmItem]) -> Option<String> {
        let json_items: Vec<QcmItem> = items
            .iter()
            .map(|item| {
                let mut item = item.clone();
                item.source_chunk.source_url = item
                    .source_chunk
                    .source_url
                    .as_deref()
                    .map(|u| rewrite_url(u, &self.fileserver_internal_base, &self.fileserver_public_base));
                item
            })
            .collect();

        let json_payload = match serde_json::to_value(&json_items) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize quiz json, degrading to markdown without download link");
                return None;
            }
        };

        match self.fileserver.upload_json(&slugify(topic), &json_payload).await {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(error = %e, "qcm json upload failed, degrading to markdown without download link");
                None
            }
        }
    }
}

fn select_source_chunk(ctx: &[RankedChunk], source_field: Option<&String>) -> Chunk {
    let requested = source_field.and_then(|s| s.trim().parse::<usize>().ok());

    if let Some(k) = requested {
        if k >= 1 && k <= ctx.len() {
            return ctx[k - 1].chunk.clone();
        }
    }

    // Fall back to the highest fused-score candidate (ctx is already
    // ranked by fused score).
    ctx.first().expect("ctx checked non-empty by caller").chunk.clone()
}

fn render_markdown(
    topic: &str,
    difficulty: Difficulty,
    items: &[QcmItem],
    internal_base: &str,
    public_base: &str,
) -> String {
    let mut out = format!("# Quiz: {topic} ({})\n\n", difficulty_label(difficulty));

    for (i, item) in items.iter().enumerate() {
        let n = i + 1;
        let url = item
            .source_chunk
            .source_url
            .as_deref()
            .map(|u| rewrite_url(u, internal_base, public_base));

        out.push_str(&format!("### Question {n}\n\n{}\n\n", item.question_text));
        out.push_str("<details><summary>Answer</summary>\n\n");
        out.push_str(&format!("**Correct answer:** {}\n\n", item.answer_list[0]));
        match url {
            Some(u) => out.push_str(&format!("Source: [{n}]({u})\n")),
            None => out.push_str(&format!("Source: {}\n", item.source_chunk.title)),
        }
        out.push_str("\n</details>\n\n");
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, url: Option<&str>) -> RankedChunk {
        RankedChunk {
            chunk: Chunk {
                point_id: id.to_string(),
                text: "some supporting text".to_string(),
                title: id.to_string(),
                source_url: url.map(|s| s.to_string()),
                section_path: Vec::new(),
                token_count: 0,
                extra_tags: Default::default(),
            },
            bm25_rank: Some(1),
            vector_rank: Some(1),
            fused_score: 1.0,
        }
    }

    #[test]
    fn slugify_strips_non_alnum() {
        assert_eq!(slugify("World War II: Causes!"), "world-war-ii-causes");
    }

    #[test]
    fn slugify_empty_falls_back() {
        assert_eq!(slugify("???"), "qcm");
    }

    #[test]
    fn select_source_chunk_honors_valid_index() {
        let ctx = vec![chunk("a", None), chunk("b", None)];
        let selected = select_source_chunk(&ctx, Some(&"2".to_string()));
        assert_eq!(selected.point_id, "b");
    }

    #[test]
    fn select_source_chunk_falls_back_on_invalid_index() {
        let ctx = vec![chunk("a", None), chunk("b", None)];
        let selected = select_source_chunk(&ctx, Some(&"99".to_string()));
        assert_eq!(selected.point_id, "a");
    }
}
