//! Course Orchestrator (C8): Researcher -> Enhancer -> Writer over a
//! cumulative, point_id-deduplicated source list.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use ragsvc_config::constants::{retriever, timeouts};
use ragsvc_config::CourseSettings;
use ragsvc_core::domain::{Chapter, CourseDocument, RankedChunk, Source, StreamEvent};
use ragsvc_core::traits::{GenerationOptions, LanguageModel, RetrieveOptions, Retriever};
use ragsvc_core::Error;
use ragsvc_llm::build_knowledge_base;

use crate::citation::{format_citations, rewrite_inline_citations_into};
use crate::text_utils::numbered_lines;

const MAX_SUB_QUERIES: usize = 6;
const MAX_GAP_QUERIES: usize = 4;
const MAX_CHAPTERS: usize = 8;

/// Cumulative, point_id-deduplicated source list. Chunks keep the index
/// they were first assigned as the Researcher and Enhancer add material,
/// so `[SOURCE k]` stays stable once a chapter has been written against
/// it.
#[derive(Default)]
struct SourceAccumulator {
    chunks: Vec<RankedChunk>,
    seen: HashMap<String, usize>,
}

impl SourceAccumulator {
    fn add_all(&mut self, new_chunks: Vec<RankedChunk>) -> usize {
        let mut added = 0;
        for chunk in new_chunks {
            if !self.seen.contains_key(&chunk.chunk.point_id) {
                self.seen.insert(chunk.chunk.point_id.clone(), self.chunks.len() + 1);
                self.chunks.push(chunk);
                added += 1;
            }
        }
        added
    }
}

fn researcher_system_prompt() -> &'static str {
    "You are the research agent of a course-writing pipeline. Follow the \
     requested output format exactly: one item per line, numbered."
}

fn writer_system_prompt() -> &'static str {
    "You are the writing agent of a course-writing pipeline. Write in \
     clear instructional markdown and cite every factual claim inline as \
     `[SOURCE k]`, where k refers to the numbered sources you were given."
}

struct CourseOutcome {
    document: CourseDocument,
    sources: Vec<Source>,
}

pub struct CourseOrchestrator {
    retriever: Arc<dyn Retriever>,
    llm: Arc<dyn LanguageModel>,
    settings: CourseSettings,
    fileserver_internal_base: String,
    fileserver_public_base: String,
}

impl CourseOrchestrator {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        llm: Arc<dyn LanguageModel>,
        settings: CourseSettings,
        fileserver_internal_base: String,
        fileserver_public_base: String,
    ) -> Self {
        Self {
            retriever,
            llm,
            settings,
            fileserver_internal_base,
            fileserver_public_base,
        }
    }

    /// Drives the full Researcher -> Enhancer -> Writer pipeline,
    /// streaming progress and the final document through `tx`.
    pub async fn run(&self, collection: String, subject: String, tx: mpsc::Sender<ragsvc_core::Result<StreamEvent>>) {
        match self.run_inner(collection, subject, &tx).await {
            Ok(outcome) => {
                let mut body = String::new();
                for chapter in &outcome.document.chapters {
                    body.push_str(&format!("## {}\n\n{}\n\n", chapter.heading, chapter.body_markdown));
                }

                if tx.send(Ok(StreamEvent::content(body))).await.is_err() {
                    return;
                }

                if !outcome.sources.is_empty() {
                    let citations = format_citations(
                        &outcome.sources,
                        &self.fileserver_internal_base,
                        &self.fileserver_public_base,
                    );
                    let block = format!("\n\n**Sources**\n{citations}");
                    if tx.send(Ok(StreamEvent::content(block))).await.is_err() {
                        return;
                    }
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

    /// Runs `self.llm.complete` to completion while emitting a heartbeat
    /// `progress` event roughly every `HEARTBEAT_SECS`, so long chapter
    /// generations don't let a streaming proxy time the connection out.
    async fn complete_with_heartbeat(
        &self,
        system: &str,
        user: &str,
        options: &GenerationOptions,
        tx: &mpsc::Sender<ragsvc_core::Result<StreamEvent>>,
    ) -> ragsvc_core::Result<String> {
        let mut fut = self.llm.complete(system, user, options);
        let mut ticker = tokio::time::interval(Duration::from_secs(timeouts::HEARTBEAT_SECS));
        ticker.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                result = &mut fut => return result,
                _ = ticker.tick() => {
                    self.progress(tx, "Still working...").await?;
                }
            }
        }
    }

    async fn run_inner(
        &self,
        collection: String,
        subject: String,
        tx: &mpsc::Sender<ragsvc_core::Result<StreamEvent>>,
    ) -> ragsvc_core::Result<CourseOutcome> {
        let options = GenerationOptions {
            max_tokens: self.settings.max_tokens,
            ..GenerationOptions::default()
        };
        let mut sources = SourceAccumulator::default();
        let mut iteration_logs = Vec::new();

        // --- Agent R: Researcher ---
        self.progress(tx, "Researcher: planning sub-queries...").await?;
        let plan = self
            .complete_with_heartbeat(
                researcher_system_prompt(),
                &format!(
                    "Subject: {subject}\n\nPropose 3-6 focused sub-queries that together cover \
                     what a learner needs to know about this subject, one per line, numbered."
                ),
                &options,
                tx,
            )
            .await?;
        let mut sub_queries = numbered_lines(&plan);
        sub_queries.truncate(MAX_SUB_QUERIES);
        if sub_queries.is_empty() {
            sub_queries.push(subject.clone());
        }

        for (i, sub_query) in sub_queries.iter().enumerate() {
            self.progress(
                tx,
                format!("Researcher: retrieving for sub-query {}/{}...", i + 1, sub_queries.len()),
            )
            .await?;
            let chunks = self
                .retriever
                .retrieve(
                    &collection,
                    sub_query,
                    RetrieveOptions {
                        initial_k: retriever::INITIAL_K,
                        final_k: self.settings.retriever_top_k,
                    },
                )
                .await?;
            let added = sources.add_all(chunks);
            iteration_logs.push(format!("researcher: sub-query '{sub_query}' added {added} sources"));
        }

        self.progress(tx, "Researcher: synthesizing knowledge base...").await?;
        let mut knowledge_base = self
            .complete_with_heartbeat(
                writer_system_prompt(),
                &format!(
                    "{}\n\nSynthesize a structured markdown knowledge base (use headings) covering \
                     the subject \"{subject}\" using only the sources above.",
                    build_knowledge_base(&sources.chunks)
                ),
                &options,
                tx,
            )
            .await?;

        // --- Agent E: Enhancer ---
        for iteration in 0..self.settings.enhancer_iterations {
            self.progress(
                tx,
                format!("Enhancer: iteration {}/{}...", iteration + 1, self.settings.enhancer_iterations),
            )
            .await?;

            let gaps_raw = self
                .complete_with_heartbeat(
                    researcher_system_prompt(),
                    &format!(
                        "Subject: {subject}\n\nCurrent knowledge base:\n{knowledge_base}\n\nIdentify \
                         1-4 knowledge gaps relative to the subject and propose one focused search \
                         query per gap, one per line, numbered."
                    ),
                    &options,
                    tx,
                )
                .await?;
            let mut gap_queries = numbered_lines(&gaps_raw);
            gap_queries.truncate(MAX_GAP_QUERIES);

            let mut new_count = 0;
            for gap_query in &gap_queries {
                let chunks = self
                    .retriever
                    .retrieve(
                        &collection,
                        gap_query,
                        RetrieveOptions {
                            initial_k: retriever::INITIAL_K,
                            final_k: self.settings.enhancer_top_k,
                        },
                    )
                    .await?;
                new_count += sources.add_all(chunks);
            }
            iteration_logs.push(format!(
                "enhancer iteration {}: {new_count} new sources from {} gap queries",
                iteration + 1,
                gap_queries.len()
            ));

            if new_count == 0 {
                self.progress(tx, "Enhancer: no new material found, stopping early.").await?;
                break;
            }

            self.progress(tx, "Enhancer: revising knowledge base...").await?;
            knowledge_base = self
                .complete_with_heartbeat(
                    writer_system_prompt(),
                    &format!(
                        "{}\n\nRevise the knowledge base below to incorporate the new sources above, \
                         preserving what is still accurate.\n\nCurrent knowledge base:\n{knowledge_base}",
                        build_knowledge_base(&sources.chunks)
                    ),
                    &options,
                    tx,
                )
                .await?;
        }

        // --- Agent W: Writer ---
        self.progress(tx, "Writer: planning chapter outline...").await?;
        let outline_raw = self
            .complete_with_heartbeat(
                writer_system_prompt(),
                &format!(
                    "Knowledge base:\n{knowledge_base}\n\nPropose a chapter outline for a course on \
                     \"{subject}\": one chapter heading per line, numbered, 3-8 chapters."
                ),
                &options,
                tx,
            )
            .await?;
        let mut headings = numbered_lines(&outline_raw);
        headings.truncate(MAX_CHAPTERS);
        if headings.is_empty() {
            headings.push(subject.clone());
        }

        let mut chapters = Vec::new();
        let mut global_used: Vec<usize> = Vec::new();

        for (i, heading) in headings.iter().enumerate() {
            self.progress(tx, format!("Writer: drafting chapter {}/{}: {heading}", i + 1, headings.len()))
                .await?;
            let body_raw = self
                .complete_with_heartbeat(
                    writer_system_prompt(),
                    &format!(
                        "{}\n\nWrite the full body of the chapter \"{heading}\" for a course on \
                         \"{subject}\". Cite every factual claim inline as [SOURCE k] from the sources \
                         above.",
                        build_knowledge_base(&sources.chunks)
                    ),
                    &options,
                    tx,
                )
                .await?;

            let mut chapter_used = Vec::new();
            let body = rewrite_inline_citations_into(
                &body_raw,
                &sources.chunks,
                &self.fileserver_internal_base,
                &self.fileserver_public_base,
                &mut chapter_used,
            );
            for k in &chapter_used {
                if !global_used.contains(k) {
                    global_used.push(*k);
                }
            }

            chapters.push(Chapter {
                heading: heading.clone(),
                body_markdown: body,
                cited_source_ids: chapter_used
                    .iter()
                    .filter_map(|k| sources.chunks.get(k - 1))
                    .map(|c| c.chunk.point_id.clone())
                    .collect(),
            });
        }

        let used_sources: Vec<Source> = global_used
            .iter()
            .enumerate()
            .filter_map(|(i, &k)| {
                sources.chunks.get(k - 1).map(|ranked| Source {
                    sequence_number: i + 1,
                    title: ranked.chunk.title.clone(),
                    url: ranked.chunk.source_url.clone(),
                    snippet: ranked.chunk.text.chars().take(200).collect(),
                })
            })
            .collect();

        Ok(CourseOutcome {
            document: CourseDocument {
                chapters,
                knowledge_base,
                iteration_logs,
            },
            sources: used_sources,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_accumulator_dedups_by_point_id() {
        let mut acc = SourceAccumulator::default();
        let chunk = |id: &str| RankedChunk {
            chunk: ragsvc_core::domain::Chunk {
                point_id: id.to_string(),
                text: String::new(),
                title: id.to_string(),
                source_url: None,
                section_path: Vec::new(),
                token_count: 0,
                extra_tags: HashMap::new(),
            },
            bm25_rank: None,
            vector_rank: None,
            fused_score: 0.0,
        };

        assert_eq!(acc.add_all(vec![chunk("a"), chunk("b")]), 2);
        assert_eq!(acc.add_all(vec![chunk("b"), chunk("c")]), 1);
        assert_eq!(acc.chunks.len(), 3);
        assert_eq!(acc.seen["a"], 1);
        assert_eq!(acc.seen["c"], 3);
    }
}
