//! RAG Engine (C6): single-turn retrieval-augmented generation with a
//! streaming `[SOURCE k]` → `[k](url)` citation rewrite (C7's sibling
//! mechanism, applied in-band as deltas arrive).

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::mpsc;

use ragsvc_config::constants::rag::CITATION_LOOKAHEAD_BOUND;
use ragsvc_core::domain::{RankedChunk, Source, StreamEvent};
use ragsvc_core::traits::{GenerationDelta, GenerationOptions, LanguageModel, RetrieveOptions, Retriever};

use crate::citation::{format_citations, rewrite_url};
use ragsvc_llm::PromptBuilder;

static SOURCE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[SOURCE (\d+)\]").unwrap());

/// Buffers streamed text so a `[SOURCE k]` token split across deltas is
/// never emitted half-written, rewriting complete tokens in place and
/// tracking which sources were actually cited.
struct CitationRewriter {
    buffer: String,
    lookahead_bound: usize,
    used_order: Vec<usize>,
}

impl CitationRewriter {
    fn new(lookahead_bound: usize) -> Self {
        Self {
            buffer: String::new(),
            lookahead_bound,
            used_order: Vec::new(),
        }
    }

    fn used_sources(&self) -> &[usize] {
        &self.used_order
    }

    fn feed(&mut self, delta: &str, urls: &[Option<String>]) -> String {
        self.buffer.push_str(delta);
        self.drain(urls, false)
    }

    fn finish(&mut self, urls: &[Option<String>]) -> String {
        self.drain(urls, true)
    }

    fn drain(&mut self, urls: &[Option<String>], flush_all: bool) -> String {
        let mut out = String::new();

        loop {
            let Some(bracket) = self.buffer.find('[') else {
                out.push_str(&self.buffer);
                self.buffer.clear();
                break;
            };

            out.push_str(&self.buffer[..bracket]);
            self.buffer.drain(..bracket);

            if let Some(caps) = SOURCE_TOKEN.captures(&self.buffer.clone()) {
                let matched_len = caps.get(0).unwrap().len();
                let k: usize = caps[1].parse().unwrap_or(0);

                if k >= 1 && k <= urls.len() {
                    if !self.used_order.contains(&k) {
                        self.used_order.push(k);
                    }
                    match &urls[k - 1] {
                        Some(url) => out.push_str(&format!("[{k}]({url})")),
                        None => out.push_str(&format!("[{k}]")),
                    }
                }
                // unknown k: strip the token (push nothing)

                self.buffer.drain(..matched_len);

                // Flush rule (a): a whitespace char immediately following
                // the closing bracket we just rewrote drains eagerly.
                if self.buffer.starts_with(char::is_whitespace) {
                    continue;
                }
                continue;
            }

            // No complete token at this position yet.
            if flush_all || self.buffer.len() >= self.lookahead_bound {
                let mut chars = self.buffer.chars();
                if let Some(c) = chars.next() {
                    out.push(c);
                    self.buffer = chars.collect();
                    continue;
                }
                break;
            }

            // Could still become `[SOURCE k]`; wait for more data.
            break;
        }

        out
    }
}

/// Rewrites each chunk's URL from the fileserver-internal base to the
/// public base before it is ever embedded in a streamed delta, so the
/// internal URL never reaches the client even mid-stream.
fn source_urls(chunks: &[RankedChunk], internal_base: &str, public_base: &str) -> Vec<Option<String>> {
    chunks
        .iter()
        .map(|c| c.chunk.source_url.as_deref().map(|u| rewrite_url(u, internal_base, public_base)))
        .collect()
}

fn used_sources_list(chunks: &[RankedChunk], used: &[usize]) -> Vec<Source> {
    used.iter()
        .enumerate()
        .filter_map(|(i, &k)| {
            chunks.get(k - 1).map(|ranked| Source {
                sequence_number: i + 1,
                title: ranked.chunk.title.clone(),
                url: ranked.chunk.source_url.clone(),
                snippet: ranked.chunk.text.chars().take(200).collect(),
            })
        })
        .collect()
}

/// Streams a single-turn RAG answer: retrieve, build the knowledge base
/// prompt, invoke the LLM, rewrite citations as they stream, and emit a
/// trailing sources section before `done`.
#[allow(clippy::too_many_arguments)]
pub async fn stream_rag(
    retriever: Arc<dyn Retriever>,
    llm: Arc<dyn LanguageModel>,
    collection: String,
    question: String,
    initial_k: usize,
    top_k: usize,
    max_tokens: usize,
    fileserver_internal_base: String,
    fileserver_public_base: String,
    tx: mpsc::Sender<ragsvc_core::Result<StreamEvent>>,
) {
    if tx
        .send(Ok(StreamEvent::progress("Retrieving context...")))
        .await
        .is_err()
    {
        return;
    }

    let chunks = match retriever
        .retrieve(
            &collection,
            &question,
            RetrieveOptions {
                initial_k,
                final_k: top_k,
            },
        )
        .await
    {
        Ok(chunks) => chunks,
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            return;
        }
    };

    if chunks.is_empty() {
        let _ = tx
            .send(Ok(StreamEvent::content(
                "No relevant context was found for this question in the selected collection.",
            )))
            .await;
        let _ = tx.send(Ok(StreamEvent::done())).await;
        return;
    }

    let (system, user) = PromptBuilder::new().build(&chunks, &question);

    if tx
        .send(Ok(StreamEvent::progress("Generating answer...")))
        .await
        .is_err()
    {
        return;
    }

    let (delta_tx, mut delta_rx) = mpsc::channel::<GenerationDelta>(32);
    let options = GenerationOptions {
        max_tokens,
        ..GenerationOptions::default()
    };

    let generation_task = tokio::spawn(async move {
        llm.stream(&system.content, &user.content, &options, delta_tx)
            .await
    });

    let urls = source_urls(&chunks, &fileserver_internal_base, &fileserver_public_base);
    let mut rewriter = CitationRewriter::new(CITATION_LOOKAHEAD_BOUND);

    while let Some(delta) = delta_rx.recv().await {
        match delta {
            GenerationDelta::Thinking(text) => {
                if tx.send(Ok(StreamEvent::progress(text))).await.is_err() {
                    return;
                }
            }
            GenerationDelta::Content(text) => {
                let rewritten = rewriter.feed(&text, &urls);
                if !rewritten.is_empty() && tx.send(Ok(StreamEvent::content(rewritten))).await.is_err() {
                    return;
                }
            }
        }
    }

    match generation_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            let _ = tx.send(Err(e)).await;
            return;
        }
        Err(e) => {
            let _ = tx
                .send(Err(ragsvc_core::Error::LlmFailure(e.to_string())))
                .await;
            return;
        }
    }

    let tail = rewriter.finish(&urls);
    if !tail.is_empty() && tx.send(Ok(StreamEvent::content(tail))).await.is_err() {
        return;
    }

    let used = used_sources_list(&chunks, rewriter.used_sources());
    if !used.is_empty() {
        let citations = format_citations(&used, &fileserver_internal_base, &fileserver_public_base);
        let sources_block = format!("\n\n**Sources**\n{citations}");
        if tx.send(Ok(StreamEvent::content(sources_block))).await.is_err() {
            return;
        }
    }

    let _ = tx.send(Ok(StreamEvent::done())).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(n: usize) -> Vec<Option<String>> {
        (1..=n).map(|i| Some(format!("https://example.com/{i}"))).collect()
    }

    #[test]
    fn rewrites_complete_token_in_one_feed() {
        let mut rw = CitationRewriter::new(64);
        let out = rw.feed("see [SOURCE 1] for details", &urls(2));
        assert_eq!(out, "see [1](https://example.com/1) for details");
        assert_eq!(rw.used_sources(), &[1]);
    }

    #[test]
    fn token_split_across_feeds_is_not_emitted_half_written() {
        let mut rw = CitationRewriter::new(64);
        let first = rw.feed("check [SOU", &urls(1));
        assert_eq!(first, "check ");
        let second = rw.feed("RCE 1] now", &urls(1));
        assert_eq!(second, "[1](https://example.com/1) now");
    }

    #[test]
    fn unknown_source_index_is_stripped() {
        let mut rw = CitationRewriter::new(64);
        let out = rw.feed("claim [SOURCE 9] end", &urls(1));
        assert_eq!(out, "claim  end");
        assert!(rw.used_sources().is_empty());
    }

    #[test]
    fn long_non_token_bracket_flushes_eventually() {
        let mut rw = CitationRewriter::new(8);
        let out = rw.feed("[not a citation at all, just text]", &urls(1));
        assert_eq!(out, "[not a citation at all, just text]");
    }

    #[test]
    fn finish_flushes_any_remaining_buffer() {
        let mut rw = CitationRewriter::new(64);
        let fed = rw.feed("trailing [SOU", &urls(1));
        assert_eq!(fed, "trailing ");
        let tail = rw.finish(&urls(1));
        assert_eq!(tail, "[SOU");
    }
}
