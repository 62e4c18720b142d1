//! Citation Formatter (C7): renders the ordered list of sources actually
//! cited in an answer, rewriting fileserver-internal URLs to their
//! public equivalents.

use once_cell::sync::Lazy;
use regex::Regex;

use ragsvc_core::domain::{RankedChunk, Source};

static SOURCE_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[SOURCE (\d+)\]").unwrap());

/// Rewrites `url` from the fileserver-internal base to the public base
/// when it carries that prefix; otherwise returns it unchanged.
pub fn rewrite_url(url: &str, internal_base: &str, public_base: &str) -> String {
    match url.strip_prefix(internal_base) {
        Some(rest) => format!("{public_base}{rest}"),
        None => url.to_string(),
    }
}

/// Rewrites every complete `[SOURCE k]` token in already-fully-generated
/// `text` to `[k](url)` against the cumulative source list `chunks`
/// (1-indexed), stripping unknown indices, rewriting each cited URL from
/// `internal_base` to `public_base` the same way `format_citations` does.
/// Used by the course and QCM orchestrators, which generate whole
/// chapters/answers at once rather than streaming them token by token
/// (only C6's live SSE stream needs the lookahead-buffered rewrite in
/// `rag_engine`).
pub fn rewrite_inline_citations(
    text: &str,
    chunks: &[RankedChunk],
    internal_base: &str,
    public_base: &str,
) -> (String, Vec<usize>) {
    let mut used = Vec::new();
    let rewritten = rewrite_inline_citations_into(text, chunks, internal_base, public_base, &mut used);
    (rewritten, used)
}

/// Same rewrite as [`rewrite_inline_citations`], but appends newly-seen
/// indices to a caller-supplied `used` accumulator instead of starting
/// fresh. Lets the course orchestrator track first-citation order across
/// several chapters while still rewriting each chapter independently.
pub fn rewrite_inline_citations_into(
    text: &str,
    chunks: &[RankedChunk],
    internal_base: &str,
    public_base: &str,
    used: &mut Vec<usize>,
) -> String {
    SOURCE_TOKEN
        .replace_all(text, |caps: &regex::Captures| {
            let k: usize = caps[1].parse().unwrap_or(0);
            if k == 0 {
                return String::new();
            }
            match chunks.get(k - 1) {
                Some(ranked) => {
                    if !used.contains(&k) {
                        used.push(k);
                    }
                    match &ranked.chunk.source_url {
                        Some(url) => format!("[{k}]({})", rewrite_url(url, internal_base, public_base)),
                        None => format!("[{k}]"),
                    }
                }
                None => String::new(),
            }
        })
        .into_owned()
}

/// Formats `sources` (already ordered by first-citation sequence number)
/// into a newline-separated `"[k] title — url"` list, collapsing
/// duplicate URLs to the entry with the lowest sequence number.
pub fn format_citations(sources: &[Source], internal_base: &str, public_base: &str) -> String {
    let mut seen_urls = std::collections::HashSet::new();
    let mut lines = Vec::new();

    for source in sources {
        let url = source
            .url
            .as_deref()
            .map(|u| rewrite_url(u, internal_base, public_base));

        if let Some(ref u) = url {
            if !seen_urls.insert(u.clone()) {
                continue;
            }
        }

        match url {
            Some(u) => lines.push(format!("[{}] {} — {}", source.sequence_number, source.title, u)),
            None => lines.push(format!("[{}] {}", source.sequence_number, source.title)),
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(n: usize, title: &str, url: Option<&str>) -> Source {
        Source {
            sequence_number: n,
            title: title.to_string(),
            url: url.map(|s| s.to_string()),
            snippet: String::new(),
        }
    }

    #[test]
    fn rewrites_internal_prefix() {
        let url = rewrite_url(
            "http://fileserver.internal:9000/docs/a.pdf",
            "http://fileserver.internal:9000",
            "https://files.example.com",
        );
        assert_eq!(url, "https://files.example.com/docs/a.pdf");
    }

    #[test]
    fn leaves_unmatched_url_unchanged() {
        let url = rewrite_url(
            "https://external.example.com/a.pdf",
            "http://fileserver.internal:9000",
            "https://files.example.com",
        );
        assert_eq!(url, "https://external.example.com/a.pdf");
    }

    #[test]
    fn collapses_duplicate_urls_to_lowest_index() {
        let sources = vec![
            source(1, "Doc A", Some("http://fileserver.internal:9000/a.pdf")),
            source(2, "Doc A (copy)", Some("http://fileserver.internal:9000/a.pdf")),
            source(3, "Doc B", Some("http://fileserver.internal:9000/b.pdf")),
        ];
        let out = format_citations(
            &sources,
            "http://fileserver.internal:9000",
            "https://files.example.com",
        );
        assert_eq!(
            out,
            "[1] Doc A — https://files.example.com/a.pdf\n[3] Doc B — https://files.example.com/b.pdf"
        );
    }

    #[test]
    fn sources_without_url_pass_through() {
        let sources = vec![source(1, "Doc A", None)];
        let out = format_citations(&sources, "http://internal", "https://public");
        assert_eq!(out, "[1] Doc A");
    }

    fn ranked(point_id: &str, url: Option<&str>) -> RankedChunk {
        RankedChunk {
            chunk: ragsvc_core::domain::Chunk {
                point_id: point_id.to_string(),
                text: String::new(),
                title: point_id.to_string(),
                source_url: url.map(|s| s.to_string()),
                section_path: Vec::new(),
                token_count: 0,
                extra_tags: std::collections::HashMap::new(),
            },
            bm25_rank: None,
            vector_rank: None,
            fused_score: 0.0,
        }
    }

    #[test]
    fn inline_rewrite_tracks_first_appearance_order() {
        let chunks = vec![
            ranked("a", Some("http://x/a")),
            ranked("b", Some("http://x/b")),
        ];
        let (text, used) = rewrite_inline_citations(
            "claim one [SOURCE 2], claim two [SOURCE 1] and [SOURCE 2] again",
            &chunks,
            "http://x",
            "https://public",
        );
        assert_eq!(
            text,
            "claim one [2](https://public/b), claim two [1](https://public/a) and [2](https://public/b) again"
        );
        assert_eq!(used, vec![2, 1]);
    }

    #[test]
    fn inline_rewrite_strips_unknown_index() {
        let chunks = vec![ranked("a", Some("http://x/a"))];
        let (text, used) = rewrite_inline_citations("see [SOURCE 5]", &chunks, "http://x", "https://public");
        assert_eq!(text, "see ");
        assert!(used.is_empty());
    }

    #[test]
    fn inline_rewrite_rewrites_internal_url_to_public() {
        let chunks = vec![ranked("a", Some("http://fileserver.internal:9000/a.pdf"))];
        let (text, _used) = rewrite_inline_citations(
            "see [SOURCE 1]",
            &chunks,
            "http://fileserver.internal:9000",
            "https://files.example.com",
        );
        assert_eq!(text, "see [1](https://files.example.com/a.pdf)");
    }
}
