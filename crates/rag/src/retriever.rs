//! Hybrid Retriever (C4)
//!
//! Fans out to the vector and lexical search clients, fuses their
//! rankings by Reciprocal Rank Fusion, dedups by `point_id`, and returns
//! the top-K ranked chunks.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ragsvc_config::RetrieverConfig;
use ragsvc_core::domain::{Chunk, RankedChunk};
use ragsvc_core::registry::CollectionRegistry;
use ragsvc_core::traits::{RetrieveOptions, Retriever};

use crate::sparse_search::{LexicalIndex, LexicalSearchClient};
use crate::vector_store::VectorSearchClient;
use crate::RagError;

struct FusionCandidate {
    bm25_rank: Option<usize>,
    vector_rank: Option<usize>,
    vector_payload: Option<HashMap<String, String>>,
    lexical_payload: Option<HashMap<String, String>>,
}

/// Hybrid retriever combining dense and lexical search (C4).
pub struct HybridRetriever {
    vector_client: VectorSearchClient,
    lexical_client: LexicalSearchClient,
    lexical_indexes: HashMap<String, Arc<LexicalIndex>>,
    registry: Arc<CollectionRegistry>,
    config: RetrieverConfig,
}

impl HybridRetriever {
    pub fn new(
        vector_client: VectorSearchClient,
        lexical_client: LexicalSearchClient,
        lexical_indexes: HashMap<String, Arc<LexicalIndex>>,
        registry: Arc<CollectionRegistry>,
        config: RetrieverConfig,
    ) -> Self {
        Self {
            vector_client,
            lexical_client,
            lexical_indexes,
            registry,
            config,
        }
    }

    fn chunk_from_payload(point_id: &str, payload: &HashMap<String, String>) -> Chunk {
        let section_path = payload
            .get("section_path")
            .map(|s| s.split('/').map(|p| p.trim().to_string()).collect())
            .unwrap_or_default();

        Chunk {
            point_id: point_id.to_string(),
            text: payload.get("text").cloned().unwrap_or_default(),
            title: payload.get("title").cloned().unwrap_or_default(),
            source_url: payload.get("source_url").cloned(),
            section_path,
            token_count: payload
                .get("token_count")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            extra_tags: payload
                .iter()
                .filter(|(k, _)| {
                    !matches!(
                        k.as_str(),
                        "text" | "title" | "source_url" | "section_path" | "token_count"
                    )
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    fn fuse(
        config: &RetrieverConfig,
        vector_hits: &[(String, HashMap<String, String>)],
        lexical_hits: &[(String, HashMap<String, String>)],
    ) -> Vec<RankedChunk> {
        let mut candidates: HashMap<String, FusionCandidate> = HashMap::new();

        for (rank, (point_id, payload)) in vector_hits.iter().enumerate() {
            let entry = candidates
                .entry(point_id.clone())
                .or_insert_with(|| FusionCandidate {
                    bm25_rank: None,
                    vector_rank: None,
                    vector_payload: None,
                    lexical_payload: None,
                });
            entry.vector_rank = Some(rank + 1);
            entry.vector_payload = Some(payload.clone());
        }

        for (rank, (point_id, payload)) in lexical_hits.iter().enumerate() {
            let entry = candidates
                .entry(point_id.clone())
                .or_insert_with(|| FusionCandidate {
                    bm25_rank: None,
                    vector_rank: None,
                    vector_payload: None,
                    lexical_payload: None,
                });
            entry.bm25_rank = Some(rank + 1);
            entry.lexical_payload = Some(payload.clone());
        }

        let mut ranked: Vec<RankedChunk> = candidates
            .into_iter()
            .map(|(point_id, candidate)| {
                let vector_term = candidate
                    .vector_rank
                    .map(|r| config.vector_weight * (1.0 / (r as f32 + config.rrf_k)))
                    .unwrap_or(0.0);
                let bm25_term = candidate
                    .bm25_rank
                    .map(|r| config.bm25_weight * (1.0 / (r as f32 + config.rrf_k)))
                    .unwrap_or(0.0);
                let fused_score = vector_term + bm25_term;

                let payload = candidate
                    .vector_payload
                    .as_ref()
                    .or(candidate.lexical_payload.as_ref())
                    .cloned()
                    .unwrap_or_default();

                RankedChunk {
                    chunk: Self::chunk_from_payload(&point_id, &payload),
                    bm25_rank: candidate.bm25_rank,
                    vector_rank: candidate.vector_rank,
                    fused_score,
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.fused_score
                .partial_cmp(&a.fused_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let min_a = min_rank(a);
                    let min_b = min_rank(b);
                    min_a.cmp(&min_b)
                })
                .then_with(|| a.chunk.point_id.cmp(&b.chunk.point_id))
        });

        ranked
    }
}

fn min_rank(r: &RankedChunk) -> usize {
    match (r.bm25_rank, r.vector_rank) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => usize::MAX,
    }
}

#[async_trait]
impl Retriever for HybridRetriever {
    #[tracing::instrument(skip(self, query_text))]
    async fn retrieve(
        &self,
        collection_name: &str,
        query_text: &str,
        options: RetrieveOptions,
    ) -> ragsvc_core::Result<Vec<RankedChunk>> {
        let entry = self.registry.resolve(collection_name)?;

        let lexical_index = self.lexical_indexes.get(&entry.lexical_index_id).cloned();

        let vector_future = async {
            let embedding = self.vector_client.embed(query_text).await?;
            self.vector_client
                .search(&entry.vector_index_id, &embedding, options.initial_k)
                .await
        };

        let lexical_future = async {
            match lexical_index {
                Some(ref index) => {
                    self.lexical_client
                        .search(index, query_text, options.initial_k)
                }
                None => Err(RagError::NotFound(format!(
                    "no lexical index loaded for {}",
                    entry.lexical_index_id
                ))),
            }
        };

        let (vector_result, lexical_result) = tokio::join!(vector_future, lexical_future);

        let vector_hits: Vec<(String, HashMap<String, String>)> = match vector_result {
            Ok(hits) => hits.into_iter().map(|h| (h.point_id, h.payload)).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "vector backend failed; continuing with lexical only");
                Vec::new()
            }
        };

        let lexical_hits: Vec<(String, HashMap<String, String>)> = match lexical_result {
            Ok(hits) => hits.into_iter().map(|h| (h.point_id, h.payload)).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "lexical backend failed; continuing with vector only");
                Vec::new()
            }
        };

        if vector_hits.is_empty() && lexical_hits.is_empty() {
            return Err(ragsvc_core::Error::RetrievalUnavailable(
                "both vector and lexical backends failed or returned nothing".to_string(),
            ));
        }

        let fused = Self::fuse(&self.config, &vector_hits, &lexical_hits);
        Ok(fused.into_iter().take(options.final_k).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(text: &str) -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert("text".to_string(), text.to_string());
        m
    }

    fn registry_config() -> RetrieverConfig {
        RetrieverConfig {
            initial_k: 8,
            final_k: 5,
            bm25_weight: 0.5,
            vector_weight: 0.5,
            rrf_k: 60.0,
        }
    }

    fn fuse_only(
        vector_hits: Vec<(String, HashMap<String, String>)>,
        lexical_hits: Vec<(String, HashMap<String, String>)>,
    ) -> Vec<RankedChunk> {
        HybridRetriever::fuse(&registry_config(), &vector_hits, &lexical_hits)
    }

    #[test]
    fn basic_rag_fusion_matches_spec_scenario() {
        // Vector: [A,B,C] ranks 1..3; BM25: [B,D,A]; weights 0.5/0.5.
        let vector_hits = vec![
            ("A".to_string(), payload("a")),
            ("B".to_string(), payload("b")),
            ("C".to_string(), payload("c")),
        ];
        let lexical_hits = vec![
            ("B".to_string(), payload("b")),
            ("D".to_string(), payload("d")),
            ("A".to_string(), payload("a")),
        ];

        let fused = fuse_only(vector_hits, lexical_hits);
        let order: Vec<&str> = fused.iter().map(|r| r.chunk.point_id.as_str()).collect();
        assert_eq!(order, vec!["B", "A", "D", "C"]);
    }

    #[test]
    fn distinct_point_ids_in_output() {
        let vector_hits = vec![("A".to_string(), payload("a")), ("B".to_string(), payload("b"))];
        let lexical_hits = vec![("A".to_string(), payload("a"))];
        let fused = fuse_only(vector_hits, lexical_hits);
        let mut ids: Vec<&str> = fused.iter().map(|r| r.chunk.point_id.as_str()).collect();
        let before = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), before);
    }
}
