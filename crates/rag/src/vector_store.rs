//! Vector Search Client (C2)
//!
//! Embeds a query against an external embedding service, then performs a
//! kNN search against a per-collection Qdrant index. The ingestion path
//! (upserting documents, creating collections) is out of scope — indexes
//! are assumed pre-populated.

use qdrant_client::{
    qdrant::{value::Kind, SearchPointsBuilder},
    Qdrant,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::RagError;

/// A raw hit from the vector store, before hydration into a `Chunk`.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub point_id: String,
    pub score: f32,
    pub payload: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct VectorSearchConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub embedding_url: String,
    pub embedding_model: Option<String>,
    pub timeout: Duration,
}

impl Default for VectorSearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:6333".to_string(),
            api_key: None,
            embedding_url: "http://localhost:11434/api/embeddings".to_string(),
            embedding_model: None,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(serde::Serialize)]
struct EmbeddingRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// The vector search seam (C2).
pub struct VectorSearchClient {
    client: Qdrant,
    http: reqwest::Client,
    config: VectorSearchConfig,
}

impl VectorSearchClient {
    pub fn new(config: VectorSearchConfig) -> Result<Self, RagError> {
        let mut builder = Qdrant::from_url(&config.endpoint);
        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            http,
            config,
        })
    }

    /// Obtains a dense embedding for `text` via the configured embedding
    /// service. Bounded by `config.timeout`; on failure the whole
    /// retrieval call fails fast (propagated as `RagError::Embedding`).
    #[tracing::instrument(skip(self, text))]
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let body = EmbeddingRequest {
            model: self.config.embedding_model.as_deref(),
            prompt: text,
        };

        let response = self
            .http
            .post(&self.config.embedding_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RagError::Embedding(format!(
                "embedding service returned {}",
                response.status()
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        Ok(parsed.embedding)
    }

    /// kNN search against `vector_index_id`, returning up to `top_k`
    /// nearest neighbors. `top_k` is clamped to `[1, 64]` per the
    /// component contract.
    #[tracing::instrument(skip(self, vector))]
    pub async fn search(
        &self,
        vector_index_id: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<VectorHit>, RagError> {
        let top_k = top_k.clamp(1, 64);

        let search_builder =
            SearchPointsBuilder::new(vector_index_id, vector.to_vec(), top_k as u64)
                .with_payload(true);

        let results = self
            .client
            .search_points(search_builder)
            .await
            .map_err(|e| RagError::Search(e.to_string()))?;

        let hits = results
            .result
            .into_iter()
            .map(|point| {
                let mut payload = HashMap::new();
                for (k, v) in point.payload {
                    if let Some(Kind::StringValue(s)) = v.kind {
                        payload.insert(k, s);
                    }
                }

                let point_id = point
                    .id
                    .map(|pid| match pid.point_id_options {
                        Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u)) => u,
                        Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => {
                            n.to_string()
                        }
                        None => String::new(),
                    })
                    .unwrap_or_default();

                VectorHit {
                    point_id,
                    score: point.score,
                    payload,
                }
            })
            .collect();

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_timeout() {
        let config = VectorSearchConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
    }
}
