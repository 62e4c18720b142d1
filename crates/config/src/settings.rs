//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{course, qcm, rag, retriever};
use crate::ConfigError;

/// Runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Root settings value, constructed once at startup and never mutated —
/// there is no hot-reload path in the core (see design notes).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub retriever: RetrieverConfig,

    #[serde(default)]
    pub rag: RagSettings,

    #[serde(default)]
    pub course: CourseSettings,

    #[serde(default)]
    pub qcm: QcmSettings,

    #[serde(default)]
    pub services: ServicesConfig,

    #[serde(default)]
    pub auth: AuthSettings,

    #[serde(default = "default_registry_path")]
    pub registry_path: String,
}

fn default_registry_path() -> String {
    "config/collections.json".to_string()
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_retriever()?;
        self.validate_server()?;
        self.validate_qcm()?;
        Ok(())
    }

    fn validate_retriever(&self) -> Result<(), ConfigError> {
        let r = &self.retriever;

        let weight_sum = r.bm25_weight + r.vector_weight;
        if (weight_sum - 1.0).abs() > 0.001 {
            return Err(ConfigError::InvalidValue {
                field: "retriever.bm25_weight + retriever.vector_weight".to_string(),
                message: format!("must sum to 1.0, got {weight_sum}"),
            });
        }

        if r.rrf_k <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "retriever.rrf_k".to_string(),
                message: format!("must be positive, got {}", r.rrf_k),
            });
        }

        if r.final_k == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retriever.final_k".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if r.final_k > r.initial_k {
            tracing::warn!(
                "retriever.final_k ({}) is larger than retriever.initial_k ({}), \
                 results will be limited by retrieval",
                r.final_k,
                r.initial_k
            );
        }

        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "port cannot be 0".to_string(),
            });
        }

        if self.environment.is_production()
            && self.server.auth.enabled
            && self.auth.token_list.is_empty()
        {
            return Err(ConfigError::InvalidValue {
                field: "auth.token_list".to_string(),
                message: "must be set when auth is enabled in production".to_string(),
            });
        }

        Ok(())
    }

    fn validate_qcm(&self) -> Result<(), ConfigError> {
        if self.qcm.retriever_top_k == 0 || self.qcm.answer_top_k == 0 {
            return Err(ConfigError::InvalidValue {
                field: "qcm".to_string(),
                message: "retriever_top_k and answer_top_k must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default)]
    pub auth: ServerAuthConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
            auth: ServerAuthConfig::default(),
        }
    }
}

/// Whether bearer-token auth is enforced, and which paths bypass it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerAuthConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
}

fn default_public_paths() -> Vec<String> {
    vec!["/health".to_string(), "/ready".to_string()]
}

impl Default for ServerAuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            public_paths: default_public_paths(),
        }
    }
}

/// Hybrid retriever tuning (C4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieverConfig {
    #[serde(default = "default_initial_k")]
    pub initial_k: usize,
    #[serde(default = "default_final_k")]
    pub final_k: usize,
    #[serde(default = "default_bm25_weight")]
    pub bm25_weight: f32,
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,
}

fn default_initial_k() -> usize {
    retriever::INITIAL_K
}
fn default_final_k() -> usize {
    retriever::FINAL_K
}
fn default_bm25_weight() -> f32 {
    retriever::BM25_WEIGHT
}
fn default_vector_weight() -> f32 {
    retriever::VECTOR_WEIGHT
}
fn default_rrf_k() -> f32 {
    retriever::RRF_K
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            initial_k: default_initial_k(),
            final_k: default_final_k(),
            bm25_weight: default_bm25_weight(),
            vector_weight: default_vector_weight(),
            rrf_k: default_rrf_k(),
        }
    }
}

/// RAG engine tuning (C6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagSettings {
    #[serde(default = "default_rag_model")]
    pub model: String,
    #[serde(default = "default_rag_temperature")]
    pub temperature: f32,
    #[serde(default = "default_rag_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_rag_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_stream_chunk_size")]
    pub stream_chunk_size: usize,
    #[serde(default = "default_stream_chunk_delay_ms")]
    pub stream_chunk_delay_ms: u64,
}

fn default_rag_model() -> String {
    "qwen2.5:7b-instruct".to_string()
}
fn default_rag_temperature() -> f32 {
    rag::TEMPERATURE
}
fn default_rag_top_k() -> usize {
    rag::DEFAULT_TOP_K
}
fn default_rag_max_tokens() -> usize {
    rag::MAX_TOKENS
}
fn default_stream_chunk_size() -> usize {
    rag::STREAM_CHUNK_SIZE
}
fn default_stream_chunk_delay_ms() -> u64 {
    rag::STREAM_CHUNK_DELAY_MS
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            model: default_rag_model(),
            temperature: default_rag_temperature(),
            default_top_k: default_rag_top_k(),
            max_tokens: default_rag_max_tokens(),
            stream_chunk_size: default_stream_chunk_size(),
            stream_chunk_delay_ms: default_stream_chunk_delay_ms(),
        }
    }
}

/// Course orchestrator tuning (C8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseSettings {
    #[serde(default = "default_course_retriever_top_k")]
    pub retriever_top_k: usize,
    #[serde(default = "default_enhancer_iterations")]
    pub enhancer_iterations: usize,
    #[serde(default = "default_enhancer_top_k")]
    pub enhancer_top_k: usize,
    #[serde(default = "default_course_max_tokens")]
    pub max_tokens: usize,
}

fn default_course_retriever_top_k() -> usize {
    course::RETRIEVER_TOP_K
}
fn default_enhancer_iterations() -> usize {
    course::ENHANCER_ITERATIONS
}
fn default_enhancer_top_k() -> usize {
    course::ENHANCER_TOP_K
}
fn default_course_max_tokens() -> usize {
    course::MAX_TOKENS
}

impl Default for CourseSettings {
    fn default() -> Self {
        Self {
            retriever_top_k: default_course_retriever_top_k(),
            enhancer_iterations: default_enhancer_iterations(),
            enhancer_top_k: default_enhancer_top_k(),
            max_tokens: default_course_max_tokens(),
        }
    }
}

/// QCM orchestrator tuning (C9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QcmSettings {
    #[serde(default = "default_qcm_retriever_top_k")]
    pub retriever_top_k: usize,
    #[serde(default = "default_qcm_answer_top_k")]
    pub answer_top_k: usize,
    #[serde(default = "default_qcm_max_tokens")]
    pub max_tokens: usize,
}

fn default_qcm_retriever_top_k() -> usize {
    qcm::RETRIEVER_TOP_K
}
fn default_qcm_answer_top_k() -> usize {
    qcm::ANSWER_TOP_K
}
fn default_qcm_max_tokens() -> usize {
    qcm::MAX_TOKENS
}

impl Default for QcmSettings {
    fn default() -> Self {
        Self {
            retriever_top_k: default_qcm_retriever_top_k(),
            answer_top_k: default_qcm_answer_top_k(),
            max_tokens: default_qcm_max_tokens(),
        }
    }
}

/// External service endpoints (C6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_qdrant_url")]
    pub vector_store_url: String,
    #[serde(default)]
    pub vector_store_api_key: Option<String>,
    #[serde(default = "default_embedding_url")]
    pub embedding_url: String,
    #[serde(default = "default_llm_url")]
    pub llm_url: String,
    #[serde(default)]
    pub llm_api_key: Option<String>,
    #[serde(default = "default_fileserver_internal")]
    pub fileserver_internal_base: String,
    #[serde(default = "default_fileserver_public")]
    pub fileserver_public_base: String,
    #[serde(default = "default_lexical_index_dir")]
    pub lexical_index_dir: String,
    #[serde(default = "default_llm_backend")]
    pub llm_backend: String,
}

fn default_qdrant_url() -> String {
    crate::constants::endpoints::QDRANT_DEFAULT.to_string()
}
fn default_embedding_url() -> String {
    crate::constants::endpoints::EMBEDDING_DEFAULT.to_string()
}
fn default_llm_url() -> String {
    crate::constants::endpoints::LLM_DEFAULT.to_string()
}
fn default_fileserver_internal() -> String {
    crate::constants::endpoints::FILESERVER_INTERNAL_DEFAULT.to_string()
}
fn default_fileserver_public() -> String {
    crate::constants::endpoints::FILESERVER_PUBLIC_DEFAULT.to_string()
}
fn default_lexical_index_dir() -> String {
    crate::constants::endpoints::LEXICAL_INDEX_DIR_DEFAULT.to_string()
}
fn default_llm_backend() -> String {
    crate::constants::endpoints::LLM_BACKEND_DEFAULT.to_string()
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            vector_store_url: default_qdrant_url(),
            vector_store_api_key: None,
            embedding_url: default_embedding_url(),
            llm_url: default_llm_url(),
            llm_api_key: None,
            fileserver_internal_base: default_fileserver_internal(),
            fileserver_public_base: default_fileserver_public(),
            lexical_index_dir: default_lexical_index_dir(),
            llm_backend: default_llm_backend(),
        }
    }
}

/// Bearer-token allowlist, parsed from a single `"tok:uid:name,..."`
/// string so it can be supplied as one environment variable.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthSettings {
    #[serde(default)]
    pub token_list: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub token: String,
    pub user_id: String,
    pub name: String,
}

impl AuthSettings {
    /// Parse `"tok:uid:name,tok2:uid2:name2"` into user records, skipping
    /// malformed entries with a warning rather than failing startup.
    pub fn parse_users(&self) -> Vec<UserRecord> {
        self.token_list
            .split(',')
            .filter(|entry| !entry.trim().is_empty())
            .filter_map(|entry| {
                let mut parts = entry.splitn(3, ':');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(token), Some(user_id), Some(name)) => Some(UserRecord {
                        token: token.trim().to_string(),
                        user_id: user_id.trim().to_string(),
                        name: name.trim().to_string(),
                    }),
                    _ => {
                        tracing::warn!(entry, "malformed auth token entry, skipping");
                        None
                    }
                }
            })
            .collect()
    }
}

/// Load settings from files and environment.
///
/// Priority (highest to lowest):
/// 1. Environment variables (`RAGSVC__` prefix, `__` separator)
/// 2. `config/{env}.yaml` (if env specified)
/// 3. `config/default.yaml`
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{env_name}")).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("RAGSVC")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;
    let settings: Settings = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn weight_sum_validation() {
        let mut settings = Settings::default();
        settings.retriever.bm25_weight = 0.7;
        settings.retriever.vector_weight = 0.7;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rrf_k_must_be_positive() {
        let mut settings = Settings::default();
        settings.retriever.rrf_k = 0.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn production_requires_auth_tokens_when_enabled() {
        let mut settings = Settings::default();
        settings.environment = RuntimeEnvironment::Production;
        settings.server.auth.enabled = true;
        assert!(settings.validate().is_err());

        settings.auth.token_list = "abc:u1:Alice".to_string();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn parse_users_skips_malformed_entries() {
        let auth = AuthSettings {
            token_list: "tok1:u1:Alice,malformed,tok2:u2:Bob".to_string(),
        };
        let users = auth.parse_users();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].user_id, "u1");
        assert_eq!(users[1].name, "Bob");
    }

    #[test]
    fn qcm_top_k_cannot_be_zero() {
        let mut settings = Settings::default();
        settings.qcm.retriever_top_k = 0;
        assert!(settings.validate().is_err());
    }
}
