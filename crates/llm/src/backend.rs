//! LLM Client backends (C5)
//!
//! Two backends implement the shared [`LanguageModel`] trait: an
//! Ollama-style chat endpoint (NDJSON streaming) and an OpenAI-compatible
//! chat-completions endpoint (SSE streaming). Both retry transient
//! network failures with exponential backoff and close the underlying
//! transport promptly when the caller drops the streaming receiver.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::Sender;

use ragsvc_core::traits::{GenerationDelta, GenerationOptions, LanguageModel};

use crate::prompt::{Message, Role};
use crate::LlmError;

/// Shared HTTP client construction knobs.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            api_key: None,
            timeout: Duration::from_secs(60),
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
        }
    }
}

fn is_retryable(error: &LlmError) -> bool {
    matches!(error, LlmError::Network(_) | LlmError::Timeout)
}

// ---------------------------------------------------------------------
// Ollama-style backend
// ---------------------------------------------------------------------

pub struct OllamaBackend {
    client: Client,
    config: BackendConfig,
}

impl OllamaBackend {
    pub fn new(config: BackendConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.config.endpoint, path)
    }

    fn request_body(
        &self,
        system: &str,
        user: &str,
        options: &GenerationOptions,
        stream: bool,
    ) -> OllamaChatRequest {
        OllamaChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                OllamaMessage::from(&Message::system(system)),
                OllamaMessage::from(&Message::user(user)),
            ],
            stream,
            options: Some(OllamaOptions {
                temperature: Some(options.temperature),
                stop: if options.stop_sequences.is_empty() {
                    None
                } else {
                    Some(options.stop_sequences.clone())
                },
                num_predict: Some(options.max_tokens as i32),
            }),
        }
    }

    async fn execute_with_retry(
        &self,
        body: &OllamaChatRequest,
    ) -> Result<reqwest::Response, LlmError> {
        let mut backoff = self.config.initial_backoff;
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::warn!(attempt, ?backoff, "retrying LLM request");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            let result = self
                .client
                .post(self.api_url("/chat"))
                .json(body)
                .send()
                .await
                .map_err(|e| LlmError::Network(e.to_string()));

            match result {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    let err = if status.is_server_error() {
                        LlmError::Network(format!("server error {status}: {text}"))
                    } else {
                        LlmError::Api(text)
                    };
                    if is_retryable(&err) {
                        last_error = Some(err);
                    } else {
                        return Err(err);
                    }
                }
                Err(err) => {
                    if is_retryable(&err) {
                        last_error = Some(err);
                    } else {
                        return Err(err);
                    }
                }
            }
        }

        Err(last_error.unwrap_or(LlmError::Network("max retries exceeded".to_string())))
    }
}

#[async_trait]
impl LanguageModel for OllamaBackend {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        options: &GenerationOptions,
    ) -> ragsvc_core::Result<String> {
        let body = self.request_body(system, user, options, false);
        let response = self.execute_with_retry(&body).await?;
        let parsed: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Ok(parsed.message.content)
    }

    async fn stream(
        &self,
        system: &str,
        user: &str,
        options: &GenerationOptions,
        tx: Sender<GenerationDelta>,
    ) -> ragsvc_core::Result<()> {
        let body = self.request_body(system, user, options, true);
        let response = self.execute_with_retry(&body).await?;

        let mut byte_stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.map_err(|e| LlmError::Network(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].to_string();
                buffer.drain(..=newline);

                if line.trim().is_empty() {
                    continue;
                }

                let parsed: OllamaStreamChunk = match serde_json::from_str(&line) {
                    Ok(p) => p,
                    Err(_) => continue,
                };

                if let Some(thinking) = parsed.message.thinking.filter(|t| !t.is_empty()) {
                    if tx.send(GenerationDelta::Thinking(thinking)).await.is_err() {
                        return Ok(());
                    }
                }

                if !parsed.message.content.is_empty()
                    && tx
                        .send(GenerationDelta::Content(parsed.message.content))
                        .await
                        .is_err()
                {
                    return Ok(());
                }

                if parsed.done {
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thinking: Option<String>,
}

impl From<&Message> for OllamaMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.to_string(),
            content: msg.content.clone(),
            thinking: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[derive(Debug, Deserialize)]
struct OllamaStreamChunk {
    message: OllamaMessage,
    done: bool,
}

// ---------------------------------------------------------------------
// OpenAI-compatible backend
// ---------------------------------------------------------------------

pub struct OpenAiBackend {
    client: Client,
    config: BackendConfig,
}

impl OpenAiBackend {
    pub fn new(config: BackendConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }

    fn headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(ref key) = self.config.api_key {
            if let Ok(value) = reqwest::header::HeaderValue::from_str(&format!("Bearer {key}")) {
                headers.insert(reqwest::header::AUTHORIZATION, value);
            }
        }
        headers
    }

    fn request_body(
        &self,
        system: &str,
        user: &str,
        options: &GenerationOptions,
        stream: bool,
    ) -> OpenAiChatRequest {
        OpenAiChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                OpenAiMessage {
                    role: Role::System.to_string(),
                    content: system.to_string(),
                },
                OpenAiMessage {
                    role: Role::User.to_string(),
                    content: user.to_string(),
                },
            ],
            max_tokens: Some(options.max_tokens),
            temperature: Some(options.temperature),
            stop: if options.stop_sequences.is_empty() {
                None
            } else {
                Some(options.stop_sequences.clone())
            },
            stream: Some(stream),
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiBackend {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        options: &GenerationOptions,
    ) -> ragsvc_core::Result<String> {
        let body = self.request_body(system, user, options, false);

        let response = self
            .client
            .post(self.chat_url())
            .headers(self.headers())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {status}: {text}")).into());
        }

        let parsed: OpenAiChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;

        Ok(choice.message.content)
    }

    async fn stream(
        &self,
        system: &str,
        user: &str,
        options: &GenerationOptions,
        tx: Sender<GenerationDelta>,
    ) -> ragsvc_core::Result<()> {
        let body = self.request_body(system, user, options, true);

        let response = self
            .client
            .post(self.chat_url())
            .headers(self.headers())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {status}: {text}")).into());
        }

        let mut byte_stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.map_err(|e| LlmError::Network(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim().to_string();
                buffer.drain(..=newline);

                if line.is_empty() || line == "data: [DONE]" {
                    if line == "data: [DONE]" {
                        return Ok(());
                    }
                    continue;
                }

                let Some(json_str) = line.strip_prefix("data: ") else {
                    continue;
                };

                let parsed: OpenAiStreamChunk = match serde_json::from_str(json_str) {
                    Ok(p) => p,
                    Err(_) => continue,
                };

                let Some(choice) = parsed.choices.into_iter().next() else {
                    continue;
                };
                let Some(delta) = choice.delta else {
                    continue;
                };

                if let Some(reasoning) = delta.reasoning_content.filter(|r| !r.is_empty()) {
                    if tx.send(GenerationDelta::Thinking(reasoning)).await.is_err() {
                        return Ok(());
                    }
                }

                if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
                    if tx.send(GenerationDelta::Content(content)).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }

        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: Option<OpenAiDelta>,
}

#[derive(Debug, Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_retry_policy() {
        let config = BackendConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_backoff, Duration::from_millis(100));
    }

    #[test]
    fn request_body_carries_stop_sequences() {
        let backend = OllamaBackend::new(BackendConfig::default()).unwrap();
        let options = GenerationOptions {
            temperature: 0.2,
            max_tokens: 128,
            stop_sequences: vec!["\n\n".to_string()],
        };
        let body = backend.request_body("sys", "usr", &options, false);
        assert_eq!(body.messages.len(), 2);
        assert!(body.options.unwrap().stop.unwrap().contains(&"\n\n".to_string()));
    }

    #[test]
    fn retryable_errors_are_classified_correctly() {
        assert!(is_retryable(&LlmError::Timeout));
        assert!(is_retryable(&LlmError::Network("x".to_string())));
        assert!(!is_retryable(&LlmError::Api("x".to_string())));
    }
}
