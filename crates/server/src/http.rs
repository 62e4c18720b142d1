//! HTTP transport (C14): the OpenAI-compatible inbound surface.
//!
//! Three feature prefixes (`/rag`, `/course`, `/qcm`) each expose
//! `GET /api/models` and `POST /api/chat/completions`, mirroring the
//! shape a client already speaking to an OpenAI-style backend expects.

use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use ragsvc_config::constants::timeouts::{COURSE_TOTAL_SECS, QCM_TOTAL_SECS};
use ragsvc_core::domain::{Difficulty, QcmConversationState, StreamEvent};
use ragsvc_core::Error;
use ragsvc_orchestrator::advance;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::stream::sse_response;

const CHANNEL_CAPACITY: usize = 32;

pub fn create_router(state: AppState) -> Router {
    let feature_router = Router::new()
        .route("/api/models", get(list_models))
        .route("/api/chat/completions", post(chat_completions));

    Router::new()
        .nest(
            "/rag",
            feature_router.clone().with_state(RouteState::new(state.clone(), Feature::Rag)),
        )
        .nest(
            "/course",
            feature_router.clone().with_state(RouteState::new(state.clone(), Feature::Course)),
        )
        .nest(
            "/qcm",
            feature_router.with_state(RouteState::new(state.clone(), Feature::Qcm)),
        )
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .layer(axum::middleware::from_fn_with_state(state.clone(), crate::auth::auth_middleware))
        .layer(build_cors_layer(&state))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Which feature a mounted sub-router is serving; carried alongside
/// `AppState` so the shared `chat_completions` handler can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Feature {
    Rag,
    Course,
    Qcm,
}

#[derive(Clone)]
struct RouteState {
    app: AppState,
    feature: Feature,
}

impl RouteState {
    fn new(app: AppState, feature: Feature) -> Self {
        Self { app, feature }
    }
}

fn build_cors_layer(state: &AppState) -> CorsLayer {
    let server = &state.settings.server;
    if !server.cors_enabled {
        return CorsLayer::permissive();
    }

    if server.cors_origins.is_empty() {
        return CorsLayer::new().allow_origin(AllowOrigin::exact(
            "http://localhost:3000".parse().expect("static origin parses"),
        ));
    }

    let origins: Vec<_> = server.cors_origins.iter().filter_map(|o| o.parse().ok()).collect();

    CorsLayer::new().allow_origin(AllowOrigin::list(origins))
}

async fn health_check() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Probes each network dependency (vector store, embedding service, LLM
/// service) with a short timeout; degrades to 503 rather than panicking
/// so an orchestrator (k8s, etc.) can hold traffic back until a backend
/// restart completes. The lexical store is an in-process Tantivy index
/// rather than a network service, so its readiness is just "did
/// `LexicalIndex::open` succeed at startup" — already guaranteed by the
/// time this handler can run.
async fn readiness_check(State(state): State<AppState>) -> Response {
    let client = match reqwest::Client::builder().timeout(Duration::from_secs(2)).build() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "failed to build readiness probe client");
            return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "not ready"}))).into_response();
        }
    };

    let services = &state.settings.services;
    let (vector, embedding, llm) = tokio::join!(
        probe_one(&client, "vector_store", &services.vector_store_url),
        probe_one(&client, "embedding", &services.embedding_url),
        probe_one(&client, "llm", &services.llm_url),
    );

    if let Some((name, err)) = [vector, embedding, llm].into_iter().flatten().next() {
        tracing::warn!(dependency = name, error = %err, "readiness check failed");
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "not ready", "failed": name}))).into_response();
    }

    Json(json!({"status": "ready"})).into_response()
}

async fn probe_one(client: &reqwest::Client, name: &'static str, url: &str) -> Option<(&'static str, reqwest::Error)> {
    client.get(url).send().await.err().map(|e| (name, e))
}

async fn list_models(State(route): State<RouteState>) -> impl IntoResponse {
    let data: Vec<Value> = route
        .app
        .registry
        .collection_names()
        .into_iter()
        .map(|name| json!({"id": name, "object": "model", "owned_by": "ragsvc"}))
        .collect();

    Json(json!({"object": "list", "data": data}))
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(default = "default_stream")]
    stream: bool,
}

fn default_stream() -> bool {
    true
}

fn last_user_message(messages: &[ChatMessage]) -> Result<&str, Error> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .ok_or_else(|| Error::MalformedRequest("no user message in request".into()))
}

fn error_response(err: Error) -> Response {
    let status = crate::status_for(&err);
    (status, Json(json!({"error": err.to_string()}))).into_response()
}

async fn chat_completions(
    State(route): State<RouteState>,
    Json(body): Json<ChatCompletionsRequest>,
) -> Response {
    if let Err(e) = route.app.registry.resolve(&body.model) {
        return error_response(e);
    }

    let question = match last_user_message(&body.messages) {
        Ok(q) => q.to_string(),
        Err(e) => return error_response(e),
    };

    let rx = match route.feature {
        Feature::Rag => spawn_rag(&route.app, body.model.clone(), question),
        Feature::Course => spawn_course(&route.app, body.model.clone(), question),
        Feature::Qcm => spawn_qcm(&route.app, body.model.clone(), &body.messages),
    };

    if body.stream {
        sse_response(rx)
    } else {
        buffered_response(rx).await
    }
}

fn spawn_rag(
    app: &AppState,
    collection: String,
    question: String,
) -> mpsc::Receiver<ragsvc_core::Result<StreamEvent>> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let retriever = app.retriever.clone();
    let llm = app.llm.clone();
    let rag = app.settings.rag.clone();
    let fileserver_internal_base = app.settings.services.fileserver_internal_base.clone();
    let fileserver_public_base = app.settings.services.fileserver_public_base.clone();
    let initial_k = app.settings.retriever.initial_k;

    tokio::spawn(async move {
        ragsvc_orchestrator::stream_rag(
            retriever,
            llm,
            collection,
            question,
            initial_k,
            rag.default_top_k,
            rag.max_tokens,
            fileserver_internal_base,
            fileserver_public_base,
            tx,
        )
        .await;
    });

    rx
}

fn spawn_course(
    app: &AppState,
    collection: String,
    subject: String,
) -> mpsc::Receiver<ragsvc_core::Result<StreamEvent>> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let orchestrator = app.course_orchestrator.clone();

    tokio::spawn(async move {
        let deadline = Duration::from_secs(COURSE_TOTAL_SECS);
        if tokio::time::timeout(deadline, orchestrator.run(collection, subject, tx.clone()))
            .await
            .is_err()
        {
            let _ = tx
                .send(Err(Error::DeadlineExceeded(
                    "course generation exceeded the 10 minute budget".into(),
                )))
                .await;
        }
    });

    rx
}

fn spawn_qcm(
    app: &AppState,
    collection: String,
    messages: &[ChatMessage],
) -> mpsc::Receiver<ragsvc_core::Result<StreamEvent>> {
    let state = messages
        .iter()
        .filter(|m| m.role == "user")
        .fold(QcmConversationState::AskTopic, |state, m| advance(&state, &m.content));

    match state {
        QcmConversationState::AskTopic => single_shot(qcm_prompt_topic()),
        QcmConversationState::AskDifficulty { .. } => single_shot(qcm_prompt_difficulty()),
        QcmConversationState::AskCount { .. } => single_shot(qcm_prompt_count()),
        QcmConversationState::Confirm { topic, difficulty, count } => {
            single_shot(qcm_prompt_confirm(&topic, difficulty, count))
        }
        QcmConversationState::Done { .. } => single_shot(qcm_prompt_topic()),
        QcmConversationState::Running { topic, difficulty, count } => {
            let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
            let orchestrator = app.qcm_orchestrator.clone();
            tokio::spawn(async move {
                let deadline = Duration::from_secs(QCM_TOTAL_SECS);
                if tokio::time::timeout(
                    deadline,
                    orchestrator.run(collection, topic, difficulty, count, tx.clone()),
                )
                .await
                .is_err()
                {
                    let _ = tx
                        .send(Err(Error::DeadlineExceeded(
                            "quiz generation exceeded the 5 minute budget".into(),
                        )))
                        .await;
                }
            });
            rx
        }
    }
}

fn qcm_prompt_topic() -> String {
    "What topic would you like the quiz to cover?".to_string()
}

fn qcm_prompt_difficulty() -> String {
    "What difficulty level: easy, medium, or hard?".to_string()
}

fn qcm_prompt_count() -> String {
    "How many questions would you like (1-50)?".to_string()
}

fn qcm_prompt_confirm(topic: &str, difficulty: Difficulty, count: usize) -> String {
    let difficulty_label = match difficulty {
        Difficulty::Easy => "easy",
        Difficulty::Medium => "medium",
        Difficulty::Hard => "hard",
    };
    format!("I'll generate {count} {difficulty_label} questions on \"{topic}\". Shall I proceed? (yes/no)")
}

/// Emits a single conversational prompt as a one-shot `content` + `done`
/// stream, for the QCM states that don't yet invoke the orchestrator.
fn single_shot(text: String) -> mpsc::Receiver<ragsvc_core::Result<StreamEvent>> {
    let (tx, rx) = mpsc::channel(2);
    tokio::spawn(async move {
        if tx.send(Ok(StreamEvent::content(text))).await.is_err() {
            return;
        }
        let _ = tx.send(Ok(StreamEvent::done())).await;
    });
    rx
}

#[derive(Debug, Serialize)]
struct ChatCompletionResponse {
    object: &'static str,
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionChoice {
    index: usize,
    message: ChatCompletionMessage,
    finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionMessage {
    role: &'static str,
    content: String,
}

/// Drains a stream channel fully and returns a single non-streaming
/// response, for clients that set `stream: false`. Mid-stream errors
/// are folded into the final content rather than surfaced as a status
/// code, since some content may already have been generated.
async fn buffered_response(mut rx: mpsc::Receiver<ragsvc_core::Result<StreamEvent>>) -> Response {
    let mut content = String::new();

    while let Some(item) = rx.recv().await {
        match item {
            Ok(event) => {
                if event.kind == ragsvc_core::domain::StreamEventKind::Content {
                    content.push_str(&event.text);
                }
                if event.kind == ragsvc_core::domain::StreamEventKind::Done {
                    break;
                }
            }
            Err(e) => {
                content.push_str(&format!("\n\n_Error: {e}_"));
                break;
            }
        }
    }

    Json(ChatCompletionResponse {
        object: "chat.completion",
        choices: vec![ChatCompletionChoice {
            index: 0,
            message: ChatCompletionMessage { role: "assistant", content },
            finish_reason: "stop",
        }],
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_user_message_picks_most_recent() {
        let messages = vec![
            ChatMessage { role: "user".into(), content: "first".into() },
            ChatMessage { role: "assistant".into(), content: "reply".into() },
            ChatMessage { role: "user".into(), content: "second".into() },
        ];
        assert_eq!(last_user_message(&messages).unwrap(), "second");
    }

    #[test]
    fn no_user_message_is_malformed() {
        let messages = vec![ChatMessage { role: "assistant".into(), content: "hi".into() }];
        assert!(matches!(last_user_message(&messages), Err(Error::MalformedRequest(_))));
    }

    #[test]
    fn qcm_confirm_prompt_names_topic_and_count() {
        let prompt = qcm_prompt_confirm("rust ownership", Difficulty::Hard, 5);
        assert!(prompt.contains("5 hard questions"));
        assert!(prompt.contains("rust ownership"));
    }
}
